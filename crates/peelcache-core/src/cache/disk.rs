//! On-disk cache stores.
//!
//! Layout under the root directory:
//! - `stores.json`: store names in creation order
//! - `<url-encoded store name>/<sha1 of key>.entry`: one line of JSON
//!   metadata (`CachedData<Entry>`), a newline, then the raw body
//!
//! Entries are written to a temp file and renamed into place, so a reader
//! never sees a half-written entry and concurrent writers are last-write-wins.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::CacheStorage;
use crate::error::StoreError;
use crate::models::Response;

/// Store index file name
const INDEX_FILE: &str = "stores.json";

const ENTRY_EXTENSION: &str = "entry";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Metadata line of an entry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    key: String,
    response: Response,
}

pub struct DiskCacheStorage {
    root: PathBuf,
    /// Guards `stores.json` read-modify-write cycles
    index_lock: Mutex<()>,
}

impl DiskCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            index_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(urlencoding::encode(name).as_ref())
    }

    fn entry_path(&self, name: &str, key: &str) -> PathBuf {
        let digest = Sha1::digest(key.as_bytes());
        self.store_dir(name)
            .join(format!("{:x}.{}", digest, ENTRY_EXTENSION))
    }

    fn read_index(&self) -> Result<Vec<String>, StoreError> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_index(&self, names: &[String]) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(names)?;
        write_atomic(&self.root, &self.root.join(INDEX_FILE), &contents)
    }

    /// Update the index under the lock. Returns whatever `f` returns.
    fn with_index<R>(&self, f: impl FnOnce(&mut Vec<String>) -> R) -> Result<R, StoreError> {
        let _guard = self.index_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut names = self.read_index()?;
        let before = names.clone();
        let result = f(&mut names);
        if names != before {
            self.write_index(&names)?;
        }
        Ok(result)
    }

    fn ensure_store(&self, name: &str) -> Result<bool, StoreError> {
        std::fs::create_dir_all(self.store_dir(name))?;
        self.with_index(|names| {
            if names.iter().any(|n| n == name) {
                false
            } else {
                names.push(name.to_string());
                true
            }
        })
    }

    fn load_entry(path: &Path) -> Result<(CachedData<Entry>, Vec<u8>), StoreError> {
        let raw = std::fs::read(path)?;
        let split = raw.iter().position(|&b| b == b'\n').unwrap_or(raw.len());
        let cached: CachedData<Entry> = serde_json::from_slice(&raw[..split])?;
        let body = raw.get(split + 1..).unwrap_or_default().to_vec();
        Ok((cached, body))
    }

    fn read_entries(&self, name: &str) -> Result<Vec<CachedData<Entry>>, StoreError> {
        let dir = self.store_dir(name);
        if !dir.is_dir() {
            return Err(StoreError::MissingStore(name.to_string()));
        }
        let mut entries = Vec::new();
        for item in std::fs::read_dir(&dir)? {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::load_entry(&path) {
                Ok((cached, _)) => entries.push(cached),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }
        entries.sort_by(|a, b| a.data.key.cmp(&b.data.key));
        Ok(entries)
    }

    /// Entry keys of a store with how long ago each was written.
    pub fn entry_ages(&self, name: &str) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .read_entries(name)?
            .into_iter()
            .map(|cached| {
                let age = cached.age_display();
                (cached.data.key, age)
            })
            .collect())
    }
}

/// Write `contents` to `path` via a temp file in `dir`.
fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<bool, StoreError> {
        let created = self.ensure_store(name)?;
        if created {
            debug!(store = name, "Created cache store");
        }
        Ok(created)
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.store_dir(name).is_dir())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let names = self.with_index(|names| names.clone())?;
        Ok(names
            .into_iter()
            .filter(|n| self.store_dir(n).is_dir())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let dir = self.store_dir(name);
        let existed = dir.is_dir();
        if existed {
            std::fs::remove_dir_all(&dir)?;
        }
        self.with_index(|names| names.retain(|n| n != name))?;
        Ok(existed)
    }

    async fn match_request(&self, name: &str, key: &str) -> Result<Option<Response>, StoreError> {
        let path = self.entry_path(name, key);
        if !path.exists() {
            return Ok(None);
        }
        let (cached, body) = Self::load_entry(&path)?;
        // Guard against a digest collision
        if cached.data.key != key {
            return Ok(None);
        }
        let mut response = cached.data.response;
        response.body = body;
        Ok(Some(response))
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<(), StoreError> {
        self.ensure_store(name)?;
        let body = response.body.clone();
        let cached = CachedData::new(Entry {
            key: key.to_string(),
            response,
        });
        let mut contents = serde_json::to_vec(&cached)?;
        contents.push(b'\n');
        contents.extend_from_slice(&body);
        write_atomic(&self.store_dir(name), &self.entry_path(name, key), &contents)
    }

    async fn entries(&self, name: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read_entries(name)?
            .into_iter()
            .map(|cached| cached.data.key)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn storage() -> (tempfile::TempDir, DiskCacheStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskCacheStorage::new(dir.path().join("stores")).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_cached_data_from_the_future_reads_just_now() {
        let mut cached = CachedData::new("index.html");
        cached.cached_at = Utc::now() + Duration::minutes(10);
        assert!(cached.age_minutes() < 0);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_age_display_minutes() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() - Duration::minutes(59);
        assert_eq!(cached.age_display(), "59m ago");
    }

    #[test]
    fn test_cached_data_age_display_rounds_hours() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");
        cached.cached_at = Utc::now() - Duration::days(3);
        assert_eq!(cached.age_display(), "3d ago");
    }

    #[tokio::test]
    async fn test_put_and_match_keeps_body_bytes() {
        let (_dir, storage) = storage();
        let body = b"<!doctype html>\n<title>Peel</title>\n".to_vec();
        let resp = Response::new(200, "http://localhost:8080/index.html", body.clone())
            .with_header("content-type", "text/html");
        storage
            .put("v3", "http://localhost:8080/index.html", resp)
            .await
            .unwrap();

        let hit = storage
            .match_request("v3", "http://localhost:8080/index.html")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body, body);
        assert_eq!(hit.header("content-type"), Some("text/html"));
        assert!(storage
            .match_request("v3", "http://localhost:8080/other.html")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stores_survive_reopen() {
        let (dir, storage) = storage();
        storage.open("peel-feed-react-v2").await.unwrap();
        storage
            .put("peel-feed-react-v3", "http://localhost/", Response::new(200, "http://localhost/", Vec::new()))
            .await
            .unwrap();
        drop(storage);

        let reopened = DiskCacheStorage::new(dir.path().join("stores")).unwrap();
        assert_eq!(
            reopened.keys().await.unwrap(),
            ["peel-feed-react-v2", "peel-feed-react-v3"]
        );
        assert_eq!(
            reopened.entries("peel-feed-react-v3").await.unwrap(),
            ["http://localhost/"]
        );
    }

    #[tokio::test]
    async fn test_delete_removes_store_and_index() {
        let (_dir, storage) = storage();
        storage.open("a/b v1").await.unwrap();
        assert!(storage.has("a/b v1").await.unwrap());
        assert!(storage.delete("a/b v1").await.unwrap());
        assert!(!storage.has("a/b v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(!storage.delete("a/b v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_ages_lists_keys() {
        let (_dir, storage) = storage();
        storage
            .put("v3", "http://localhost/b", Response::new(200, "http://localhost/b", Vec::new()))
            .await
            .unwrap();
        storage
            .put("v3", "http://localhost/a", Response::new(200, "http://localhost/a", Vec::new()))
            .await
            .unwrap();
        let ages = storage.entry_ages("v3").unwrap();
        assert_eq!(ages[0], ("http://localhost/a".to_string(), "just now".to_string()));
        assert_eq!(ages.len(), 2);
    }
}
