use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::error::StoreError;
use crate::models::Response;

/// In-process stores, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    // Vec keeps creation order for `keys()`
    stores: RwLock<Vec<(String, HashMap<String, Response>)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<bool, StoreError> {
        let mut stores = self.stores.write().await;
        if stores.iter().any(|(n, _)| n == name) {
            return Ok(false);
        }
        stores.push((name.to_string(), HashMap::new()));
        Ok(true)
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.stores.read().await.iter().any(|(n, _)| n == name))
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|(n, _)| n != name);
        Ok(stores.len() != before)
    }

    async fn match_request(&self, name: &str, key: &str) -> Result<Option<Response>, StoreError> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, entries)| entries.get(key).cloned()))
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<(), StoreError> {
        let mut stores = self.stores.write().await;
        match stores.iter_mut().find(|(n, _)| n == name) {
            Some((_, entries)) => {
                entries.insert(key.to_string(), response);
            }
            None => {
                let mut entries = HashMap::new();
                entries.insert(key.to_string(), response);
                stores.push((name.to_string(), entries));
            }
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let stores = self.stores.read().await;
        let (_, entries) = stores
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| StoreError::MissingStore(name.to_string()))?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> Response {
        Response::new(200, "http://localhost/", body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_open_reports_creation() {
        let storage = MemoryCacheStorage::new();
        assert!(storage.open("v1").await.unwrap());
        assert!(!storage.open("v1").await.unwrap());
        assert!(storage.has("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let storage = MemoryCacheStorage::new();
        for name in ["v2", "v1", "v3"] {
            storage.open(name).await.unwrap();
        }
        assert_eq!(storage.keys().await.unwrap(), ["v2", "v1", "v3"]);
    }

    #[tokio::test]
    async fn test_put_overwrites_last_write_wins() {
        let storage = MemoryCacheStorage::new();
        storage.put("v1", "http://localhost/", page("first")).await.unwrap();
        storage.put("v1", "http://localhost/", page("second")).await.unwrap();
        let hit = storage
            .match_request("v1", "http://localhost/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.text(), "second");
    }

    #[tokio::test]
    async fn test_delete_removes_entries() {
        let storage = MemoryCacheStorage::new();
        storage.put("v1", "http://localhost/", page("x")).await.unwrap();
        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert!(storage
            .match_request("v1", "http://localhost/")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            storage.entries("v1").await,
            Err(StoreError::MissingStore(_))
        ));
    }
}
