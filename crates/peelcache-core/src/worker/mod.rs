//! The offline cache worker.
//!
//! One worker instance serves one cache generation (its `cache_name`).
//! The host drives it through `install`, then `activate`, then calls
//! `handle_fetch` for every request from a page the worker controls.

pub mod fetch;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use reqwest::Url;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::error::{FetchError, StoreError, WorkerError};
use crate::models::{Request, Response};
use crate::network::Fetcher;

pub use fetch::FetchOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Failed to install, or replaced by a newer version
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Number of manifest entries written to the store
    pub cached: usize,
    /// Replace the active worker without waiting for its clients to close
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateOutcome {
    /// Stale generations removed
    pub deleted: Vec<String>,
    /// Stale generations that could not be removed
    pub failed: Vec<String>,
}

type WriteResult = Result<(), StoreError>;

pub struct OfflineCacheWorker {
    config: WorkerConfig,
    shell_url: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
    state: Mutex<WorkerState>,
    /// Write-behind tasks spawned by `handle_fetch`
    pending_writes: Mutex<JoinSet<WriteResult>>,
}

/// Lock ignoring poisoning; the guarded values stay consistent across panics.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl OfflineCacheWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetcher>,
    ) -> Result<Self, WorkerError> {
        // Validate the scope and every manifest entry up front
        config.manifest_urls()?;
        let shell_url = config.shell_url()?;
        Ok(Self {
            config,
            shell_url,
            storage,
            network,
            state: Mutex::new(WorkerState::Parsed),
            pending_writes: Mutex::new(JoinSet::new()),
        })
    }

    /// The cache generation this worker owns.
    pub fn version(&self) -> &str {
        &self.config.cache_name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        *lock(&self.state)
    }

    pub fn claims_clients(&self) -> bool {
        self.config.claim_clients
    }

    pub(crate) fn mark_redundant(&self) {
        let mut state = lock(&self.state);
        if *state != WorkerState::Redundant {
            info!(version = %self.config.cache_name, from = %*state, "Worker is redundant");
            *state = WorkerState::Redundant;
        }
    }

    fn transition(
        &self,
        from: WorkerState,
        to: WorkerState,
        action: &'static str,
    ) -> Result<(), WorkerError> {
        let mut state = lock(&self.state);
        if *state != from {
            return Err(WorkerError::InvalidState {
                action,
                state: state.to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: WorkerState) {
        *lock(&self.state) = to;
    }

    // ===== Install =====

    /// Precache every manifest URL into the current store.
    ///
    /// Any failed or non-ok fetch fails the whole install and nothing is
    /// written; the worker becomes redundant.
    pub async fn install(&self) -> Result<InstallOutcome, WorkerError> {
        self.transition(WorkerState::Parsed, WorkerState::Installing, "install")?;
        info!(version = %self.config.cache_name, "Installing worker");

        match self.precache().await {
            Ok(cached) => {
                self.set_state(WorkerState::Installed);
                info!(version = %self.config.cache_name, cached = cached, "Worker installed");
                Ok(InstallOutcome {
                    cached,
                    skip_waiting: self.config.skip_waiting,
                })
            }
            Err(e) => {
                warn!(version = %self.config.cache_name, error = %e, "Worker install failed");
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, WorkerError> {
        let name = self.config.cache_name.as_str();
        let urls = self.config.manifest_urls()?;
        let created = self.storage.open(name).await?;

        let fetched = join_all(urls.iter().map(|url| self.precache_one(url))).await;
        let stored = match fetched.into_iter().collect::<Result<Vec<_>, _>>() {
            Ok(entries) => self.store_all(entries).await,
            Err(e) => Err(e),
        };

        // Don't leave a half-filled generation behind
        if stored.is_err() && created {
            if let Err(e) = self.storage.delete(name).await {
                warn!(store = name, error = %e, "Failed to remove store after failed install");
            }
        }
        stored
    }

    async fn precache_one(&self, url: &Url) -> Result<(String, Response), WorkerError> {
        let request = Request::get(url.clone());
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|reason| WorkerError::Precache {
                url: url.to_string(),
                reason,
            })?;
        if !response.ok() {
            return Err(WorkerError::Precache {
                url: url.to_string(),
                reason: FetchError::from_status(url.as_str(), response.status, &response.body),
            });
        }
        debug!(url = %url, "Precached");
        Ok((request.cache_key(), response))
    }

    async fn store_all(&self, entries: Vec<(String, Response)>) -> Result<usize, WorkerError> {
        let count = entries.len();
        for (key, response) in entries {
            self.storage
                .put(&self.config.cache_name, &key, response)
                .await?;
        }
        Ok(count)
    }

    // ===== Activate =====

    /// Delete every store that is not this worker's generation.
    pub async fn activate(&self) -> Result<ActivateOutcome, WorkerError> {
        self.transition(WorkerState::Installed, WorkerState::Activating, "activate")?;

        let keys = match self.storage.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                self.set_state(WorkerState::Installed);
                return Err(e.into());
            }
        };
        let stale: Vec<String> = keys
            .into_iter()
            .filter(|k| *k != self.config.cache_name)
            .collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut outcome = ActivateOutcome::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => outcome.deleted.push(name),
                Err(e) => {
                    warn!(store = %name, error = %e, "Failed to delete stale cache store");
                    outcome.failed.push(name);
                }
            }
        }

        self.set_state(WorkerState::Activated);
        info!(
            version = %self.config.cache_name,
            deleted = outcome.deleted.len(),
            "Worker activated"
        );
        Ok(outcome)
    }

    // ===== Write-behind =====

    /// Store a response without making the caller wait for it.
    fn store_behind(&self, key: String, response: Response) {
        let storage = Arc::clone(&self.storage);
        let name = self.config.cache_name.clone();

        let mut pending = lock(&self.pending_writes);
        self.reap_finished(&mut pending);
        pending.spawn(async move {
            let result = storage.put(&name, &key, response).await;
            match result {
                Ok(()) => debug!(store = %name, key = %key, "Cache filled"),
                Err(ref e) => warn!(store = %name, key = %key, error = %e, "Cache write failed"),
            }
            result
        });
    }

    /// Drop already-finished writes. Their failures were logged by the task.
    fn reap_finished(&self, pending: &mut JoinSet<WriteResult>) {
        while let Some(joined) = pending.try_join_next() {
            let _ = write_error(joined);
        }
    }

    /// Number of write-behind tasks not yet reaped or settled.
    pub fn pending_writes(&self) -> usize {
        lock(&self.pending_writes).len()
    }

    /// Wait for all outstanding cache writes. Returns the errors of the
    /// writes joined here; writes reaped earlier are only logged.
    pub async fn settle(&self) -> Vec<StoreError> {
        let mut pending = std::mem::take(&mut *lock(&self.pending_writes));
        let mut errors = Vec::new();
        while let Some(joined) = pending.join_next().await {
            errors.extend(write_error(joined));
        }
        errors
    }
}

fn write_error(joined: Result<WriteResult, tokio::task::JoinError>) -> Option<StoreError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => {
            warn!(error = %e, "Cache write task did not complete");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::testing::StubFetcher;

    fn config() -> WorkerConfig {
        WorkerConfig {
            cache_name: "peel-feed-react-v3".to_string(),
            scope: "http://localhost:8080/".to_string(),
            ..Default::default()
        }
    }

    fn worker(storage: Arc<MemoryCacheStorage>, network: Arc<StubFetcher>) -> OfflineCacheWorker {
        OfflineCacheWorker::new(config(), storage, network).unwrap()
    }

    #[tokio::test]
    async fn test_install_precaches_whole_manifest() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(StubFetcher::serving_manifest(&config()));
        let w = worker(storage.clone(), network.clone());

        let outcome = w.install().await.unwrap();
        assert_eq!(outcome.cached, 9);
        assert!(outcome.skip_waiting);
        assert_eq!(w.state(), WorkerState::Installed);

        // Every manifest URL is now answerable without the network
        let before = network.calls();
        for url in config().manifest_urls().unwrap() {
            let hit = storage
                .match_request("peel-feed-react-v3", url.as_str())
                .await
                .unwrap();
            assert!(hit.is_some(), "{url} not precached");
        }
        assert_eq!(network.calls(), before);
    }

    #[tokio::test]
    async fn test_install_fails_on_missing_asset() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(StubFetcher::serving_manifest(&config()));
        network.respond("http://localhost:8080/assets/corn-texture.png", 404, "gone");
        let w = worker(storage.clone(), network);

        let err = w.install().await.unwrap_err();
        assert!(matches!(err, WorkerError::Precache { ref url, .. } if url.ends_with("corn-texture.png")));
        assert_eq!(w.state(), WorkerState::Redundant);
        // No partial generation left behind
        assert!(!storage.has("peel-feed-react-v3").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_fails_offline() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(StubFetcher::serving_manifest(&config()));
        network.set_offline(true);
        let w = worker(storage.clone(), network);

        assert!(w.install().await.is_err());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_twice_is_invalid() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(StubFetcher::serving_manifest(&config()));
        let w = worker(storage, network);
        w.install().await.unwrap();
        assert!(matches!(
            w.install().await,
            Err(WorkerError::InvalidState { action: "install", .. })
        ));
    }

    #[tokio::test]
    async fn test_activate_deletes_other_generations() {
        let storage = Arc::new(MemoryCacheStorage::new());
        for old in ["peel-feed-react-v1", "peel-feed-react-v2", "unrelated"] {
            storage.open(old).await.unwrap();
        }
        let network = Arc::new(StubFetcher::serving_manifest(&config()));
        let w = worker(storage.clone(), network);
        w.install().await.unwrap();

        let outcome = w.activate().await.unwrap();
        assert_eq!(
            outcome.deleted,
            ["peel-feed-react-v1", "peel-feed-react-v2", "unrelated"]
        );
        assert_eq!(storage.keys().await.unwrap(), ["peel-feed-react-v3"]);
        assert_eq!(w.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(StubFetcher::serving_manifest(&config()));
        let w = worker(storage, network);
        assert!(matches!(
            w.activate().await,
            Err(WorkerError::InvalidState { action: "activate", .. })
        ));
    }

    #[test]
    fn test_new_rejects_bad_scope() {
        let bad = WorkerConfig {
            scope: "no scheme here".to_string(),
            ..Default::default()
        };
        let result = OfflineCacheWorker::new(
            bad,
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StubFetcher::new()),
        );
        assert!(matches!(result, Err(WorkerError::InvalidScope(_))));
    }
}
