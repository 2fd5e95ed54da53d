//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::{CacheStorage, MemoryCacheStorage};
use crate::config::WorkerConfig;
use crate::error::{FetchError, StoreError};
use crate::models::{Request, Response};
use crate::network::Fetcher;

/// In-memory origin: fixed responses per URL, 404 for anything else.
#[derive(Default)]
pub(crate) struct StubFetcher {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serves `stub <entry>` for every manifest entry of `config`.
    pub(crate) fn serving_manifest(config: &WorkerConfig) -> Self {
        let stub = Self::new();
        for entry in &config.precache {
            let url = config.resolve(entry).unwrap();
            stub.respond(url.as_str(), 200, &format!("stub {}", entry));
        }
        stub
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_with(url, Response::new(status, url, body.as_bytes().to_vec()));
    }

    pub(crate) fn respond_with(&self, url: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far, including failed ones.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(request.url.to_string()));
        }
        let key = request.cache_key();
        let found = self.routes.lock().unwrap().get(&key).cloned();
        Ok(found.unwrap_or_else(|| Response::new(404, &key, Vec::new())))
    }
}

/// Memory stores whose `keys` and `put` can be switched to fail.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryCacheStorage,
    fail_keys: AtomicBool,
    fail_put: AtomicBool,
}

impl FlakyStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_keys(&self, fail: bool) {
        self.fail_keys.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Io(std::io::Error::other(format!("injected {} failure", what)))
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        if self.fail_keys.load(Ordering::SeqCst) {
            return Err(Self::injected("keys"));
        }
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.delete(name).await
    }

    async fn match_request(&self, name: &str, key: &str) -> Result<Option<Response>, StoreError> {
        self.inner.match_request(name, key).await
    }

    async fn put(&self, name: &str, key: &str, response: Response) -> Result<(), StoreError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::injected("put"));
        }
        self.inner.put(name, key, response).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<String>, StoreError> {
        self.inner.entries(name).await
    }
}
