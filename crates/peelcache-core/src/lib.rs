//! peelcache core - offline caching worker for the Peel meal-swipe app.
//!
//! The worker sits between a page and the network. It precaches the app
//! shell into a versioned store, answers the mock-data endpoint from an
//! in-memory payload, serves other GETs cache-first and falls back to the
//! cached shell when a navigation fails offline.
//!
//! Hosts drive workers through [`Registration`], which runs the
//! install/activate lifecycle and routes page requests.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod registration;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::WorkerConfig;
pub use error::{FetchError, StoreError, WorkerError};
pub use models::{DemoData, Request, RequestMode, Response, ResponseType};
pub use network::{Fetcher, HttpFetcher};
pub use registration::{ClientId, Registration, UpdateOutcome};
pub use worker::{FetchOutcome, OfflineCacheWorker, WorkerState};
