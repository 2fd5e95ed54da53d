//! Named, versioned stores of request→response pairs.
//!
//! `CacheStorage` is the seam between the worker and wherever entries live:
//! - `MemoryCacheStorage`: process-local, used by tests and short-lived hosts
//! - `DiskCacheStorage`: one directory per store, survives restarts

pub mod disk;
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::Response;

pub use disk::{CachedData, DiskCacheStorage};
pub use memory::MemoryCacheStorage;

/// A set of named stores scoped to one origin.
///
/// Implementations serialize access themselves; concurrent `put`s for the
/// same key leave whichever write landed last.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a store, creating it if absent. Returns true when it was created.
    async fn open(&self, name: &str) -> Result<bool, StoreError>;

    async fn has(&self, name: &str) -> Result<bool, StoreError>;

    /// Store names in creation order.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Delete a store and all its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    async fn match_request(&self, name: &str, key: &str) -> Result<Option<Response>, StoreError>;

    /// Insert or replace an entry, creating the store if needed.
    async fn put(&self, name: &str, key: &str, response: Response) -> Result<(), StoreError>;

    /// Keys of the entries held by a store.
    async fn entries(&self, name: &str) -> Result<Vec<String>, StoreError>;
}
