//! Live network access for the worker.
//!
//! `Fetcher` is the seam the worker fetches through; `HttpFetcher` is the
//! `reqwest`-backed implementation that talks to the real origin.

pub mod client;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{Request, Response};

pub use client::HttpFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Non-2xx statuses are responses, not errors;
    /// `Err` means the network could not be reached at all.
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
