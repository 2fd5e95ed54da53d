//! Steady-state request handling.
//!
//! Policies, first match wins:
//! 1. mock-data path: synthetic payload, no cache, no network
//! 2. non-GET: passthrough
//! 3. cache hit, else live fetch with write-behind fill
//! 4. offline navigation: cached shell document

use reqwest::Method;
use tracing::{debug, warn};

use super::OfflineCacheWorker;
use crate::error::FetchError;
use crate::models::{cache_key_for, DemoData, Request, Response};

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    Respond(Response),
    /// The page observes a failed fetch.
    NetworkError(FetchError),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            _ => None,
        }
    }
}

impl OfflineCacheWorker {
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.config.is_mock_data_path(request.url.path()) {
            return self.mock_data_response(request);
        }

        if request.method != Method::GET {
            return FetchOutcome::Passthrough;
        }

        let name = self.config.cache_name.as_str();
        let key = request.cache_key();
        match self.storage.match_request(name, &key).await {
            Ok(Some(cached)) => {
                debug!(key = %key, "Cache HIT");
                return FetchOutcome::Respond(cached);
            }
            Ok(None) => debug!(key = %key, "Cache MISS"),
            Err(e) => warn!(key = %key, error = %e, "Cache lookup failed, using network"),
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store_behind(key, response.clone());
                } else {
                    debug!(
                        key = %key,
                        status = response.status,
                        response_type = ?response.response_type,
                        "Response not cacheable"
                    );
                }
                FetchOutcome::Respond(response)
            }
            Err(e) => self.offline_fallback(request, e).await,
        }
    }

    fn mock_data_response(&self, request: &Request) -> FetchOutcome {
        match DemoData::get().to_json_bytes() {
            Ok(body) => {
                debug!(url = %request.url, "Serving synthetic payload");
                FetchOutcome::Respond(Response::json_no_store(request.url.as_str(), body))
            }
            Err(e) => FetchOutcome::NetworkError(e.into()),
        }
    }

    async fn offline_fallback(&self, request: &Request, error: FetchError) -> FetchOutcome {
        if request.is_navigation() {
            let shell_key = cache_key_for(&self.shell_url);
            match self
                .storage
                .match_request(&self.config.cache_name, &shell_key)
                .await
            {
                Ok(Some(shell)) => {
                    debug!(url = %request.url, error = %error, "Offline, serving cached shell");
                    return FetchOutcome::Respond(shell);
                }
                Ok(None) => debug!(url = %request.url, "Offline and no shell cached"),
                Err(e) => warn!(error = %e, "Shell lookup failed"),
            }
        }
        debug!(url = %request.url, error = %error, "Network fetch failed");
        FetchOutcome::NetworkError(error)
    }
}
