//! HTTP fetcher for the worker's origin.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use super::Fetcher;
use crate::config::WorkerConfig;
use crate::error::{FetchError, WorkerError};
use crate::models::{Request, RequestMode, Response, ResponseType};

/// Fetcher over a shared `reqwest` client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    /// Origin that counts as same-origin for response classification
    scope: Url,
}

impl HttpFetcher {
    pub fn new(scope: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, scope })
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self, WorkerError> {
        let scope = config.scope_url()?;
        Self::new(scope, Duration::from_secs(config.request_timeout_secs))
            .map_err(WorkerError::HttpClient)
    }

    /// Classify a response the way a page would observe it.
    fn classify(&self, request: &Request, final_url: &Url) -> ResponseType {
        if final_url.origin() == self.scope.origin() {
            ResponseType::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                FetchError::Unreachable(format!("{}: {}", request.url, e))
            } else {
                FetchError::Network(e)
            }
        })?;

        let final_url = response.url().clone();
        let response_type = self.classify(request, &final_url);
        if response_type == ResponseType::Opaque {
            debug!(url = %request.url, "Opaque cross-origin response");
            return Ok(Response::opaque(request.url.as_str()));
        }

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status = status, "Network response received");

        Ok(Response {
            status,
            headers,
            body,
            url: final_url.to_string(),
            redirected: final_url != request.url,
            response_type,
        })
    }
}
