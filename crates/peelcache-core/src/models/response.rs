use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Provenance of a response, mirroring what a page can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response
    Basic,
    /// Cross-origin response with readable body
    Cors,
    /// Cross-origin no-cors response; status and body are hidden
    Opaque,
    Error,
}

/// A response handed back to the page or kept in a store.
///
/// The body is not serialized with the metadata; stores keep it separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub url: String,
    pub redirected: bool,
    pub response_type: ResponseType,
}

impl Response {
    pub fn new(status: u16, url: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
            url: url.to_string(),
            redirected: false,
            response_type: ResponseType::Basic,
        }
    }

    /// A 200 JSON body that must never be cached downstream
    pub fn json_no_store(url: &str, body: Vec<u8>) -> Self {
        Self::new(200, url, body)
            .with_header("content-type", "application/json")
            .with_header("cache-control", "no-store")
    }

    /// Cross-origin no-cors response: status 0, nothing readable
    pub fn opaque(url: &str) -> Self {
        Self {
            status: 0,
            headers: BTreeMap::new(),
            body: Vec::new(),
            url: url.to_string(),
            redirected: false,
            response_type: ResponseType::Opaque,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Status in the 200-299 range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether a live response may be written into the store on a miss.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic && !self.redirected
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
