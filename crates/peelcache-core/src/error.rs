use thiserror::Error;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Failure of a live network fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Connection could not be established (refused, DNS, offline)
    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Bad status {status} for {url}: {body}")]
    BadStatus {
        url: String,
        status: u16,
        body: String,
    },
}

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &[u8]) -> Self {
        FetchError::BadStatus {
            url: url.to_string(),
            status,
            body: Self::truncate_body(&String::from_utf8_lossy(body)),
        }
    }
}

/// Failure reading or writing a cache store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache store not found: {0}")]
    MissingStore(String),
}

/// Failure of a worker lifecycle phase.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Precache of {url} failed: {reason}")]
    Precache { url: String, reason: FetchError },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid worker scope: {0}")]
    InvalidScope(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[source] FetchError),

    #[error("Cannot {action} while worker is {state}")]
    InvalidState { action: &'static str, state: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_short_body() {
        let err = FetchError::from_status("http://localhost/a.css", 404, b"not here");
        assert_eq!(
            err.to_string(),
            "Bad status 404 for http://localhost/a.css: not here"
        );
    }

    #[test]
    fn test_from_status_truncates_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let err = FetchError::from_status("http://localhost/", 500, body.as_bytes());
        let msg = err.to_string();
        assert!(msg.contains("(truncated, 520 total bytes)"));
    }

    #[test]
    fn test_http_client_error_is_not_a_scope_error() {
        let err = WorkerError::HttpClient(FetchError::Unreachable("no TLS backend".to_string()));
        assert_eq!(
            err.to_string(),
            "HTTP client setup failed: Network unreachable: no TLS backend"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = format!("{}é", "a".repeat(MAX_ERROR_BODY_LENGTH - 1));
        let truncated = FetchError::truncate_body(&body);
        assert!(truncated.starts_with(&"a".repeat(MAX_ERROR_BODY_LENGTH - 1)));
    }
}
