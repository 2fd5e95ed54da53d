//! Value types passed between the page, the worker, the stores and the network.
//!
//! - `Request`, `RequestMode`: an intercepted request
//! - `Response`, `ResponseType`: a live or cached response
//! - `DemoData`: the synthetic payload for the mock-data endpoint

pub mod payload;
pub mod request;
pub mod response;

pub use payload::{DemoData, Hall, Metrics};
pub use request::{cache_key_for, Request, RequestMode};
pub use response::{Response, ResponseType};
