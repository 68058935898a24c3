//! Upstream transport adapters.

mod http;

pub use http::HttpFetcher;
