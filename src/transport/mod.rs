//! Transport layer: the REST API over HTTP.

pub mod http;

pub use http::{AppState, HttpServer, router};
