//! HTTP client module
//!
//! Sends test traffic through gateways and exposed hostnames.

mod client;

pub use client::{ClientBuilder, HttpError, HttpRequest, HttpResponse, KuadrantClient};
