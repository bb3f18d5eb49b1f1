//! Work-unit sources for concrete protocols.
//!
//! The gate and executor are protocol-agnostic; this module supplies ready-made
//! units for the protocols the CLI speaks.

/// HTTP GET units backed by reqwest
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{FetchResponse, HttpFetcher};
