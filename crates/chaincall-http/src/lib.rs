//! chaincall-http: HTTP JSON-RPC transport for ChainCall.
//!
//! # Features
//! - `reqwest` client with a per-request timeout
//! - Exponential backoff for transient (connection, timeout) failures
//! - Endpoint chosen per request

pub mod client;
pub mod retry;

pub use client::{HttpTransport, HttpTransportConfig};
pub use retry::RetryConfig;
