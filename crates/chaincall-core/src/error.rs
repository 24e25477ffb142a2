//! Error types for transports and the aggregation pipeline.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while submitting a call to a node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The node answered, but not with something we can use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Returns `true` if this error is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the node reported that the call reverted.
    pub fn is_revert(&self) -> bool {
        match self {
            Self::Rpc(err) => err.code == 3 || err.message.to_lowercase().contains("revert"),
            _ => false,
        }
    }
}

/// Errors produced by [`crate::aggregate::Aggregator`].
///
/// Construction errors are raised before any network I/O and are never
/// worth retrying; everything else comes from the node or the wire.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Method `{method}` declares {expected} argument type(s) but {got} value(s) were supplied")]
    ArityMismatch {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("Call set declares {declared_types} return type(s) but {declared_keys} return key(s)")]
    ReturnArityMismatch {
        declared_types: usize,
        declared_keys: usize,
    },

    #[error("Unknown preset {name}")]
    UnknownPreset { name: String },

    #[error("Malformed method signature `{method}`")]
    InvalidSignature { method: String },

    #[error("Invalid ABI type `{ty}`: {reason}")]
    InvalidType { ty: String, reason: String },

    #[error("Cannot encode arguments for `{method}`: {reason}")]
    Encode { method: String, reason: String },

    #[error("Aggregate call reverted: {reason}")]
    Reverted { reason: String },

    #[error("Cannot decode aggregate response: {reason}")]
    Decode { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AggregateError {
    /// Returns `true` for errors caused by the call set or configuration
    /// itself. Retrying the same input can never succeed.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::ArityMismatch { .. }
                | Self::ReturnArityMismatch { .. }
                | Self::UnknownPreset { .. }
                | Self::InvalidSignature { .. }
                | Self::InvalidType { .. }
                | Self::Encode { .. }
        )
    }
}
