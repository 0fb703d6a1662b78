//! Error taxonomy for the scan/relay engine
//!
//! Only rate-limit and transient RPC failures are recovered inside the engine.
//! Everything else surfaces to the caller so an operator can intervene.

use std::fmt;

use thiserror::Error;

use crate::types::BlockRange;

/// Tagged error returned by a [`ChainClient`](crate::chain::ChainClient) call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// JSON-RPC error code, or HTTP status for transport failures, or 0 when unknown
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error raised below the JSON-RPC layer (connection, timeout, decoding)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Errors surfaced by the relay engine
#[derive(Debug, Error)]
pub enum RelayError {
    /// Provider kept rejecting a window even at the minimum step
    #[error("window {range} still rate limited at minimum step: {source}")]
    WindowExhausted {
        range: BlockRange,
        #[source]
        source: RpcError,
    },

    /// Network/timeout failure that outlived its retry budget
    #[error("transient rpc failure after {attempts} attempts: {source}")]
    TransientRpc {
        attempts: u32,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("failed to decode log at block {block} index {log_index}: {reason}")]
    Decode {
        block: u64,
        log_index: u64,
        reason: String,
    },

    #[error("log at block {block} index {log_index} arrived after block {prev_block} index {prev_log_index}")]
    OutOfOrder {
        block: u64,
        log_index: u64,
        prev_block: u64,
        prev_log_index: u64,
    },

    #[error("submission of nonce {nonce} failed: {reason}")]
    Submission { nonce: u64, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cursor store: {0}")]
    Cursor(String),
}

impl RelayError {
    pub fn config(message: impl Into<String>) -> Self {
        RelayError::Config(message.into())
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::WindowExhausted { .. } => "window_exhausted",
            RelayError::TransientRpc { .. } => "transient_rpc",
            RelayError::Rpc(_) => "rpc",
            RelayError::Decode { .. } => "decode",
            RelayError::OutOfOrder { .. } => "out_of_order",
            RelayError::Submission { .. } => "submission",
            RelayError::Config(_) => "config",
            RelayError::Cursor(_) => "cursor",
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Cursor(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Cursor(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError::new(-32005, "limit exceeded");
        assert_eq!(err.to_string(), "rpc error -32005: limit exceeded");
    }

    #[test]
    fn test_window_exhausted_mentions_range() {
        let err = RelayError::WindowExhausted {
            range: BlockRange::new(7, 7),
            source: RpcError::new(-32005, "limit exceeded"),
        };
        assert!(err.to_string().contains("[7, 7]"));
        assert_eq!(err.kind(), "window_exhausted");
    }
}
