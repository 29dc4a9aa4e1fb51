//! Error types for chain access.

use thiserror::Error;

/// Errors that can occur while talking to the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport-level failure (HTTP, connection, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The RPC endpoint returned a JSON-RPC error object.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The RPC response did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A block the caller asked about does not exist (yet).
    #[error("block not found: {0}")]
    BlockNotFound(u64),

    /// The transport does not support push subscriptions.
    #[error("subscriptions not supported by this transport")]
    SubscriptionsUnsupported,
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport(err.to_string())
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
