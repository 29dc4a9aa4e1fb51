//! Error types for the ingestion loops.

use thiserror::Error;

/// Errors surfaced by the ingestion loops.
///
/// Inside a loop most of these are retried rather than propagated; they
/// reach the caller only where retrying is not this layer's call, e.g. a
/// transport without subscription support.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Chain access failed.
    #[error("chain error: {0}")]
    Chain(#[from] registry_chain::ChainError),

    /// Projection write or read failed.
    #[error("store error: {0}")]
    Store(#[from] registry_store::StoreError),
}

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;
