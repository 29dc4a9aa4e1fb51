//! Chain access and event decoding for the issuer registry indexer.
//!
//! This crate isolates everything that touches the chain from the projection
//! pipeline:
//!
//! - [`ChainClient`] is the capability the orchestrator consumes: current
//!   height, block timestamps, log ranges, and (where the transport supports
//!   it) push subscription to new logs.
//! - [`decode_log`] turns a raw contract log into a typed [`IssuerEvent`],
//!   so the same decode path serves both the pull and push delivery modes.
//!
//! Decoding is deliberately tolerant: a log that does not match one of the
//! three registry event signatures is simply not ours, never an error.

mod abi;
pub mod client;
pub mod decode;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{ChainClient, HttpChainClient, HttpClientConfig};
pub use decode::decode_log;
pub use error::{ChainError, ChainResult};
pub use types::{EventEnvelope, IssuerEvent, RawLog};
