//! Ingestion loops that move registry events from chain to store.
//!
//! Three loops share one projection driver:
//!
//! - [`Backfiller`] catches up from the cursor to a target height in
//!   fixed-size batches, retrying a failed batch in place.
//! - [`Poller`] follows the head by pulling new ranges on an interval.
//! - [`LiveIngestor`] consumes a push subscription where the transport
//!   offers one.
//!
//! The cursor only advances on the pull paths, and only after a whole
//! batch is applied. Everything else about correctness lives in the
//! store's replay detection.

pub mod backfill;
pub mod error;
pub mod live;
pub mod poller;
mod project;
pub mod retry;

pub use backfill::{BackfillOptions, Backfiller};
pub use error::{IngestError, IngestResult};
pub use live::{LiveIngestor, LiveOptions};
pub use poller::{PollOptions, Poller};
pub use retry::RetryStrategy;
