//! SQLite-backed projection of the issuer registry.
//!
//! Events decoded by the chain layer flow through the [`Projector`] into a
//! [`RegistryStore`], which keeps three things:
//!
//! - one record per issuer address with the full application state,
//! - a status index giving exclusive per-status membership ordered by
//!   recency,
//! - a progress cursor marking the highest fully processed block.
//!
//! Each event is applied in its own write transaction, so a crash at any
//! point leaves the projection at a consistent event boundary. Replays are
//! detected by originating transaction hash and leave state untouched,
//! which is what makes crash-restart re-reads safe.

pub mod error;
pub mod progress;
pub mod projector;
pub mod query;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use progress::ProgressTracker;
pub use projector::Projector;
pub use query::{Page, QueryService, RegistryOverview};
pub use store::{RegistryStore, SqliteRegistryStore};
pub use types::{
    ApplyOutcome, Approval, IssuerRecord, IssuerStatus, Rejection, StatusCounts, Submission,
};
