//! Read-side view over the projected registry state.

use std::sync::Arc;

use alloy_primitives::Address;
use serde::Serialize;

use crate::error::StoreResult;
use crate::store::RegistryStore;
use crate::types::{IssuerRecord, IssuerStatus, StatusCounts};

/// Largest page a single listing call will return.
const MAX_PAGE: u32 = 1000;

/// Aggregate view for operators: counts plus ingestion progress.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryOverview {
    pub counts: StatusCounts,
    /// Highest fully processed block, absent before the first commit.
    pub cursor: Option<u64>,
}

/// One page of a listing plus the total number of matching records, so
/// callers can paginate without a second counting query.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub records: Vec<IssuerRecord>,
    pub total: u64,
}

/// Query facade over the store.
///
/// Lives separately from the projection path so callers holding it can only
/// read.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn RegistryStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// The projected record for an issuer, if known.
    pub fn issuer(&self, address: Address) -> StoreResult<Option<IssuerRecord>> {
        self.store.get_issuer(address)
    }

    /// Issuers in a status, most recently touched first.
    pub fn by_status(&self, status: IssuerStatus, limit: u32, offset: u32) -> StoreResult<Page> {
        let records = self
            .store
            .list_by_status(status, limit.min(MAX_PAGE), offset)?;
        let counts = self.store.status_counts()?;
        let total = match status {
            IssuerStatus::Pending => counts.pending,
            IssuerStatus::Approved => counts.approved,
            IssuerStatus::Rejected => counts.rejected,
        };
        Ok(Page { records, total })
    }

    /// All issuers, most recently touched first.
    pub fn all(&self, limit: u32, offset: u32) -> StoreResult<Page> {
        let records = self.store.list_all(limit.min(MAX_PAGE), offset)?;
        let total = self.store.status_counts()?.total();
        Ok(Page { records, total })
    }

    /// Issuer counts per status.
    pub fn counts(&self) -> StoreResult<StatusCounts> {
        self.store.status_counts()
    }

    /// Store health probe, for status reporting.
    pub fn ping(&self) -> StoreResult<()> {
        self.store.ping()
    }

    pub fn overview(&self) -> StoreResult<RegistryOverview> {
        Ok(RegistryOverview {
            counts: self.store.status_counts()?,
            cursor: self.store.cursor()?,
        })
    }
}
