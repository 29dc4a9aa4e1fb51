//! Ingestion progress cursor over the store's metadata.

use std::sync::Arc;

use crate::error::StoreResult;
use crate::store::RegistryStore;

/// Tracks the highest fully processed block.
///
/// Until anything has been processed the cursor is unset and ingestion
/// starts at the configured deployment block.
pub struct ProgressTracker {
    store: Arc<dyn RegistryStore>,
    start_block: u64,
}

impl ProgressTracker {
    /// `start_block` is the registry contract's deployment block.
    pub fn new(store: Arc<dyn RegistryStore>, start_block: u64) -> Self {
        Self { store, start_block }
    }

    /// The next block to process.
    pub fn next_block(&self) -> StoreResult<u64> {
        Ok(match self.store.cursor()? {
            Some(cursor) => cursor + 1,
            None => self.start_block,
        })
    }

    /// Highest fully processed block, if any.
    pub fn current(&self) -> StoreResult<Option<u64>> {
        self.store.cursor()
    }

    /// Mark every block up to and including `height` as processed.
    ///
    /// Called only after all events in the range have been applied, so a
    /// crash before this point re-reads the range instead of skipping it.
    pub fn commit(&self, height: u64) -> StoreResult<()> {
        self.store.set_cursor(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteRegistryStore;

    #[test]
    fn starts_at_deployment_block() {
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let progress = ProgressTracker::new(store, 1000);
        assert_eq!(progress.current().unwrap(), None);
        assert_eq!(progress.next_block().unwrap(), 1000);
    }

    #[test]
    fn resumes_after_the_cursor() {
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let progress = ProgressTracker::new(store, 1000);

        progress.commit(1499).unwrap();
        assert_eq!(progress.current().unwrap(), Some(1499));
        assert_eq!(progress.next_block().unwrap(), 1500);

        // A stale commit cannot move the cursor back.
        progress.commit(1200).unwrap();
        assert_eq!(progress.next_block().unwrap(), 1500);
    }
}
