//! Shared projection driver used by every delivery path.

use std::collections::HashMap;

use registry_chain::{decode_log, ChainClient, RawLog};
use registry_store::Projector;

use crate::error::IngestResult;

/// Decode and apply a batch of raw logs in chain order.
///
/// Logs that do not decode to a registry event are skipped. Block
/// timestamps are fetched once per block within the batch. Returns the
/// number of events applied.
///
/// An error here means the batch did not complete; the caller must not
/// advance the cursor and retries the whole batch, which is safe because
/// applying an event twice is a no-op.
pub(crate) async fn project_logs(
    client: &dyn ChainClient,
    projector: &Projector,
    mut logs: Vec<RawLog>,
) -> IngestResult<usize> {
    logs.sort_by_key(|log| (log.block_number, log.log_index));

    let mut timestamps: HashMap<u64, u64> = HashMap::new();
    let mut applied = 0;
    for log in &logs {
        let Some(envelope) = decode_log(log) else {
            continue;
        };
        let block_time = match timestamps.get(&envelope.block_number) {
            Some(time) => *time,
            None => {
                let time = client.block_timestamp(envelope.block_number).await?;
                timestamps.insert(envelope.block_number, time);
                time
            }
        };
        projector.apply(&envelope, block_time)?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Address, B256};
    use registry_chain::test_utils::{block_time, logs, MockChainClient};
    use registry_store::{IssuerStatus, RegistryStore, SqliteRegistryStore};

    use super::*;

    #[tokio::test]
    async fn applies_batch_in_chain_order() {
        let client = MockChainClient::new(100);
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let projector = Projector::new(store.clone());
        let issuer = Address::repeat_byte(0x11);

        // Delivered out of order on purpose; submission must apply first.
        let batch = vec![
            logs::approved(issuer, 20, 0, B256::repeat_byte(1), true).build(),
            logs::submitted(issuer, 10, 0).build(),
        ];

        let applied = project_logs(&client, &projector, batch).await.unwrap();
        assert_eq!(applied, 2);

        let record = store.get_issuer(issuer).unwrap().unwrap();
        assert_eq!(record.status, IssuerStatus::Approved);
        assert_eq!(record.submitted_time, block_time(10));
        assert_eq!(record.decided_time, Some(block_time(20)));
    }

    #[tokio::test]
    async fn foreign_logs_are_skipped() {
        let client = MockChainClient::new(100);
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let projector = Projector::new(store.clone());

        let mut foreign = logs::rejected(Address::repeat_byte(0x22), 5, 0).build();
        foreign.topics[0] = B256::repeat_byte(0x99);

        let applied = project_logs(&client, &projector, vec![foreign])
            .await
            .unwrap();
        assert_eq!(applied, 0);
        assert_eq!(store.status_counts().unwrap().total(), 0);
    }

    #[tokio::test]
    async fn timestamp_failure_fails_the_batch() {
        let client = MockChainClient::new(10);
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let projector = Projector::new(store.clone());

        // Block 50 is past the mock's head, so the timestamp lookup fails.
        let batch = vec![logs::submitted(Address::repeat_byte(0x33), 50, 0).build()];
        assert!(project_logs(&client, &projector, batch).await.is_err());
        assert_eq!(store.status_counts().unwrap().total(), 0);
    }
}
