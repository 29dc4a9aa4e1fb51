//! Projection of decoded chain events onto the registry store.

use std::sync::Arc;

use registry_chain::types::{EventEnvelope, IssuerEvent};

use crate::error::StoreResult;
use crate::store::RegistryStore;
use crate::types::{ApplyOutcome, Approval, Rejection, Submission};

/// Applies decoded events to the store, one at a time, in chain order.
///
/// Transition rules live in the store's write transactions; this layer does
/// the field mapping and reports the odd outcomes. An event that cannot be
/// applied cleanly (decision for an unknown issuer, second decision) is
/// logged and skipped rather than stopping the pipeline, since the chain is
/// the authority on what happened.
pub struct Projector {
    store: Arc<dyn RegistryStore>,
}

impl Projector {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Apply one event. `block_time` is the timestamp of the event's block.
    pub fn apply(&self, envelope: &EventEnvelope, block_time: u64) -> StoreResult<ApplyOutcome> {
        let outcome = match &envelope.event {
            IssuerEvent::Submitted {
                issuer,
                name,
                categories,
                proposed_fee,
                public_key,
                stake,
            } => self.store.record_submission(&Submission {
                issuer: *issuer,
                name: name.clone(),
                categories: categories.clone(),
                proposed_fee: *proposed_fee,
                public_key: public_key.clone(),
                stake: *stake,
                block_number: envelope.block_number,
                block_time,
                tx_hash: envelope.tx_hash,
            })?,
            IssuerEvent::Approved {
                issuer,
                attestation_uid,
                fee_approved,
            } => self.store.record_approval(&Approval {
                issuer: *issuer,
                attestation_uid: *attestation_uid,
                fee_approved: *fee_approved,
                block_number: envelope.block_number,
                block_time,
                tx_hash: envelope.tx_hash,
            })?,
            IssuerEvent::Rejected { issuer } => self.store.record_rejection(&Rejection {
                issuer: *issuer,
                block_number: envelope.block_number,
                block_time,
                tx_hash: envelope.tx_hash,
            })?,
        };

        match outcome {
            ApplyOutcome::Applied => {
                tracing::debug!(
                    issuer = %envelope.event.issuer(),
                    kind = envelope.event.kind(),
                    block = envelope.block_number,
                    "applied event"
                );
            }
            ApplyOutcome::Replayed => {
                tracing::debug!(
                    issuer = %envelope.event.issuer(),
                    kind = envelope.event.kind(),
                    tx = %envelope.tx_hash,
                    "replayed event, state untouched"
                );
            }
            ApplyOutcome::MissingSubmission => {
                tracing::warn!(
                    issuer = %envelope.event.issuer(),
                    kind = envelope.event.kind(),
                    block = envelope.block_number,
                    "decision for issuer with no recorded submission, skipping"
                );
            }
            ApplyOutcome::AlreadyDecided => {
                tracing::warn!(
                    issuer = %envelope.event.issuer(),
                    kind = envelope.event.kind(),
                    block = envelope.block_number,
                    "issuer already decided, keeping first decision"
                );
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes, B256, U256};

    use super::*;
    use crate::store::SqliteRegistryStore;
    use crate::types::IssuerStatus;

    fn submitted(issuer: Address, block: u64, tx_n: u64) -> EventEnvelope {
        EventEnvelope {
            event: IssuerEvent::Submitted {
                issuer,
                name: "acme".to_string(),
                categories: vec!["kyc".to_string()],
                proposed_fee: U256::from(10u64),
                public_key: Bytes::from(vec![4, 2]),
                stake: U256::from(1000u64),
            },
            tx_hash: B256::from(U256::from(tx_n)),
            block_number: block,
            log_index: 0,
        }
    }

    fn approved(issuer: Address, block: u64, tx_n: u64) -> EventEnvelope {
        EventEnvelope {
            event: IssuerEvent::Approved {
                issuer,
                attestation_uid: B256::repeat_byte(0xEE),
                fee_approved: false,
            },
            tx_hash: B256::from(U256::from(tx_n)),
            block_number: block,
            log_index: 1,
        }
    }

    #[test]
    fn projects_a_full_lifecycle() {
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let projector = Projector::new(store.clone());
        let issuer = Address::repeat_byte(0x55);

        let outcome = projector.apply(&submitted(issuer, 5, 1), 500).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        let outcome = projector.apply(&approved(issuer, 8, 2), 800).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        let record = store.get_issuer(issuer).unwrap().unwrap();
        assert_eq!(record.status, IssuerStatus::Approved);
        assert_eq!(record.submitted_time, 500);
        assert_eq!(record.decided_time, Some(800));
    }

    #[test]
    fn orphan_decision_does_not_fail_the_pipeline() {
        let store = Arc::new(SqliteRegistryStore::in_memory().unwrap());
        let projector = Projector::new(store);
        let issuer = Address::repeat_byte(0x66);

        let outcome = projector.apply(&approved(issuer, 8, 1), 800).unwrap();
        assert_eq!(outcome, ApplyOutcome::MissingSubmission);
    }
}
