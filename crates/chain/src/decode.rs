//! Matching and decoding of the three registry event signatures.
//!
//! Decoding is shared by both delivery paths: the polling loop feeds logs
//! fetched in ranges and the live path feeds logs pushed by a subscription,
//! but both end up here.

use std::sync::LazyLock;

use alloy_primitives::{keccak256, Address, Bytes, B256};

use crate::abi::Decoder;
use crate::types::{EventEnvelope, IssuerEvent, RawLog};

/// `ApplicationSubmitted(address indexed issuer, string name,
/// string[] categories, uint256 proposedFee, bytes publicKey, uint256 stake)`
pub static SUBMITTED_TOPIC: LazyLock<B256> = LazyLock::new(|| {
    keccak256("ApplicationSubmitted(address,string,string[],uint256,bytes,uint256)")
});

/// `ApplicationApproved(address indexed issuer, bytes32 attestationUID,
/// bool feeApproved)`
pub static APPROVED_TOPIC: LazyLock<B256> =
    LazyLock::new(|| keccak256("ApplicationApproved(address,bytes32,bool)"));

/// `ApplicationRejected(address indexed issuer)`
pub static REJECTED_TOPIC: LazyLock<B256> =
    LazyLock::new(|| keccak256("ApplicationRejected(address)"));

/// Attempt to decode a raw log into a registry event.
///
/// Returns `None` both for logs that do not carry one of the three known
/// signatures (not ours, not an error) and for logs that match a signature
/// but carry a malformed payload (logged at debug, then skipped).
pub fn decode_log(log: &RawLog) -> Option<EventEnvelope> {
    let signature = log.topics.first()?;

    let event = if signature == &*SUBMITTED_TOPIC {
        decode_submitted(log)
    } else if signature == &*APPROVED_TOPIC {
        decode_approved(log)
    } else if signature == &*REJECTED_TOPIC {
        decode_rejected(log)
    } else {
        return None;
    };

    match event {
        Some(event) => Some(EventEnvelope {
            event,
            tx_hash: log.tx_hash,
            block_number: log.block_number,
            log_index: log.log_index,
        }),
        None => {
            tracing::debug!(
                tx = %log.tx_hash,
                block = log.block_number,
                "skipping malformed registry log"
            );
            None
        }
    }
}

/// The indexed issuer address lives in `topics[1]`, left-padded to 32 bytes.
fn issuer_topic(log: &RawLog) -> Option<Address> {
    let topic = log.topics.get(1)?;
    Some(Address::from_slice(&topic.as_slice()[12..]))
}

fn decode_submitted(log: &RawLog) -> Option<IssuerEvent> {
    let issuer = issuer_topic(log)?;
    let dec = Decoder::new(&log.data);
    Some(IssuerEvent::Submitted {
        issuer,
        name: dec.string(0)?,
        categories: dec.string_array(1)?,
        proposed_fee: dec.u256(2)?,
        public_key: Bytes::from(dec.bytes(3)?),
        stake: dec.u256(4)?,
    })
}

fn decode_approved(log: &RawLog) -> Option<IssuerEvent> {
    let issuer = issuer_topic(log)?;
    let dec = Decoder::new(&log.data);
    Some(IssuerEvent::Approved {
        issuer,
        attestation_uid: dec.b256(0)?,
        fee_approved: dec.bool(1)?,
    })
}

fn decode_rejected(log: &RawLog) -> Option<IssuerEvent> {
    let issuer = issuer_topic(log)?;
    Some(IssuerEvent::Rejected { issuer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::logs;
    use alloy_primitives::U256;

    #[test]
    fn decodes_submitted_event() {
        let issuer = Address::repeat_byte(0xAA);
        let log = logs::submitted(issuer, 100, 0)
            .name("Acme Attestations")
            .categories(["kyc", "proof-of-reserves"])
            .proposed_fee(U256::from(250u64))
            .stake(U256::from(1_000_000u64))
            .build();

        let envelope = decode_log(&log).expect("submitted log decodes");
        assert_eq!(envelope.block_number, 100);
        match envelope.event {
            IssuerEvent::Submitted {
                issuer: decoded,
                name,
                categories,
                proposed_fee,
                stake,
                ..
            } => {
                assert_eq!(decoded, issuer);
                assert_eq!(name, "Acme Attestations");
                assert_eq!(categories, vec!["kyc", "proof-of-reserves"]);
                assert_eq!(proposed_fee, U256::from(250u64));
                assert_eq!(stake, U256::from(1_000_000u64));
            }
            other => panic!("expected Submitted, got {other:?}"),
        }
    }

    #[test]
    fn decodes_approved_event() {
        let issuer = Address::repeat_byte(0x11);
        let uid = B256::repeat_byte(0xDE);
        let log = logs::approved(issuer, 101, 0, uid, true).build();

        let envelope = decode_log(&log).expect("approved log decodes");
        assert_eq!(
            envelope.event,
            IssuerEvent::Approved {
                issuer,
                attestation_uid: uid,
                fee_approved: true,
            }
        );
    }

    #[test]
    fn decodes_rejected_event() {
        let issuer = Address::repeat_byte(0x22);
        let log = logs::rejected(issuer, 102, 3).build();

        let envelope = decode_log(&log).expect("rejected log decodes");
        assert_eq!(envelope.event, IssuerEvent::Rejected { issuer });
        assert_eq!(envelope.log_index, 3);
    }

    #[test]
    fn unrecognized_signature_is_not_ours() {
        let mut log = logs::rejected(Address::ZERO, 1, 0).build();
        log.topics[0] = B256::repeat_byte(0x99);
        assert!(decode_log(&log).is_none());
    }

    #[test]
    fn missing_issuer_topic_is_skipped() {
        let mut log = logs::rejected(Address::ZERO, 1, 0).build();
        log.topics.truncate(1);
        assert!(decode_log(&log).is_none());
    }

    #[test]
    fn truncated_payload_is_skipped() {
        let mut log = logs::approved(Address::ZERO, 1, 0, B256::ZERO, false).build();
        log.data = Bytes::from(log.data[..31].to_vec());
        assert!(decode_log(&log).is_none());
    }
}
