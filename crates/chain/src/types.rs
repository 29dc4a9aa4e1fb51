//! Wire-level and domain-level event types.

use alloy_primitives::{Address, Bytes, B256, U256};

/// A raw contract log as delivered by the transport.
///
/// Ordering within a block follows the log index as assigned by the chain;
/// `get_logs` implementations must return logs in ascending
/// (block number, log index) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Contract address that emitted the log.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed payload.
    pub data: Bytes,
    /// Hash of the transaction that emitted the log.
    pub tx_hash: B256,
    /// Block the log was emitted in.
    pub block_number: u64,
    /// Position of the log within its block.
    pub log_index: u64,
}

/// A decoded issuer lifecycle event.
///
/// Closed set: the registry contract emits exactly these three events, and
/// the projector matches on them exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerEvent {
    /// A new issuer application was submitted.
    Submitted {
        issuer: Address,
        name: String,
        categories: Vec<String>,
        proposed_fee: U256,
        public_key: Bytes,
        stake: U256,
    },
    /// A pending application was approved.
    Approved {
        issuer: Address,
        attestation_uid: B256,
        fee_approved: bool,
    },
    /// A pending application was rejected.
    Rejected { issuer: Address },
}

impl IssuerEvent {
    /// The issuer address the event applies to.
    pub fn issuer(&self) -> Address {
        match self {
            IssuerEvent::Submitted { issuer, .. } => *issuer,
            IssuerEvent::Approved { issuer, .. } => *issuer,
            IssuerEvent::Rejected { issuer } => *issuer,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            IssuerEvent::Submitted { .. } => "submitted",
            IssuerEvent::Approved { .. } => "approved",
            IssuerEvent::Rejected { .. } => "rejected",
        }
    }
}

/// A decoded event together with its chain provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub event: IssuerEvent,
    /// Transaction the event originated from.
    pub tx_hash: B256,
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Log index within the block, used for intra-block ordering.
    pub log_index: u64,
}
