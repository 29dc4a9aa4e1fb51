//! Domain types for the projected registry state.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Serialize;

/// Lifecycle status of an issuer application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuerStatus {
    Pending,
    Approved,
    Rejected,
}

impl IssuerStatus {
    /// Stable string form used as the database column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerStatus::Pending => "pending",
            IssuerStatus::Approved => "approved",
            IssuerStatus::Rejected => "rejected",
        }
    }

    /// Parse the database column value back.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IssuerStatus::Pending),
            "approved" => Some(IssuerStatus::Approved),
            "rejected" => Some(IssuerStatus::Rejected),
            _ => None,
        }
    }

    /// Whether a decision has been recorded.
    pub fn is_decided(&self) -> bool {
        !matches!(self, IssuerStatus::Pending)
    }
}

/// The projected state of one issuer application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuerRecord {
    pub address: Address,
    pub name: String,
    pub categories: Vec<String>,
    pub proposed_fee: U256,
    pub public_key: Bytes,
    pub stake: U256,
    pub status: IssuerStatus,
    /// Attestation UID assigned on approval.
    pub attestation_uid: Option<B256>,
    /// Whether the proposed fee was accepted, set on approval.
    pub fee_approved: Option<bool>,
    pub submitted_block: u64,
    /// Unix timestamp of the submission block.
    pub submitted_time: u64,
    pub decided_block: Option<u64>,
    pub decided_time: Option<u64>,
    /// Transaction the submission came from; replays of the same
    /// transaction are no-ops.
    pub submit_tx: B256,
    /// Transaction the decision came from, if decided.
    pub decide_tx: Option<B256>,
}

/// Submission fields as handed to the store by the projector.
#[derive(Debug, Clone)]
pub struct Submission {
    pub issuer: Address,
    pub name: String,
    pub categories: Vec<String>,
    pub proposed_fee: U256,
    pub public_key: Bytes,
    pub stake: U256,
    pub block_number: u64,
    pub block_time: u64,
    pub tx_hash: B256,
}

/// Approval fields as handed to the store by the projector.
#[derive(Debug, Clone)]
pub struct Approval {
    pub issuer: Address,
    pub attestation_uid: B256,
    pub fee_approved: bool,
    pub block_number: u64,
    pub block_time: u64,
    pub tx_hash: B256,
}

/// Rejection fields as handed to the store by the projector.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub issuer: Address,
    pub block_number: u64,
    pub block_time: u64,
    pub tx_hash: B256,
}

/// What a write did to the projection.
///
/// Only `Applied` changed state. The other variants are surfaced so the
/// projector can log them; none of them stop the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event changed the projection.
    Applied,
    /// Same originating transaction seen before; state untouched.
    Replayed,
    /// Decision arrived for an issuer with no recorded submission.
    MissingSubmission,
    /// Decision arrived for an issuer already decided by a different
    /// transaction; the first decision stands.
    AlreadyDecided,
}

/// Counts of issuers per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.approved + self.rejected
    }
}
