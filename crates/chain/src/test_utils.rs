//! Scripted chain client and log fixtures for tests.
//!
//! The mock keeps a sorted in-memory log history, a settable head height,
//! deterministic block timestamps, and optional failure injection so
//! orchestrator tests can exercise the no-progress-on-failure contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{ChainError, ChainResult};
use crate::types::RawLog;
use crate::ChainClient;

/// Deterministic timestamp for a block: genesis epoch plus 12s slots.
pub fn block_time(number: u64) -> u64 {
    1_700_000_000 + number * 12
}

/// In-memory chain client for tests.
pub struct MockChainClient {
    logs: Mutex<Vec<RawLog>>,
    height: AtomicU64,
    get_logs_failures: AtomicU64,
    get_logs_calls: AtomicU64,
    subscribe_failures: AtomicU64,
    push: Option<broadcast::Sender<RawLog>>,
}

impl MockChainClient {
    /// Pull-only mock (subscriptions unsupported).
    pub fn new(height: u64) -> Self {
        Self {
            logs: Mutex::new(Vec::new()),
            height: AtomicU64::new(height),
            get_logs_failures: AtomicU64::new(0),
            get_logs_calls: AtomicU64::new(0),
            subscribe_failures: AtomicU64::new(0),
            push: None,
        }
    }

    /// Mock with push delivery enabled.
    pub fn with_subscriptions(height: u64) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            push: Some(tx),
            ..Self::new(height)
        }
    }

    /// Append a log to the scripted history (kept sorted).
    pub fn add_log(&self, log: RawLog) {
        let mut logs = self.logs.lock().unwrap();
        logs.push(log);
        logs.sort_by_key(|l| (l.block_number, l.log_index));
    }

    /// Move the head height.
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `get_logs` fail with a transport error.
    pub fn fail_next_get_logs(&self, n: u64) {
        self.get_logs_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `subscribe` fail with a transport error.
    pub fn fail_next_subscribes(&self, n: u64) {
        self.subscribe_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `get_logs` calls observed so far.
    pub fn get_logs_calls(&self) -> u64 {
        self.get_logs_calls.load(Ordering::SeqCst)
    }

    /// Number of live subscribers. Logs published with no subscriber are
    /// recorded in history but not pushed anywhere.
    pub fn subscriber_count(&self) -> usize {
        self.push.as_ref().map_or(0, |tx| tx.receiver_count())
    }

    /// Push a log to live subscribers (and record it in history).
    pub fn publish(&self, log: RawLog) {
        self.add_log(log.clone());
        if let Some(tx) = &self.push {
            let _ = tx.send(log);
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn current_height(&self) -> ChainResult<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn block_timestamp(&self, number: u64) -> ChainResult<u64> {
        if number > self.height.load(Ordering::SeqCst) {
            return Err(ChainError::BlockNotFound(number));
        }
        Ok(block_time(number))
    }

    async fn get_logs(&self, from: u64, to: u64) -> ChainResult<Vec<RawLog>> {
        self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .get_logs_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainError::Transport("injected failure".into()));
        }
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| log.block_number >= from && log.block_number <= to)
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> ChainResult<broadcast::Receiver<RawLog>> {
        if self
            .subscribe_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainError::Transport("injected subscribe failure".into()));
        }
        match &self.push {
            Some(tx) => Ok(tx.subscribe()),
            None => Err(ChainError::SubscriptionsUnsupported),
        }
    }
}

/// ABI-encoded log fixtures for the three registry events.
pub mod logs {
    use alloy_primitives::{Address, Bytes, B256, U256};

    use crate::abi::encode::{tuple, Value};
    use crate::decode::{APPROVED_TOPIC, REJECTED_TOPIC, SUBMITTED_TOPIC};
    use crate::types::RawLog;

    /// Default registry contract address used by fixtures.
    pub const CONTRACT: Address = Address::repeat_byte(0xC0);

    fn issuer_topic(issuer: Address) -> B256 {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(issuer.as_slice());
        B256::from(word)
    }

    fn tx_hash(block: u64, log_index: u64) -> B256 {
        let mut word = [0u8; 32];
        word[..8].copy_from_slice(&block.to_be_bytes());
        word[8..16].copy_from_slice(&log_index.to_be_bytes());
        B256::from(word)
    }

    /// Builder for a `RawLog` carrying one of the registry events.
    pub struct LogBuilder {
        topics: Vec<B256>,
        data: Vec<u8>,
        block_number: u64,
        log_index: u64,
        submitted: Option<SubmittedFields>,
    }

    struct SubmittedFields {
        name: String,
        categories: Vec<String>,
        proposed_fee: U256,
        public_key: Vec<u8>,
        stake: U256,
    }

    impl LogBuilder {
        /// Override the event name field (submitted logs only).
        pub fn name(mut self, name: &str) -> Self {
            if let Some(fields) = &mut self.submitted {
                fields.name = name.to_string();
            }
            self
        }

        /// Override the requested categories (submitted logs only).
        pub fn categories<I, S>(mut self, categories: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            if let Some(fields) = &mut self.submitted {
                fields.categories = categories.into_iter().map(Into::into).collect();
            }
            self
        }

        /// Override the proposed fee (submitted logs only).
        pub fn proposed_fee(mut self, fee: U256) -> Self {
            if let Some(fields) = &mut self.submitted {
                fields.proposed_fee = fee;
            }
            self
        }

        /// Override the public key bytes (submitted logs only).
        pub fn public_key(mut self, key: &[u8]) -> Self {
            if let Some(fields) = &mut self.submitted {
                fields.public_key = key.to_vec();
            }
            self
        }

        /// Override the stake amount (submitted logs only).
        pub fn stake(mut self, stake: U256) -> Self {
            if let Some(fields) = &mut self.submitted {
                fields.stake = stake;
            }
            self
        }

        pub fn build(self) -> RawLog {
            let data = match &self.submitted {
                Some(fields) => tuple(&[
                    Value::Str(fields.name.clone()),
                    Value::StrArray(fields.categories.clone()),
                    Value::Word(fields.proposed_fee),
                    Value::Bytes(fields.public_key.clone()),
                    Value::Word(fields.stake),
                ]),
                None => self.data,
            };
            RawLog {
                address: CONTRACT,
                topics: self.topics,
                data: Bytes::from(data),
                tx_hash: tx_hash(self.block_number, self.log_index),
                block_number: self.block_number,
                log_index: self.log_index,
            }
        }
    }

    /// An `ApplicationSubmitted` log with overridable fields.
    pub fn submitted(issuer: Address, block: u64, log_index: u64) -> LogBuilder {
        LogBuilder {
            topics: vec![*SUBMITTED_TOPIC, issuer_topic(issuer)],
            data: Vec::new(),
            block_number: block,
            log_index,
            submitted: Some(SubmittedFields {
                name: "Test Issuer".to_string(),
                categories: vec!["kyc".to_string()],
                proposed_fee: U256::from(100u64),
                public_key: vec![0x04, 0x01, 0x02],
                stake: U256::from(10_000u64),
            }),
        }
    }

    /// An `ApplicationApproved` log.
    pub fn approved(
        issuer: Address,
        block: u64,
        log_index: u64,
        attestation_uid: B256,
        fee_approved: bool,
    ) -> LogBuilder {
        LogBuilder {
            topics: vec![*APPROVED_TOPIC, issuer_topic(issuer)],
            data: tuple(&[
                Value::Bytes32(attestation_uid),
                Value::Bool(fee_approved),
            ]),
            block_number: block,
            log_index,
            submitted: None,
        }
    }

    /// An `ApplicationRejected` log.
    pub fn rejected(issuer: Address, block: u64, log_index: u64) -> LogBuilder {
        LogBuilder {
            topics: vec![*REJECTED_TOPIC, issuer_topic(issuer)],
            data: Vec::new(),
            block_number: block,
            log_index,
            submitted: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;

    use super::*;

    #[tokio::test]
    async fn mock_filters_log_ranges() {
        let client = MockChainClient::new(10);
        client.add_log(logs::rejected(Address::repeat_byte(1), 3, 0).build());
        client.add_log(logs::rejected(Address::repeat_byte(2), 7, 0).build());

        let in_range = client.get_logs(1, 5).await.unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].block_number, 3);

        let all = client.get_logs(1, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn mock_injects_failures_then_recovers() {
        let client = MockChainClient::new(10);
        client.fail_next_get_logs(2);

        assert!(client.get_logs(1, 5).await.is_err());
        assert!(client.get_logs(1, 5).await.is_err());
        assert!(client.get_logs(1, 5).await.is_ok());
        assert_eq!(client.get_logs_calls(), 3);
    }

    #[tokio::test]
    async fn mock_push_delivers_to_subscribers() {
        let client = MockChainClient::with_subscriptions(10);
        let mut rx = client.subscribe().unwrap();

        let log = logs::rejected(Address::repeat_byte(3), 5, 0).build();
        client.publish(log.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, log);
    }
}
