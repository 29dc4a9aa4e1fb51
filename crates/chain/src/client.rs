//! The chain client capability and its HTTP JSON-RPC implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U64};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::error::{ChainError, ChainResult};
use crate::types::RawLog;

/// Capability the ingestion orchestrator consumes.
///
/// `get_logs` must return logs in ascending (block number, log index) order
/// and is expected to honor the provider's log-window contract (the caller
/// keeps ranges within the configured batch size).
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number the chain has reached.
    async fn current_height(&self) -> ChainResult<u64>;

    /// Unix timestamp (seconds) of the given block.
    async fn block_timestamp(&self, number: u64) -> ChainResult<u64>;

    /// Registry contract logs in `[from, to]`, ascending.
    async fn get_logs(&self, from: u64, to: u64) -> ChainResult<Vec<RawLog>>;

    /// Push delivery of new registry logs.
    ///
    /// Transports without a streaming channel return
    /// [`ChainError::SubscriptionsUnsupported`]; the bootstrap layer falls
    /// back to polling on that signal.
    fn subscribe(&self) -> ChainResult<broadcast::Receiver<RawLog>>;
}

/// Configuration for [`HttpChainClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Registry contract address to filter logs by.
    pub contract_address: Address,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Chain client over plain HTTP JSON-RPC.
///
/// Pull-only: `eth_blockNumber`, `eth_getBlockByNumber`, and `eth_getLogs`.
/// Subscriptions are unsupported, which is exactly the condition the
/// polling fallback exists for.
pub struct HttpChainClient {
    client: reqwest::Client,
    url: String,
    contract: Address,
    next_id: AtomicU64,
}

/// Log object as returned by `eth_getLogs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    transaction_hash: B256,
    block_number: U64,
    log_index: U64,
}

impl From<RpcLog> for RawLog {
    fn from(log: RpcLog) -> Self {
        RawLog {
            address: log.address,
            topics: log.topics,
            data: log.data,
            tx_hash: log.transaction_hash,
            block_number: log.block_number.to::<u64>(),
            log_index: log.log_index.to::<u64>(),
        }
    }
}

impl HttpChainClient {
    /// Build a client; fails only on HTTP client construction.
    pub fn new(config: HttpClientConfig) -> ChainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.rpc_url,
            contract: config.contract_address,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> ChainResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response: Value = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(ChainError::Rpc(error.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::MalformedResponse("missing result".into()))
    }

    fn quantity(value: &Value) -> ChainResult<u64> {
        let parsed: U64 = serde_json::from_value(value.clone())
            .map_err(|e| ChainError::MalformedResponse(format!("bad quantity: {e}")))?;
        Ok(parsed.to::<u64>())
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn current_height(&self) -> ChainResult<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        Self::quantity(&result)
    }

    async fn block_timestamp(&self, number: u64) -> ChainResult<u64> {
        let tag = format!("0x{number:x}");
        let result = self
            .call("eth_getBlockByNumber", json!([tag, false]))
            .await?;
        if result.is_null() {
            return Err(ChainError::BlockNotFound(number));
        }
        let timestamp = result
            .get("timestamp")
            .ok_or_else(|| ChainError::MalformedResponse("block missing timestamp".into()))?;
        Self::quantity(timestamp)
    }

    async fn get_logs(&self, from: u64, to: u64) -> ChainResult<Vec<RawLog>> {
        let filter = json!([{
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
            "address": self.contract,
        }]);
        let result = self.call("eth_getLogs", filter).await?;
        let logs: Vec<RpcLog> = serde_json::from_value(result)
            .map_err(|e| ChainError::MalformedResponse(format!("bad log list: {e}")))?;

        let mut logs: Vec<RawLog> = logs.into_iter().map(Into::into).collect();
        // Providers return logs ordered, but the pipeline's ordering
        // guarantee is ours to keep.
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    fn subscribe(&self) -> ChainResult<broadcast::Receiver<RawLog>> {
        Err(ChainError::SubscriptionsUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rpc_log_object() {
        let raw = json!({
            "address": "0x00000000000000000000000000000000000000aa",
            "topics": [
                "0x1111111111111111111111111111111111111111111111111111111111111111"
            ],
            "data": "0x0102",
            "transactionHash":
                "0x2222222222222222222222222222222222222222222222222222222222222222",
            "blockNumber": "0x64",
            "logIndex": "0x2",
        });

        let log: RpcLog = serde_json::from_value(raw).expect("log parses");
        let log: RawLog = log.into();
        assert_eq!(log.block_number, 100);
        assert_eq!(log.log_index, 2);
        assert_eq!(log.data.as_ref(), &[0x01, 0x02]);
        assert_eq!(log.address, Address::with_last_byte(0xaa));
    }

    #[test]
    fn parses_quantities() {
        assert_eq!(HttpChainClient::quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(HttpChainClient::quantity(&json!("0x64")).unwrap(), 100);
        assert!(HttpChainClient::quantity(&json!("nope")).is_err());
    }

    #[test]
    fn http_client_reports_subscriptions_unsupported() {
        let client = HttpChainClient::new(HttpClientConfig {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::ZERO,
            request_timeout: Duration::from_secs(3),
        })
        .expect("client builds");

        assert!(matches!(
            client.subscribe(),
            Err(ChainError::SubscriptionsUnsupported)
        ));
    }
}
