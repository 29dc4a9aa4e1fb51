//! Daemon configuration, resolved from: defaults < YAML < env vars < CLI
//! flags.
//!
//! Env vars use the `REGISTRYD_` prefix with `__` as the section separator,
//! e.g. `REGISTRYD_CHAIN__RPC_URL`.

use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use registry_chain::HttpClientConfig;
use registry_ingest::RetryStrategy;
use serde::{Deserialize, Serialize};

/// Default config YAML path.
pub const DEFAULT_CONFIG_PATH: &str = "registryd.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Registry contract address.
    pub contract_address: Address,
    /// Block the registry contract was deployed at; ingestion never looks
    /// earlier.
    pub start_block: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::ZERO,
            start_block: 0,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database path.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/registry.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Blocks per log request.
    pub batch_size: u64,
    /// Pause between backfill batches in milliseconds; zero disables
    /// throttling.
    pub batch_delay_ms: u64,
    /// Pause between poll cycles in seconds.
    pub poll_interval_secs: u64,
    /// Shorter pause before the next poll cycle after a failed one.
    pub poll_retry_interval_secs: u64,
    /// First backoff after a failed batch, in seconds.
    pub retry_initial_delay_secs: u64,
    /// Backoff ceiling in seconds.
    pub retry_max_delay_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            batch_delay_ms: 0,
            poll_interval_secs: 12,
            poll_retry_interval_secs: 3,
            retry_initial_delay_secs: 1,
            retry_max_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chain.rpc_url.is_empty() {
            return Err("chain.rpc_url must not be empty".to_string());
        }
        if self.chain.contract_address == Address::ZERO {
            return Err("chain.contract_address must be set".to_string());
        }
        if self.ingest.batch_size == 0 {
            return Err("ingest.batch_size must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            rpc_url: self.chain.rpc_url.clone(),
            contract_address: self.chain.contract_address,
            request_timeout: Duration::from_secs(self.chain.request_timeout_secs),
        }
    }

    pub fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::Exponential {
            initial_delay_secs: self.ingest.retry_initial_delay_secs,
            max_delay_secs: self.ingest.retry_max_delay_secs,
            multiplier: 2.0,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ingest.poll_interval_secs)
    }

    pub fn poll_retry_interval(&self) -> Duration {
        Duration::from_secs(self.ingest.poll_retry_interval_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.ingest.batch_delay_ms)
    }
}

/// Defaults, overlaid with the YAML file (if present), overlaid with env
/// vars. CLI overrides are merged on top by the caller.
pub fn build_figment(config_path: &Path) -> Figment {
    Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Yaml::file(config_path))
        .merge(Env::prefixed("REGISTRYD_").split("__"))
}
