//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub submit: SubmitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    /// Cluster name, used for explorer links ("mainnet-beta" or "devnet")
    #[serde(default = "default_cluster")]
    pub cluster: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            cluster: default_cluster(),
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
    /// Primary aggregator price API base URL
    #[serde(default = "default_price_api_url")]
    pub primary_url: String,
    /// Secondary pair-based DEX lookup base URL
    #[serde(default = "default_dexscreener_url")]
    pub secondary_url: String,
    #[serde(default = "default_price_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum identifiers per batched request; larger sets are chunked
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Concurrent in-flight requests for chunked/per-identifier lookups
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Read-through cache TTL, seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            primary_url: default_price_api_url(),
            secondary_url: default_dexscreener_url(),
            timeout_ms: default_price_timeout_ms(),
            max_batch_size: default_max_batch_size(),
            max_concurrency: default_max_concurrency(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapConfig {
    /// Swap aggregator base URL
    #[serde(default = "default_swap_api_url")]
    pub aggregator_url: String,
    #[serde(default = "default_swap_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_slippage_bps")]
    pub default_slippage_bps: u16,
    /// Quotes older than this must be re-fetched before signing
    #[serde(default = "default_quote_ttl_secs")]
    pub quote_ttl_secs: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            aggregator_url: default_swap_api_url(),
            timeout_ms: default_swap_timeout_ms(),
            default_slippage_bps: default_slippage_bps(),
            quote_ttl_secs: default_quote_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Lamports kept in reserve so a native transfer can always pay its fee
    #[serde(default = "default_reserved_fee_lamports")]
    pub reserved_fee_lamports: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            reserved_fee_lamports: default_reserved_fee_lamports(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitConfig {
    /// Maximum submission attempts for transient provider errors
    #[serde(default = "default_max_send_retries")]
    pub max_send_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Confirmation polling interval
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
    /// Bounded confirmation window; elapsing yields TimedOut, not Failed
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_send_retries: default_max_send_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            confirm_poll_ms: default_confirm_poll_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_cluster() -> String {
    "mainnet-beta".to_string()
}

fn default_rpc_timeout_ms() -> u64 {
    8_000
}

fn default_price_api_url() -> String {
    "https://price.jup.ag/v4".to_string()
}

fn default_dexscreener_url() -> String {
    "https://api.dexscreener.com".to_string()
}

fn default_price_timeout_ms() -> u64 {
    5_000
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_concurrency() -> usize {
    4
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_swap_api_url() -> String {
    "https://quote-api.jup.ag".to_string()
}

fn default_swap_timeout_ms() -> u64 {
    8_000
}

fn default_slippage_bps() -> u16 {
    50
}

fn default_quote_ttl_secs() -> u64 {
    30
}

fn default_reserved_fee_lamports() -> u64 {
    5_000
}

fn default_max_send_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_confirm_poll_ms() -> u64 {
    1_000
}

fn default_confirm_timeout_ms() -> u64 {
    45_000
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix WALLET_)
            .add_source(
                config::Environment::with_prefix("WALLET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.price.max_batch_size == 0 {
            anyhow::bail!("price.max_batch_size must be at least 1");
        }

        if self.price.max_concurrency == 0 {
            anyhow::bail!("price.max_concurrency must be at least 1");
        }

        if self.swap.default_slippage_bps > 10_000 {
            anyhow::bail!("swap.default_slippage_bps cannot exceed 10000 (100%)");
        }

        if self.submit.confirm_timeout_ms < self.submit.confirm_poll_ms {
            anyhow::bail!("submit.confirm_timeout_ms must cover at least one poll interval");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transfer.reserved_fee_lamports, 5_000);
        assert_eq!(config.price.cache_ttl_secs, 30);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("does-not-exist.toml").unwrap();
        assert_eq!(config.rpc.cluster, "mainnet-beta");
        assert_eq!(config.swap.default_slippage_bps, 50);
    }
}
