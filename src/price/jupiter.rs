//! Primary price tier: aggregator batch price API
//!
//! Batched lookup by mint with a hard cap per request; oversized sets are
//! split into chunks fetched with bounded concurrency.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::PriceConfig;
use crate::error::{Error, Result};
use crate::types::{PriceQuote, PriceTier, TokenDescriptor};

use super::oracle::PriceSource;

#[derive(Debug, Clone, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: HashMap<String, PriceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceEntry {
    price: f64,
    #[serde(default)]
    mint_symbol: Option<String>,
    #[serde(default)]
    price_change_24h: Option<f64>,
}

/// Batch price API client
pub struct JupiterPriceClient {
    client: reqwest::Client,
    base_url: String,
    max_batch_size: usize,
    max_concurrency: usize,
}

impl JupiterPriceClient {
    pub fn new(config: &PriceConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default(),
            base_url: config.primary_url.clone(),
            max_batch_size: config.max_batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    async fn fetch_batch(&self, mints: &[String]) -> Result<HashMap<String, PriceQuote>> {
        let url = format!("{}/price?ids={}", self.base_url, mints.join(","));
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "price API returned {}",
                response.status()
            )));
        }

        let parsed: PriceResponse = response.json().await?;
        let now = chrono::Utc::now();

        let quotes = parsed
            .data
            .into_iter()
            .map(|(mint, entry)| {
                let quote = PriceQuote {
                    mint: mint.clone(),
                    price_usd: entry.price,
                    change_24h: entry.price_change_24h.unwrap_or(0.0),
                    tier: PriceTier::Primary,
                    fetched_at: now,
                };
                (mint, quote)
            })
            .collect();

        Ok(quotes)
    }
}

#[async_trait::async_trait]
impl PriceSource for JupiterPriceClient {
    fn tier(&self) -> PriceTier {
        PriceTier::Primary
    }

    async fn fetch_prices(&self, mints: &[String]) -> Result<HashMap<String, PriceQuote>> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }

        debug!(
            "Fetching {} prices from primary tier in chunks of {}",
            mints.len(),
            self.max_batch_size
        );

        let chunks: Vec<Vec<String>> = mints
            .chunks(self.max_batch_size)
            .map(|c| c.to_vec())
            .collect();

        let results: Vec<Result<HashMap<String, PriceQuote>>> = stream::iter(chunks)
            .map(|chunk| async move { self.fetch_batch(&chunk).await })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut merged = HashMap::new();
        let mut last_error = None;
        for result in results {
            match result {
                Ok(quotes) => merged.extend(quotes),
                Err(e) => last_error = Some(e),
            }
        }

        // Partial coverage is fine; only a fully empty failed fetch counts
        // as tier unavailability
        if merged.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(merged)
    }

    async fn fetch_metadata(&self, _mints: &[String]) -> Result<HashMap<String, TokenDescriptor>> {
        // The batch price endpoint carries no usable name/logo data; the
        // pair-based tier owns metadata resolution
        Ok(HashMap::new())
    }
}
