//! Secondary price tier: pair-based DEX lookup
//!
//! Per-identifier lookup used for mints the primary tier does not cover.
//! Also the main source of display metadata (symbol, name, logo).

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::PriceConfig;
use crate::error::{Error, Result};
use crate::types::{PriceQuote, PriceTier, TokenDescriptor};

use super::oracle::PriceSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub info: Option<PairInfo>,
    pub liquidity: Option<Liquidity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// Pair-based DEX lookup client
pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
    max_concurrency: usize,
}

impl DexScreenerClient {
    pub fn new(config: &PriceConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default(),
            base_url: config.secondary_url.clone(),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Fetch the most liquid pair for a mint
    pub async fn get_token_pair(&self, mint: &str) -> Result<Option<DexPair>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "pair API returned {}",
                response.status()
            )));
        }

        let data: TokenPairsResponse = response.json().await?;

        let Some(mut pairs) = data.pairs else {
            return Ok(None);
        };

        pairs.sort_by(|a, b| {
            let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            lb.partial_cmp(&la).unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(pairs.into_iter().next())
    }

    async fn lookup_many(&self, mints: &[String]) -> Vec<(String, DexPair)> {
        let results: Vec<Option<(String, DexPair)>> = stream::iter(mints.to_vec())
            .map(|mint| async move {
                match self.get_token_pair(&mint).await {
                    Ok(Some(pair)) => Some((mint, pair)),
                    Ok(None) => None,
                    Err(e) => {
                        debug!("Pair lookup failed for {}: {}", mint, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }
}

fn pair_to_quote(mint: &str, pair: &DexPair) -> Option<PriceQuote> {
    let price_usd = pair.price_usd.as_ref().and_then(|p| p.parse::<f64>().ok())?;

    Some(PriceQuote {
        mint: mint.to_string(),
        price_usd,
        change_24h: pair
            .price_change
            .as_ref()
            .and_then(|pc| pc.h24)
            .unwrap_or(0.0),
        tier: PriceTier::Secondary,
        fetched_at: chrono::Utc::now(),
    })
}

// Pair data carries no decimal precision; leave it unknown rather than
// guess a value an amount conversion could pick up
fn pair_to_descriptor(mint: &str, pair: &DexPair) -> TokenDescriptor {
    let fallback = TokenDescriptor::unresolved(mint);
    TokenDescriptor {
        mint: mint.to_string(),
        symbol: pair
            .base_token
            .symbol
            .clone()
            .unwrap_or(fallback.symbol),
        name: pair.base_token.name.clone().unwrap_or(fallback.name),
        decimals: None,
        logo_uri: pair.info.as_ref().and_then(|i| i.image_url.clone()),
        verified: false,
    }
}

#[async_trait::async_trait]
impl PriceSource for DexScreenerClient {
    fn tier(&self) -> PriceTier {
        PriceTier::Secondary
    }

    async fn fetch_prices(&self, mints: &[String]) -> Result<HashMap<String, PriceQuote>> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }

        let pairs = self.lookup_many(mints).await;
        Ok(pairs
            .iter()
            .filter_map(|(mint, pair)| pair_to_quote(mint, pair).map(|q| (mint.clone(), q)))
            .collect())
    }

    async fn fetch_metadata(&self, mints: &[String]) -> Result<HashMap<String, TokenDescriptor>> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }

        let pairs = self.lookup_many(mints).await;
        Ok(pairs
            .iter()
            .map(|(mint, pair)| (mint.clone(), pair_to_descriptor(mint, pair)))
            .collect())
    }
}
