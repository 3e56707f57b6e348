//! Price oracle: ordered fallback waterfall over provider tiers
//!
//! Tiers are an explicit, ordered list evaluated by one function; adding,
//! removing, or disabling a tier is a construction-time decision, not a
//! scattered boolean. The oracle never raises: every network, parsing, or
//! timeout failure degrades to the next tier or to a fallback entry, so
//! callers can always render a partial result set.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PriceConfig;
use crate::error::Result;
use crate::types::{PriceQuote, PriceTier, TokenDescriptor, NATIVE_MINT};

use super::dexscreener::DexScreenerClient;
use super::jupiter::JupiterPriceClient;

/// One tier of the price/metadata waterfall
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn tier(&self) -> PriceTier;

    /// Prices for the given mints; absent entries fall through to the next
    /// tier
    async fn fetch_prices(&self, mints: &[String]) -> Result<HashMap<String, PriceQuote>>;

    /// Display metadata for the given mints
    async fn fetch_metadata(&self, mints: &[String]) -> Result<HashMap<String, TokenDescriptor>>;
}

/// Hand-maintained price/metadata entry used when every tier fails, and as
/// a metadata override for mints whose on-chain metadata is unreliable
#[derive(Debug, Clone)]
pub struct PinnedToken {
    pub descriptor: TokenDescriptor,
    /// Last-resort price; `None` means "pinned metadata only"
    pub fallback_price_usd: Option<f64>,
}

/// Built-in pinned table for the majors
pub fn pinned_tokens() -> Vec<PinnedToken> {
    fn descriptor(mint: &str, symbol: &str, name: &str, decimals: u8) -> TokenDescriptor {
        TokenDescriptor {
            mint: mint.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals: Some(decimals),
            logo_uri: None,
            verified: true,
        }
    }

    vec![
        PinnedToken {
            descriptor: descriptor(NATIVE_MINT, "SOL", "Solana", 9),
            fallback_price_usd: Some(150.0),
        },
        PinnedToken {
            descriptor: descriptor(
                "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "USDC",
                "USD Coin",
                6,
            ),
            fallback_price_usd: Some(1.0),
        },
        PinnedToken {
            descriptor: descriptor(
                "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
                "USDT",
                "Tether USD",
                6,
            ),
            fallback_price_usd: Some(1.0),
        },
        PinnedToken {
            descriptor: descriptor(
                "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
                "BONK",
                "Bonk",
                5,
            ),
            fallback_price_usd: None,
        },
        PinnedToken {
            descriptor: descriptor(
                "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R",
                "RAY",
                "Raydium",
                6,
            ),
            fallback_price_usd: None,
        },
    ]
}

/// Multi-source price and metadata lookup with graceful degradation
pub struct PriceOracle {
    sources: Vec<Box<dyn PriceSource>>,
    pinned: HashMap<String, PinnedToken>,
    cache: DashMap<String, PriceQuote>,
    cache_ttl: Duration,
}

impl PriceOracle {
    /// Oracle with the standard tier order: batch aggregator, then
    /// pair-based DEX lookup, then the pinned table
    pub fn new(config: &PriceConfig) -> Self {
        let sources: Vec<Box<dyn PriceSource>> = vec![
            Box::new(JupiterPriceClient::new(config)),
            Box::new(DexScreenerClient::new(config)),
        ];
        Self::with_sources(sources, config)
    }

    /// Oracle over an explicit tier list (tests swap in scripted sources)
    pub fn with_sources(sources: Vec<Box<dyn PriceSource>>, config: &PriceConfig) -> Self {
        Self {
            sources,
            pinned: pinned_tokens()
                .into_iter()
                .map(|p| (p.descriptor.mint.clone(), p))
                .collect(),
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
        }
    }

    /// Resolve prices for a set of mints. Never raises.
    ///
    /// Identifiers are deduplicated; a short-lived cache short-circuits
    /// repeated calls for the same set. Mints no tier can price are simply
    /// absent from the result.
    pub async fn get_prices(&self, mints: &[String]) -> HashMap<String, PriceQuote> {
        let mut remaining = dedupe(mints);
        let mut resolved: HashMap<String, PriceQuote> = HashMap::new();

        // Read-through cache; entries past their TTL are refetched
        remaining.retain(|mint| {
            if let Some(cached) = self.cache.get(mint) {
                if cached.age_secs() < self.cache_ttl.as_secs() as i64 {
                    resolved.insert(mint.clone(), cached.clone());
                    return false;
                }
            }
            true
        });

        for source in &self.sources {
            if remaining.is_empty() {
                break;
            }
            match source.fetch_prices(&remaining).await {
                Ok(quotes) => {
                    remaining.retain(|mint| !quotes.contains_key(mint));
                    for (mint, quote) in quotes {
                        // Last writer wins; price data is eventually
                        // consistent anyway
                        self.cache.insert(mint.clone(), quote.clone());
                        resolved.insert(mint, quote);
                    }
                }
                Err(e) => {
                    warn!("Price tier {:?} unavailable: {}", source.tier(), e);
                }
            }
        }

        // Tier 3: pinned fallback prices
        for mint in remaining {
            if let Some(pinned) = self.pinned.get(&mint) {
                if let Some(price) = pinned.fallback_price_usd {
                    debug!("Using pinned fallback price for {}", mint);
                    resolved.insert(
                        mint.clone(),
                        PriceQuote {
                            mint,
                            price_usd: price,
                            change_24h: 0.0,
                            tier: PriceTier::Fallback,
                            fetched_at: chrono::Utc::now(),
                        },
                    );
                }
            }
        }

        resolved
    }

    /// Resolve display metadata for a set of mints. Never raises.
    ///
    /// Pinned overrides take precedence over every generic tier; they exist
    /// for tokens whose on-chain metadata is unreliable.
    pub async fn get_token_metadata(&self, mints: &[String]) -> HashMap<String, TokenDescriptor> {
        let mut remaining = dedupe(mints);
        let mut resolved: HashMap<String, TokenDescriptor> = HashMap::new();

        remaining.retain(|mint| {
            if let Some(pinned) = self.pinned.get(mint) {
                resolved.insert(mint.clone(), pinned.descriptor.clone());
                return false;
            }
            true
        });

        for source in &self.sources {
            if remaining.is_empty() {
                break;
            }
            match source.fetch_metadata(&remaining).await {
                Ok(descriptors) => {
                    remaining.retain(|mint| !descriptors.contains_key(mint));
                    resolved.extend(descriptors);
                }
                Err(e) => {
                    warn!("Metadata tier {:?} unavailable: {}", source.tier(), e);
                }
            }
        }

        resolved
    }
}

fn dedupe(mints: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    mints
        .iter()
        .filter(|m| seen.insert(m.as_str()))
        .cloned()
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testutil::{FailingSource, StaticSource};
    use super::*;
    use crate::config::PriceConfig;

    fn oracle_with(sources: Vec<Box<dyn PriceSource>>) -> PriceOracle {
        PriceOracle::with_sources(sources, &PriceConfig::default())
    }

    #[tokio::test]
    async fn test_primary_failure_degrades_to_secondary() {
        let oracle = oracle_with(vec![
            Box::new(FailingSource(PriceTier::Primary)),
            Box::new(StaticSource {
                tier: PriceTier::Secondary,
                price: 2.5,
            }),
        ]);

        let mints = vec!["mintA".to_string(), "mintB".to_string()];
        let prices = oracle.get_prices(&mints).await;

        assert_eq!(prices.len(), 2);
        assert_eq!(prices["mintA"].tier, PriceTier::Secondary);
        assert!((prices["mintA"].price_usd - 2.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_all_tiers_down_falls_back_to_pinned() {
        let oracle = oracle_with(vec![
            Box::new(FailingSource(PriceTier::Primary)),
            Box::new(FailingSource(PriceTier::Secondary)),
        ]);

        let mints = vec![NATIVE_MINT.to_string(), "unknownMint".to_string()];
        let prices = oracle.get_prices(&mints).await;

        // Never raises; SOL comes from the pinned table, the unknown mint
        // is simply absent
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[NATIVE_MINT].tier, PriceTier::Fallback);
        assert!((prices[NATIVE_MINT].price_usd - 150.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_identifiers_are_deduplicated() {
        let oracle = oracle_with(vec![Box::new(StaticSource {
            tier: PriceTier::Primary,
            price: 1.0,
        })]);

        let mints = vec!["dup".to_string(), "dup".to_string(), "dup".to_string()];
        let prices = oracle.get_prices(&mints).await;
        assert_eq!(prices.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_repeat_calls() {
        let oracle = oracle_with(vec![Box::new(StaticSource {
            tier: PriceTier::Primary,
            price: 3.0,
        })]);

        let mints = vec!["cached".to_string()];
        let first = oracle.get_prices(&mints).await;

        // Second call is served from cache even with no sources left
        let starved = PriceOracle {
            sources: Vec::new(),
            pinned: HashMap::new(),
            cache: oracle.cache.clone(),
            cache_ttl: oracle.cache_ttl,
        };
        let second = starved.get_prices(&mints).await;

        assert_eq!(first["cached"].fetched_at, second["cached"].fetched_at);
    }

    #[tokio::test]
    async fn test_pinned_metadata_overrides_generic_tiers() {
        let oracle = oracle_with(vec![Box::new(StaticSource {
            tier: PriceTier::Primary,
            price: 1.0,
        })]);

        let mints = vec![NATIVE_MINT.to_string(), "otherMint".to_string()];
        let metadata = oracle.get_token_metadata(&mints).await;

        assert_eq!(metadata[NATIVE_MINT].symbol, "SOL");
        assert!(metadata[NATIVE_MINT].verified);
        assert_eq!(metadata[NATIVE_MINT].decimals, Some(9));
        // Non-pinned mint resolved by the generic tier; its precision is
        // unknown, not defaulted
        assert_eq!(metadata["otherMint"].symbol, "OTHE");
        assert_eq!(metadata["otherMint"].decimals, None);
    }
}
