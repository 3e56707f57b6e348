//! Swap orchestrator: quote and transaction assembly via an external
//! aggregator
//!
//! Two-phase flow: fetch a quote the caller can review, then exchange the
//! quote for a prebuilt transaction. Quotes carry a TTL; a stale quote is
//! refused at build time so the user never signs against prices they have
//! not seen.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SwapConfig;
use crate::error::{Error, Result};
use crate::types::{TransactionRequest, TxPayload};

/// A reviewed-by-the-caller swap quote
///
/// `route` is the aggregator's quote response verbatim; it is posted back
/// unchanged when the transaction is assembled, so the executed route is
/// exactly the quoted one.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub input_mint: String,
    pub output_mint: String,
    /// Raw input units
    pub in_amount: u64,
    /// Expected raw output units
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub slippage_bps: u16,
    route: Value,
    fetched_at: Instant,
    ttl: Duration,
}

impl SwapQuote {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    dynamic_compute_unit_limit: bool,
    dynamic_slippage: bool,
}

/// Swap quote + build client over an aggregator HTTP API
pub struct SwapOrchestrator {
    client: reqwest::Client,
    base_url: String,
    default_slippage_bps: u16,
    quote_ttl: Duration,
}

impl SwapOrchestrator {
    pub fn new(config: &SwapConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default(),
            base_url: config.aggregator_url.clone(),
            default_slippage_bps: config.default_slippage_bps,
            quote_ttl: Duration::from_secs(config.quote_ttl_secs),
        }
    }

    /// Fetch a quote for swapping `amount` raw units of `input_mint` into
    /// `output_mint`
    pub async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: Option<u16>,
    ) -> Result<SwapQuote> {
        let slippage_bps = slippage_bps.unwrap_or(self.default_slippage_bps);
        let url = format!(
            "{}/v6/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url, input_mint, output_mint, amount, slippage_bps
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "quote API returned {}",
                response.status()
            )));
        }

        let route: Value = response.json().await?;
        let quote = parse_quote(route, slippage_bps, self.quote_ttl)?;

        debug!(
            "Quoted {} {} -> {} {} (impact {:.4}%)",
            quote.in_amount,
            quote.input_mint,
            quote.out_amount,
            quote.output_mint,
            quote.price_impact_pct
        );

        Ok(quote)
    }

    /// Exchange a fresh quote for a signable transaction
    ///
    /// Refuses expired quotes; the caller must re-quote and re-review.
    pub async fn build_swap(
        &self,
        quote: &SwapQuote,
        user: &Pubkey,
    ) -> Result<TransactionRequest> {
        if quote.is_expired() {
            return Err(Error::QuoteExpired {
                age_secs: quote.age().as_secs(),
            });
        }

        let body = SwapRequest {
            quote_response: &quote.route,
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            dynamic_slippage: true,
        };

        let url = format!("{}/v6/swap", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "swap API returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        let encoded = payload["swapTransaction"]
            .as_str()
            .ok_or_else(|| Error::Serialization("missing swapTransaction".to_string()))?;

        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::Serialization(format!("swap transaction base64: {e}")))?;
        let transaction: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| Error::Serialization(format!("swap transaction decode: {e}")))?;

        let blockhash = *transaction.message.recent_blockhash();

        info!(
            "Swap transaction assembled: {} -> {}",
            quote.input_mint, quote.output_mint
        );

        Ok(TransactionRequest {
            payload: TxPayload::Prebuilt(transaction),
            fee_payer: *user,
            blockhash,
        })
    }
}

fn parse_quote(route: Value, slippage_bps: u16, ttl: Duration) -> Result<SwapQuote> {
    fn amount_field(route: &Value, key: &str) -> Result<u64> {
        route[key]
            .as_str()
            .and_then(|a| a.parse::<u64>().ok())
            .ok_or_else(|| Error::Serialization(format!("quote missing {key}")))
    }

    let input_mint = route["inputMint"]
        .as_str()
        .ok_or_else(|| Error::Serialization("quote missing inputMint".to_string()))?
        .to_string();
    let output_mint = route["outputMint"]
        .as_str()
        .ok_or_else(|| Error::Serialization("quote missing outputMint".to_string()))?
        .to_string();
    let in_amount = amount_field(&route, "inAmount")?;
    let out_amount = amount_field(&route, "outAmount")?;
    let price_impact_pct = route["priceImpactPct"]
        .as_str()
        .and_then(|p| p.parse::<f64>().ok())
        .or_else(|| route["priceImpactPct"].as_f64())
        .unwrap_or(0.0);

    Ok(SwapQuote {
        input_mint,
        output_mint,
        in_amount,
        out_amount,
        price_impact_pct,
        slippage_bps,
        route,
        fetched_at: Instant::now(),
        ttl,
    })
}
