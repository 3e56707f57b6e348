//! Shared data model for the wallet core
//!
//! Raw integer amounts are the single source of truth; UI amounts are always
//! a derived view. Unit conversion is done with integer math only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::{Error, Result};

/// Wrapped SOL mint, used as the identifier for the native balance
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// Decimal precision of the native asset (1 SOL = 10^9 lamports)
pub const NATIVE_DECIMALS: u8 = 9;

/// Recommended background refresh interval for portfolio polling, seconds
pub const RECOMMENDED_REFRESH_INTERVAL_SECS: u64 = 30;

/// Resolved token metadata. Immutable once resolved.
///
/// `decimals` is `None` until an authoritative source (the pinned table or
/// chain data) has reported it. Display tiers never guess a precision:
/// amount unit bugs are fund-loss bugs, so an unknown value stays unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub decimals: Option<u8>,
    #[serde(rename = "logoURI")]
    pub logo_uri: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

impl TokenDescriptor {
    /// Placeholder descriptor for a mint no tier could resolve
    pub fn unresolved(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            symbol: mint.chars().take(4).collect::<String>().to_uppercase(),
            name: format!("Token {}", mint.chars().take(8).collect::<String>()),
            decimals: None,
            logo_uri: None,
            verified: false,
        }
    }
}

/// Which tier of the price waterfall produced a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTier {
    Primary,
    Secondary,
    Fallback,
}

/// A point-in-time price for one token
///
/// Quotes are ephemeral; callers can inspect `fetched_at` to label stale
/// data instead of silently treating it as fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub mint: String,
    pub price_usd: f64,
    pub change_24h: f64,
    pub tier: PriceTier,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Age of this quote in seconds
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.fetched_at).num_seconds()
    }
}

/// One row of a portfolio: token + raw amount + derived views
#[derive(Debug, Clone)]
pub struct BalanceEntry {
    pub descriptor: TokenDescriptor,
    /// On-chain integer amount (source of truth)
    pub raw_amount: u64,
    /// raw_amount / 10^decimals, derived for display
    pub ui_amount: f64,
    pub quote: Option<PriceQuote>,
    /// ui_amount * price, zero when no price is available
    pub value_usd: f64,
}

/// Unified holdings view produced by the balance aggregator
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub owner: Pubkey,
    pub entries: Vec<BalanceEntry>,
    pub total_value_usd: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Asset selector for a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAsset {
    Native,
    Token { mint: String },
}

/// Caller-supplied transfer intent, validated before it becomes a
/// [`TransactionRequest`]
#[derive(Debug, Clone)]
pub struct TransferIntent {
    pub sender: Pubkey,
    pub recipient: String,
    pub asset: TransferAsset,
    /// Human-entered decimal amount, e.g. "1.5"
    pub amount: String,
}

/// Transaction payload: either instructions we assembled ourselves, or a
/// prebuilt transaction from an external aggregator
#[derive(Debug, Clone)]
pub enum TxPayload {
    Instructions(Vec<Instruction>),
    Prebuilt(VersionedTransaction),
}

/// A fully resolved, signable transaction
///
/// Built by the transfer builder or swap orchestrator, consumed by the
/// submission state machine, discarded after a terminal state. A retried
/// operation builds a fresh request with a fresh blockhash.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub payload: TxPayload,
    pub fee_payer: Pubkey,
    pub blockhash: Hash,
}

/// Terminal status of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Finality reached
    Confirmed,
    /// The network rejected the transaction with an on-chain error
    Failed(String),
    /// The confirmation window elapsed without finality. The transaction
    /// may still land; the caller must re-check by signature before
    /// resubmitting.
    TimedOut,
}

/// Outcome of driving one submission to a terminal state
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub signature: String,
    pub status: SubmissionStatus,
    pub explorer_url: Option<String>,
}

/// Convert a human-entered decimal amount to raw integer units
///
/// Integer math only. Excess fractional digits are truncated (never rounded
/// up), so a conversion can never send more than the user entered.
pub fn ui_to_raw(amount: &str, decimals: u8) -> Result<u64> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(Error::TransactionBuild("empty amount".to_string()));
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(Error::TransactionBuild(format!("invalid amount: {amount}")));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::TransactionBuild(format!("invalid amount: {amount}")));
    }

    let scale = 10u64
        .checked_pow(decimals as u32)
        .ok_or_else(|| Error::TransactionBuild(format!("decimals too large: {decimals}")))?;

    let whole_part: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| Error::TransactionBuild(format!("amount too large: {amount}")))?
    };

    // Truncate fractional digits beyond the token's precision
    let frac_digits: String = frac.chars().take(decimals as usize).collect();
    let frac_part: u64 = if frac_digits.is_empty() {
        0
    } else {
        let parsed: u64 = frac_digits
            .parse()
            .map_err(|_| Error::TransactionBuild(format!("invalid amount: {amount}")))?;
        parsed * 10u64.pow((decimals as usize - frac_digits.len()) as u32)
    };

    whole_part
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_part))
        .ok_or_else(|| Error::TransactionBuild(format!("amount overflow: {amount}")))
}

/// Derive the UI amount from a raw integer amount
pub fn raw_to_ui(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}
