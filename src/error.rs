//! Error types for the wallet core

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet core
///
/// Every variant is constructed at the point of failure; no layer above the
/// RPC/HTTP adapters inspects message strings to decide behavior.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Key material errors
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid secret key format: {0}")]
    InvalidSecretFormat(String),

    #[error("No active identity; derive or import a wallet first")]
    NoIdentity,

    // Address validation errors
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    // Balance / token errors
    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("No token account for mint {0}; nothing to send")]
    NoTokenAccount(String),

    #[error("Insufficient balance: {available} lamports available, {required} required")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("Balance fetch failed: {0}")]
    BalanceFetch(String),

    // Swap errors
    #[error("Swap quote expired {age_secs}s ago; request a fresh quote")]
    QuoteExpired { age_secs: u64 },

    // Submission errors
    #[error("A submission is already in flight for this identity")]
    SubmissionInProgress,

    #[error("Provider unavailable (authentication/quota): {0}")]
    ProviderUnavailable(String),

    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    // HTTP / aggregator errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Check if this error is retryable (transient)
    ///
    /// Local validation failures and provider-configuration failures are
    /// never retryable; retrying cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::Http(_) | Error::TransactionSend(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}
