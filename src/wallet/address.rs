//! Target address validation
//!
//! Cheap local validation that gates every transaction builder before any
//! network call is made.

use solana_sdk::pubkey::{ParsePubkeyError, Pubkey};

use crate::error::{Error, Result};

/// Validate a recipient address string
///
/// Rejects wrong-length and non-base58 strings; returns the parsed key on
/// success. Addresses on this chain are token-agnostic (token holdings
/// live in derived associated accounts), so validation takes no asset
/// parameter.
pub fn validate_address(address: &str) -> Result<Pubkey> {
    address.parse::<Pubkey>().map_err(|e| {
        let reason = match e {
            ParsePubkeyError::WrongSize => "wrong length".to_string(),
            ParsePubkeyError::Invalid => "not valid base58".to_string(),
            other => other.to_string(),
        };
        Error::InvalidAddress {
            address: address.to_string(),
            reason,
        }
    })
}
