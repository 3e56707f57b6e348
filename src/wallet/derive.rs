//! Deterministic key derivation
//!
//! BIP39 mnemonic handling plus SLIP-0010 hardened ed25519 derivation. The
//! same (mnemonic, path) pair always yields the same key material; this
//! determinism is a hard invariant the vault tests pin down.

use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;

use crate::error::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

/// Standard derivation path for the first account on this chain
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/501'/0'/0'";

const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Generate a checksum-valid mnemonic at the given entropy strength
///
/// Accepts the standard BIP39 strengths (128..=256 bits in 32-bit steps).
pub fn generate_mnemonic(strength_bits: usize) -> Result<String> {
    if !matches!(strength_bits, 128 | 160 | 192 | 224 | 256) {
        return Err(Error::Config(format!(
            "unsupported mnemonic strength: {strength_bits} bits"
        )));
    }

    let mut entropy = vec![0u8; strength_bits / 8];
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| Error::Config(format!("mnemonic generation failed: {e}")))?;

    Ok(mnemonic.to_string())
}

/// Parse and checksum-validate a mnemonic phrase
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
    Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))
}

/// Derive a 32-byte ed25519 seed for `path` from a BIP39 seed (SLIP-0010)
pub fn derive_key(seed: &[u8], path: &str) -> Result<[u8; 32]> {
    let segments = parse_path(path)?;

    let (mut key, mut chain_code) = master_key(seed)?;
    for index in segments {
        (key, chain_code) = child_key(&key, &chain_code, index)?;
    }

    Ok(key)
}

fn master_key(seed: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let mut mac = HmacSha512::new_from_slice(b"ed25519 seed")
        .map_err(|e| Error::Config(format!("hmac init failed: {e}")))?;
    mac.update(seed);
    split_digest(mac.finalize().into_bytes().as_slice())
}

fn child_key(key: &[u8; 32], chain_code: &[u8; 32], index: u32) -> Result<([u8; 32], [u8; 32])> {
    let mut mac = HmacSha512::new_from_slice(chain_code)
        .map_err(|e| Error::Config(format!("hmac init failed: {e}")))?;
    mac.update(&[0u8]);
    mac.update(key);
    mac.update(&index.to_be_bytes());
    split_digest(mac.finalize().into_bytes().as_slice())
}

fn split_digest(digest: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let key: [u8; 32] = digest[..32]
        .try_into()
        .map_err(|_| Error::Config("digest split failed".to_string()))?;
    let chain_code: [u8; 32] = digest[32..]
        .try_into()
        .map_err(|_| Error::Config("digest split failed".to_string()))?;
    Ok((key, chain_code))
}

/// Parse a derivation path of the form `m/44'/501'/0'/0'`
///
/// ed25519 only supports hardened derivation, so every segment must carry
/// the hardened marker.
fn parse_path(path: &str) -> Result<Vec<u32>> {
    let mut parts = path.split('/');

    if parts.next() != Some("m") {
        return Err(Error::Config(format!(
            "derivation path must start with 'm': {path}"
        )));
    }

    let mut segments = Vec::new();
    for part in parts {
        let raw = part.strip_suffix('\'').ok_or_else(|| {
            Error::Config(format!("non-hardened segment '{part}' in path {path}"))
        })?;
        let index: u32 = raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid segment '{part}' in path {path}")))?;
        if index >= HARDENED_OFFSET {
            return Err(Error::Config(format!("segment out of range in path {path}")));
        }
        segments.push(index + HARDENED_OFFSET);
    }

    if segments.is_empty() {
        return Err(Error::Config(format!("empty derivation path: {path}")));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_mnemonic_word_counts() {
        let twelve = generate_mnemonic(128).unwrap();
        assert_eq!(twelve.split_whitespace().count(), 12);

        let twenty_four = generate_mnemonic(256).unwrap();
        assert_eq!(twenty_four.split_whitespace().count(), 24);
    }

    #[test]
    fn test_generate_mnemonic_rejects_odd_strength() {
        assert!(generate_mnemonic(100).is_err());
        assert!(generate_mnemonic(0).is_err());
    }

    #[test]
    fn test_generated_mnemonic_validates() {
        let phrase = generate_mnemonic(128).unwrap();
        assert!(parse_mnemonic(&phrase).is_ok());
    }

    #[test]
    fn test_parse_mnemonic_rejects_bad_checksum() {
        // 12 valid words with an invalid checksum
        let phrase = "abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon abandon abandon abandon";
        assert!(matches!(
            parse_mnemonic(phrase),
            Err(Error::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let seed = [7u8; 64];
        let a = derive_key(&seed, DEFAULT_DERIVATION_PATH).unwrap();
        let b = derive_key(&seed, DEFAULT_DERIVATION_PATH).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_key_differs_by_path() {
        let seed = [7u8; 64];
        let a = derive_key(&seed, "m/44'/501'/0'/0'").unwrap();
        let b = derive_key(&seed, "m/44'/501'/1'/0'").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_path_rejects_soft_segments() {
        assert!(derive_key(&[0u8; 64], "m/44/501'/0'/0'").is_err());
        assert!(derive_key(&[0u8; 64], "44'/501'").is_err());
        assert!(derive_key(&[0u8; 64], "m").is_err());
    }
}
