//! Key vault: identity derivation and import
//!
//! All state is in memory. Mnemonics and secret key material are never
//! logged and never leave this module except inside an [`Identity`].

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::keypair_from_seed;
use solana_sdk::signer::Signer;
use std::fmt;

use crate::error::{Error, Result};

use super::derive::{self, DEFAULT_DERIVATION_PATH};

const SECRET_KEY_LEN: usize = 64;

/// An in-memory signing identity
///
/// Owned by the session that created or imported it; replaced wholesale on
/// import/reset, never mutated in place.
pub struct Identity {
    path: String,
    keypair: Keypair,
}

impl Identity {
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Derivation path, or `"imported"` for raw-secret imports
    pub fn derivation_path(&self) -> &str {
        &self.path
    }
}

// Signing material stays out of logs
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("path", &self.path)
            .field("pubkey", &self.pubkey())
            .field("keypair", &"<redacted>")
            .finish()
    }
}

/// Generate a cryptographically random, checksum-valid mnemonic
pub fn generate_mnemonic(strength_bits: usize) -> Result<String> {
    derive::generate_mnemonic(strength_bits)
}

/// Deterministically derive an identity from a mnemonic and path
///
/// Fails with `InvalidMnemonic` when checksum validation fails. Two
/// derivations of the same (mnemonic, path) always yield the same public
/// key.
pub fn derive_identity(mnemonic: &str, path: Option<&str>) -> Result<Identity> {
    let parsed = derive::parse_mnemonic(mnemonic)?;
    let path = path.unwrap_or(DEFAULT_DERIVATION_PATH);

    let seed = parsed.to_seed("");
    let key = derive::derive_key(&seed, path)?;

    let keypair = keypair_from_seed(&key)
        .map_err(|e| Error::Config(format!("keypair derivation failed: {e}")))?;

    Ok(Identity {
        path: path.to_string(),
        keypair,
    })
}

/// Import an identity from raw secret material
///
/// Accepts either a base58-encoded 64-byte secret key or a comma-separated
/// byte array (the two export formats wallets commonly produce).
pub fn import_from_raw_secret(secret: &str) -> Result<Identity> {
    let secret = secret.trim();

    if let Ok(decoded) = bs58::decode(secret).into_vec() {
        if decoded.len() == SECRET_KEY_LEN {
            return keypair_from_secret_bytes(&decoded);
        }
    }

    let bytes: Vec<u8> = secret
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| {
            Error::InvalidSecretFormat(
                "expected base58 or a comma-separated 64-byte array".to_string(),
            )
        })?;

    if bytes.len() != SECRET_KEY_LEN {
        return Err(Error::InvalidSecretFormat(format!(
            "expected {SECRET_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    keypair_from_secret_bytes(&bytes)
}

fn keypair_from_secret_bytes(bytes: &[u8]) -> Result<Identity> {
    let keypair = Keypair::from_bytes(bytes)
        .map_err(|e| Error::InvalidSecretFormat(format!("invalid keypair bytes: {e}")))?;

    Ok(Identity {
        path: "imported".to_string(),
        keypair,
    })
}
