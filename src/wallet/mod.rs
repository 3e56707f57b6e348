//! Wallet module - key material and session lifecycle
//!
//! Provides:
//! - Deterministic key derivation (BIP39 + SLIP-0010 hardened ed25519)
//! - Raw secret import (base58 or comma-separated byte array)
//! - Target address validation
//! - Session ownership of the single active identity
//!
//! Mnemonics and secret material live only in memory and are never logged
//! or transmitted. Persistence, if a caller wants it, is the caller's
//! problem and happens outside this crate.

pub mod address;
pub mod derive;
pub mod session;
pub mod vault;

pub use address::validate_address;
pub use derive::DEFAULT_DERIVATION_PATH;
pub use session::{SubmissionPermit, WalletSession};
pub use vault::{derive_identity, generate_mnemonic, import_from_raw_secret, Identity};
