//! Wallet session: the single owner of the active identity
//!
//! A plain object exposed to callers through read-only accessors plus
//! explicit commands, so wallet lifecycle is decoupled from any
//! presentation layer. The session also serializes transaction submission
//! per identity: a second attempt while one is in flight is rejected, not
//! queued silently.

use solana_sdk::pubkey::Pubkey;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::error::{Error, Result};

use super::vault::{self, Identity};

/// Holds the in-flight submission slot for one identity
///
/// Dropping the permit releases the slot.
pub struct SubmissionPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Session owning the active identity and its submission slot
pub struct WalletSession {
    identity: RwLock<Option<Arc<Identity>>>,
    submission_slot: Arc<Mutex<()>>,
}

impl WalletSession {
    pub fn new() -> Self {
        Self {
            identity: RwLock::new(None),
            submission_slot: Arc::new(Mutex::new(())),
        }
    }

    /// Generate a fresh mnemonic, install the derived identity, and return
    /// the phrase for the caller to back up
    pub fn create(&self, strength_bits: usize) -> Result<String> {
        let mnemonic = vault::generate_mnemonic(strength_bits)?;
        let identity = vault::derive_identity(&mnemonic, None)?;
        self.install(identity);
        Ok(mnemonic)
    }

    /// Derive and install an identity from an existing mnemonic
    pub fn import_mnemonic(&self, mnemonic: &str, path: Option<&str>) -> Result<Pubkey> {
        let identity = vault::derive_identity(mnemonic, path)?;
        let pubkey = identity.pubkey();
        self.install(identity);
        Ok(pubkey)
    }

    /// Install an identity from raw secret material
    pub fn import_raw_secret(&self, secret: &str) -> Result<Pubkey> {
        let identity = vault::import_from_raw_secret(secret)?;
        let pubkey = identity.pubkey();
        self.install(identity);
        Ok(pubkey)
    }

    /// Discard signing material; no signing is possible until a new
    /// identity is derived or imported
    pub fn reset(&self) {
        *self.identity.write().expect("identity lock poisoned") = None;
        info!("Wallet session reset");
    }

    /// Public key of the active identity, if any
    pub fn pubkey(&self) -> Option<Pubkey> {
        self.identity
            .read()
            .expect("identity lock poisoned")
            .as_ref()
            .map(|i| i.pubkey())
    }

    /// Active identity, or `NoIdentity`
    pub fn identity(&self) -> Result<Arc<Identity>> {
        self.identity
            .read()
            .expect("identity lock poisoned")
            .clone()
            .ok_or(Error::NoIdentity)
    }

    /// Claim the submission slot for this identity
    ///
    /// Fails with `SubmissionInProgress` while another submission holds it,
    /// so two submissions can never fetch blockhashes at overlapping times.
    pub fn begin_submission(&self) -> Result<SubmissionPermit> {
        match self.submission_slot.clone().try_lock_owned() {
            Ok(guard) => Ok(SubmissionPermit { _guard: guard }),
            Err(_) => Err(Error::SubmissionInProgress),
        }
    }

    // Identities are replaced wholesale, never mutated in place
    fn install(&self, identity: Identity) {
        let pubkey = identity.pubkey();
        *self.identity.write().expect("identity lock poisoned") = Some(Arc::new(identity));
        info!("Active identity set: {}", pubkey);
    }
}

impl Default for WalletSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_installs_identity() {
        let session = WalletSession::new();
        assert!(session.pubkey().is_none());

        let mnemonic = session.create(128).unwrap();
        assert_eq!(mnemonic.split_whitespace().count(), 12);
        assert!(session.pubkey().is_some());
    }

    #[test]
    fn test_reset_discards_signing_material() {
        let session = WalletSession::new();
        session.create(128).unwrap();
        session.reset();

        assert!(session.pubkey().is_none());
        assert!(matches!(session.identity(), Err(Error::NoIdentity)));
    }

    #[test]
    fn test_reimport_replaces_identity() {
        let session = WalletSession::new();
        session.create(128).unwrap();
        let first = session.pubkey().unwrap();

        session.create(128).unwrap();
        let second = session.pubkey().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_single_submission_slot() {
        let session = WalletSession::new();
        session.create(128).unwrap();

        let permit = session.begin_submission().unwrap();
        assert!(matches!(
            session.begin_submission(),
            Err(Error::SubmissionInProgress)
        ));

        drop(permit);
        assert!(session.begin_submission().is_ok());
    }
}
