//! Submission state machine
//!
//! Drives a built transaction through sign, submit, and confirm. Transient
//! provider errors during submission are retried with exponential backoff
//! up to a bounded attempt count; confirmation is polled inside a bounded
//! window. An elapsed window is a distinct `TimedOut` outcome, never
//! `Failed`: the transaction may still land, and the caller must re-check
//! by signature before resubmitting.

use backoff::{future::retry, ExponentialBackoff};
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::{Transaction, VersionedTransaction};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SubmitConfig;
use crate::error::{Error, Result};
use crate::rpc::{ChainRpc, SignatureState};
use crate::types::{SubmissionResult, SubmissionStatus, TransactionRequest, TxPayload};
use crate::wallet::{Identity, WalletSession};

/// Signs, submits, and confirms transaction requests
pub struct SubmissionStateMachine {
    rpc: Arc<dyn ChainRpc>,
    config: SubmitConfig,
    cluster: String,
}

impl SubmissionStateMachine {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: SubmitConfig, cluster: &str) -> Self {
        Self {
            rpc,
            config,
            cluster: cluster.to_string(),
        }
    }

    /// Drive one request to a terminal state
    ///
    /// Claims the session's submission slot for the whole flow; a second
    /// call while one is in flight fails with `SubmissionInProgress`. For
    /// assembled payloads the blockhash is re-fetched under the permit, so
    /// no two submissions for one identity ever sign against blockhashes
    /// fetched at overlapping times. Prebuilt payloads keep the blockhash
    /// the aggregator baked into the transaction. The request is consumed:
    /// a retry after any terminal state means building a fresh one.
    pub async fn send(
        &self,
        session: &WalletSession,
        request: TransactionRequest,
    ) -> Result<SubmissionResult> {
        let _permit = session.begin_submission()?;
        let identity = session.identity()?;

        let request = if matches!(request.payload, TxPayload::Instructions(_)) {
            TransactionRequest {
                blockhash: self.rpc.get_latest_blockhash().await?,
                ..request
            }
        } else {
            request
        };

        let transaction = sign(&identity, request)?;
        let signature = self.submit_with_retry(&transaction).await?;
        info!("Transaction submitted: {}", signature);

        let status = self.confirm(&signature).await;
        match &status {
            SubmissionStatus::Confirmed => info!("Transaction confirmed: {}", signature),
            SubmissionStatus::Failed(err) => warn!("Transaction failed: {} ({})", signature, err),
            SubmissionStatus::TimedOut => {
                warn!("Confirmation window elapsed for {}; re-check before retrying", signature)
            }
        }

        Ok(SubmissionResult {
            signature: signature.to_string(),
            status,
            explorer_url: Some(self.explorer_url(&signature)),
        })
    }

    async fn submit_with_retry(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.config.retry_base_delay_ms),
            max_elapsed_time: None,
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);

        retry(policy, || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.rpc.send_transaction(transaction).await {
                Ok(signature) => Ok(signature),
                Err(e) if e.is_retryable() && attempt < self.config.max_send_retries => {
                    warn!("Send attempt {} failed, retrying: {}", attempt, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Poll the signature until a terminal state or the window elapses
    async fn confirm(&self, signature: &Signature) -> SubmissionStatus {
        let poll = Duration::from_millis(self.config.confirm_poll_ms);
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.confirm_timeout_ms);

        loop {
            match self.rpc.signature_state(signature).await {
                Ok(SignatureState::Confirmed) => return SubmissionStatus::Confirmed,
                Ok(SignatureState::Failed(err)) => return SubmissionStatus::Failed(err),
                Ok(SignatureState::Pending) => {}
                // Transient poll failure; the window bounds how long we try
                Err(e) => debug!("Status poll failed: {}", e),
            }

            if tokio::time::Instant::now() >= deadline {
                return SubmissionStatus::TimedOut;
            }
            tokio::time::sleep(poll).await;
        }
    }

    fn explorer_url(&self, signature: &Signature) -> String {
        let base = format!("https://explorer.solana.com/tx/{signature}");
        if self.cluster == "mainnet-beta" {
            base
        } else {
            format!("{}?cluster={}", base, self.cluster)
        }
    }
}

/// Sign a request with the active identity
///
/// Instruction payloads are assembled and signed in one step. Prebuilt
/// payloads already carry a message; the identity's signature is placed at
/// its slot among the required signers.
fn sign(identity: &Identity, request: TransactionRequest) -> Result<VersionedTransaction> {
    match request.payload {
        TxPayload::Instructions(instructions) => {
            let transaction = Transaction::new_signed_with_payer(
                &instructions,
                Some(&request.fee_payer),
                &[identity.keypair()],
                request.blockhash,
            );
            Ok(VersionedTransaction::from(transaction))
        }
        TxPayload::Prebuilt(mut transaction) => {
            let pubkey = identity.pubkey();
            let position = transaction
                .message
                .static_account_keys()
                .iter()
                .position(|key| *key == pubkey)
                .filter(|p| *p < transaction.signatures.len())
                .ok_or_else(|| {
                    Error::TransactionBuild(
                        "active identity is not a required signer".to_string(),
                    )
                })?;

            let signature = identity.keypair().sign_message(&transaction.message.serialize());
            transaction.signatures[position] = signature;
            Ok(transaction)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockRpc;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::{Message, VersionedMessage};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::system_instruction;

    fn fast_config() -> SubmitConfig {
        SubmitConfig {
            max_send_retries: 3,
            retry_base_delay_ms: 1,
            confirm_poll_ms: 5,
            confirm_timeout_ms: 25,
        }
    }

    fn session_with_identity() -> WalletSession {
        let session = WalletSession::new();
        session.create(128).unwrap();
        session
    }

    fn native_request(session: &WalletSession) -> TransactionRequest {
        let sender = session.pubkey().unwrap();
        let instruction = system_instruction::transfer(&sender, &Pubkey::new_unique(), 1_000);
        TransactionRequest {
            payload: TxPayload::Instructions(vec![instruction]),
            fee_payer: sender,
            blockhash: Hash::new_unique(),
        }
    }

    fn prebuilt_request(session: &WalletSession) -> TransactionRequest {
        let sender = session.pubkey().unwrap();
        let instruction = system_instruction::transfer(&sender, &Pubkey::new_unique(), 1_000);
        let blockhash = Hash::new_unique();
        let message = Message::new_with_blockhash(&[instruction], Some(&sender), &blockhash);
        let transaction = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(message),
        };
        TransactionRequest {
            payload: TxPayload::Prebuilt(transaction),
            fee_payer: sender,
            blockhash,
        }
    }

    #[tokio::test]
    async fn test_send_confirms() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new());
        let machine = SubmissionStateMachine::new(rpc.clone(), fast_config(), "mainnet-beta");

        let result = machine.send(&session, native_request(&session)).await.unwrap();

        assert_eq!(result.status, SubmissionStatus::Confirmed);
        assert!(!result.signature.is_empty());
        assert_eq!(
            result.explorer_url.unwrap(),
            format!("https://explorer.solana.com/tx/{}", result.signature)
        );
        assert_eq!(rpc.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_then_confirmed() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new().with_status_script(vec![
            SignatureState::Pending,
            SignatureState::Confirmed,
        ]));
        let machine = SubmissionStateMachine::new(rpc, fast_config(), "mainnet-beta");

        let result = machine.send(&session, native_request(&session)).await.unwrap();
        assert_eq!(result.status, SubmissionStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_on_chain_failure_is_terminal() {
        let session = session_with_identity();
        let rpc = Arc::new(
            MockRpc::new()
                .with_status_script(vec![SignatureState::Failed("custom program error".into())]),
        );
        let machine = SubmissionStateMachine::new(rpc, fast_config(), "mainnet-beta");

        let result = machine.send(&session, native_request(&session)).await.unwrap();
        assert_eq!(
            result.status,
            SubmissionStatus::Failed("custom program error".into())
        );
    }

    #[tokio::test]
    async fn test_elapsed_window_is_timed_out_not_failed() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new().with_status_script(vec![SignatureState::Pending]));
        let machine = SubmissionStateMachine::new(rpc, fast_config(), "mainnet-beta");

        // An Ok result carrying TimedOut: the outcome is unknown, not an error
        let result = machine.send(&session, native_request(&session)).await.unwrap();
        assert_eq!(result.status, SubmissionStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_transient_send_error_is_retried() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new());
        rpc.send_failures
            .lock()
            .unwrap()
            .push(Error::Rpc("connection reset".into()));
        let machine = SubmissionStateMachine::new(rpc.clone(), fast_config(), "mainnet-beta");

        let result = machine.send(&session, native_request(&session)).await.unwrap();
        assert_eq!(result.status, SubmissionStatus::Confirmed);
        assert_eq!(rpc.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_unavailable_is_not_retried() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new());
        rpc.send_failures
            .lock()
            .unwrap()
            .push(Error::ProviderUnavailable("bad api key".into()));
        let machine = SubmissionStateMachine::new(rpc.clone(), fast_config(), "mainnet-beta");

        let err = machine
            .send(&session, native_request(&session))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
        assert!(rpc.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new());
        {
            let mut failures = rpc.send_failures.lock().unwrap();
            for _ in 0..3 {
                failures.push(Error::Rpc("connection reset".into()));
            }
        }
        let machine = SubmissionStateMachine::new(rpc.clone(), fast_config(), "mainnet-beta");

        let err = machine
            .send(&session, native_request(&session))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(rpc.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requires_identity() {
        let session = WalletSession::new();
        let machine =
            SubmissionStateMachine::new(Arc::new(MockRpc::new()), fast_config(), "mainnet-beta");

        let sender = Pubkey::new_unique();
        let request = TransactionRequest {
            payload: TxPayload::Instructions(vec![system_instruction::transfer(
                &sender,
                &Pubkey::new_unique(),
                1,
            )]),
            fee_payer: sender,
            blockhash: Hash::new_unique(),
        };
        assert!(matches!(
            machine.send(&session, request).await,
            Err(Error::NoIdentity)
        ));
    }

    #[tokio::test]
    async fn test_rejects_overlapping_submission() {
        let session = session_with_identity();
        let machine =
            SubmissionStateMachine::new(Arc::new(MockRpc::new()), fast_config(), "mainnet-beta");

        let permit = session.begin_submission().unwrap();
        assert!(matches!(
            machine.send(&session, native_request(&session)).await,
            Err(Error::SubmissionInProgress)
        ));
        drop(permit);
        assert!(machine.send(&session, native_request(&session)).await.is_ok());
    }

    #[tokio::test]
    async fn test_prebuilt_gets_identity_signature() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new());
        let machine = SubmissionStateMachine::new(rpc.clone(), fast_config(), "mainnet-beta");

        let result = machine
            .send(&session, prebuilt_request(&session))
            .await
            .unwrap();
        assert_eq!(result.status, SubmissionStatus::Confirmed);

        let sent = rpc.sent.lock().unwrap();
        let transaction = &sent[0];
        assert_ne!(transaction.signatures[0], Signature::default());
        assert!(transaction.signatures[0].verify(
            session.pubkey().unwrap().as_ref(),
            &transaction.message.serialize()
        ));
    }

    #[tokio::test]
    async fn test_prebuilt_without_signer_slot_rejected() {
        let session = session_with_identity();
        let machine =
            SubmissionStateMachine::new(Arc::new(MockRpc::new()), fast_config(), "mainnet-beta");

        // Message signed by someone else entirely
        let stranger = Pubkey::new_unique();
        let instruction = system_instruction::transfer(&stranger, &Pubkey::new_unique(), 1);
        let blockhash = Hash::new_unique();
        let message = Message::new_with_blockhash(&[instruction], Some(&stranger), &blockhash);
        let request = TransactionRequest {
            payload: TxPayload::Prebuilt(VersionedTransaction {
                signatures: vec![Signature::default()],
                message: VersionedMessage::Legacy(message),
            }),
            fee_payer: stranger,
            blockhash,
        };

        assert!(matches!(
            machine.send(&session, request).await,
            Err(Error::TransactionBuild(_))
        ));
    }

    #[tokio::test]
    async fn test_assembled_blockhash_refreshed_under_permit() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new());
        let machine = SubmissionStateMachine::new(rpc.clone(), fast_config(), "mainnet-beta");

        let request = native_request(&session);
        let build_time_blockhash = request.blockhash;
        machine.send(&session, request).await.unwrap();

        // The signed transaction carries a blockhash fetched while the
        // submission slot was held, not the build-time one
        let sent = rpc.sent.lock().unwrap();
        assert_ne!(*sent[0].message.recent_blockhash(), build_time_blockhash);
    }

    #[tokio::test]
    async fn test_prebuilt_blockhash_left_intact() {
        let session = session_with_identity();
        let rpc = Arc::new(MockRpc::new());
        let machine = SubmissionStateMachine::new(rpc.clone(), fast_config(), "mainnet-beta");

        let request = prebuilt_request(&session);
        let embedded_blockhash = request.blockhash;
        machine.send(&session, request).await.unwrap();

        let sent = rpc.sent.lock().unwrap();
        assert_eq!(*sent[0].message.recent_blockhash(), embedded_blockhash);
    }

    #[tokio::test]
    async fn test_explorer_url_labels_cluster() {
        let machine =
            SubmissionStateMachine::new(Arc::new(MockRpc::new()), fast_config(), "devnet");
        let signature = Signature::default();
        assert_eq!(
            machine.explorer_url(&signature),
            format!("https://explorer.solana.com/tx/{signature}?cluster=devnet")
        );
    }
}
