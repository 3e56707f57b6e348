//! Blockchain RPC capability interface
//!
//! Components receive an explicitly constructed `Arc<dyn ChainRpc>` at
//! construction time; there is no global or lazily-initialized connection.
//! Any provider satisfying these operations is substitutable, which also
//! makes testing trivial.

use async_trait::async_trait;
use solana_account_decoder::UiAccountData;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::debug;

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// A token account owned by a wallet, as read from the chain
#[derive(Debug, Clone)]
pub struct RawTokenAccount {
    pub mint: String,
    /// Integer amount in the token's raw units
    pub amount: u64,
    /// Decimal precision reported by the chain (authoritative)
    pub decimals: u8,
}

/// Confirmation state of a submitted signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Not yet visible or not yet at the requested commitment
    Pending,
    /// Finality reached
    Confirmed,
    /// Landed with an on-chain error
    Failed(String),
}

/// Capability interface over the blockchain RPC collaborator
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Native balance in lamports
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64>;

    /// All SPL token accounts owned by `owner`
    async fn get_token_accounts(&self, owner: &Pubkey) -> Result<Vec<RawTokenAccount>>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// Whether an account exists on chain (used for ATA existence checks)
    async fn account_exists(&self, pubkey: &Pubkey) -> Result<bool>;

    /// Decimal precision of a mint, from the mint account itself
    async fn get_mint_decimals(&self, mint: &Pubkey) -> Result<u8>;

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature>;

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState>;
}

/// `ChainRpc` implementation over a JSON-RPC HTTP provider
pub struct HttpRpcClient {
    client: RpcClient,
}

impl HttpRpcClient {
    pub fn new(config: &RpcConfig) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
            CommitmentConfig::confirmed(),
        );
        Self { client }
    }
}

/// Classify a provider error at the point of failure
///
/// Authentication/quota problems are configuration errors: retrying cannot
/// help, so they surface as `ProviderUnavailable`. Everything else is a
/// transient `Rpc` error.
fn classify(e: ClientError, context: &str) -> Error {
    if let ClientErrorKind::Reqwest(req) = e.kind() {
        if let Some(status) = req.status() {
            if matches!(status.as_u16(), 401 | 402 | 403) {
                return Error::ProviderUnavailable(format!("{context}: HTTP {status}"));
            }
        }
    }
    Error::Rpc(format!("{context}: {e}"))
}

#[async_trait]
impl ChainRpc for HttpRpcClient {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        self.client
            .get_balance(pubkey)
            .await
            .map_err(|e| classify(e, "get_balance"))
    }

    async fn get_token_accounts(&self, owner: &Pubkey) -> Result<Vec<RawTokenAccount>> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(spl_token::ID))
            .await
            .map_err(|e| classify(e, "get_token_accounts_by_owner"))?;

        let mut balances = Vec::with_capacity(accounts.len());
        for keyed in accounts {
            // jsonParsed encoding; skip anything the node could not decode
            let UiAccountData::Json(parsed) = keyed.account.data else {
                debug!("Skipping unparsed token account {}", keyed.pubkey);
                continue;
            };

            let info = &parsed.parsed["info"];
            let Some(mint) = info["mint"].as_str() else {
                continue;
            };
            let token_amount = &info["tokenAmount"];
            let amount = token_amount["amount"]
                .as_str()
                .and_then(|a| a.parse::<u64>().ok())
                .unwrap_or(0);
            let decimals = token_amount["decimals"].as_u64().unwrap_or(0) as u8;

            balances.push(RawTokenAccount {
                mint: mint.to_string(),
                amount,
                decimals,
            });
        }

        Ok(balances)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| classify(e, "get_latest_blockhash"))
    }

    async fn account_exists(&self, pubkey: &Pubkey) -> Result<bool> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
            .await
            .map_err(|e| classify(e, "get_account"))?;
        Ok(response.value.is_some())
    }

    async fn get_mint_decimals(&self, mint: &Pubkey) -> Result<u8> {
        let response = self
            .client
            .get_account_with_commitment(mint, CommitmentConfig::confirmed())
            .await
            .map_err(|e| classify(e, "get_account"))?;

        let account = response
            .value
            .ok_or_else(|| Error::TokenNotFound(mint.to_string()))?;

        let state = spl_token::state::Mint::unpack(&account.data)
            .map_err(|_| Error::TokenNotFound(mint.to_string()))?;

        Ok(state.decimals)
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        self.client
            .send_transaction(transaction)
            .await
            .map_err(|e| match classify(e, "send_transaction") {
                Error::ProviderUnavailable(msg) => Error::ProviderUnavailable(msg),
                other => Error::TransactionSend(other.to_string()),
            })
    }

    async fn signature_state(&self, signature: &Signature) -> Result<SignatureState> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| classify(e, "get_signature_statuses"))?;

        let state = match response.value.first().and_then(|s| s.clone()) {
            None => SignatureState::Pending,
            Some(status) => {
                if let Some(err) = status.err {
                    SignatureState::Failed(err.to_string())
                } else if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                    SignatureState::Confirmed
                } else {
                    SignatureState::Pending
                }
            }
        };

        Ok(state)
    }
}
