//! Transfer builder: native and SPL token transfers
//!
//! Validates a caller-supplied intent against live chain state and produces
//! a fully resolved [`TransactionRequest`]. All checks happen before any
//! signing: a request that comes out of here is known to be payable at the
//! time it was built.

use std::sync::Arc;

use solana_sdk::system_instruction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account;
use tracing::debug;

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::rpc::ChainRpc;
use crate::types::{
    ui_to_raw, TransactionRequest, TransferAsset, TransferIntent, TxPayload, NATIVE_DECIMALS,
};
use crate::wallet::validate_address;

/// Builds transfer transactions from validated intents
pub struct TransferBuilder {
    rpc: Arc<dyn ChainRpc>,
    config: TransferConfig,
}

impl TransferBuilder {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: TransferConfig) -> Self {
        Self { rpc, config }
    }

    /// Build a transfer for either asset kind
    pub async fn build(&self, intent: &TransferIntent) -> Result<TransactionRequest> {
        match &intent.asset {
            TransferAsset::Native => self.build_native(intent).await,
            TransferAsset::Token { mint } => self.build_token(intent, mint).await,
        }
    }

    /// Build a native transfer
    ///
    /// The sender must cover the amount plus the reserved fee; a balance
    /// exactly equal to that sum is sufficient.
    pub async fn build_native(&self, intent: &TransferIntent) -> Result<TransactionRequest> {
        let lamports = ui_to_raw(&intent.amount, NATIVE_DECIMALS)?;
        if lamports == 0 {
            return Err(Error::TransactionBuild(
                "transfer amount must be positive".to_string(),
            ));
        }

        let recipient = validate_address(&intent.recipient)?;

        let available = self.rpc.get_balance(&intent.sender).await?;
        let required = lamports
            .checked_add(self.config.reserved_fee_lamports)
            .ok_or_else(|| Error::TransactionBuild("amount overflow".to_string()))?;
        if available < required {
            return Err(Error::InsufficientBalance {
                available,
                required,
            });
        }

        let instruction = system_instruction::transfer(&intent.sender, &recipient, lamports);
        // Provisional; the submission machine re-fetches under its permit
        let blockhash = self.rpc.get_latest_blockhash().await?;

        debug!(
            "Built native transfer: {} lamports to {}",
            lamports, recipient
        );

        Ok(TransactionRequest {
            payload: TxPayload::Instructions(vec![instruction]),
            fee_payer: intent.sender,
            blockhash,
        })
    }

    /// Build an SPL token transfer
    ///
    /// Decimals come from the mint account on chain, never from cached
    /// metadata. A missing recipient token account is funded by the sender:
    /// the associated-account creation is prepended to the transfer.
    pub async fn build_token(
        &self,
        intent: &TransferIntent,
        mint: &str,
    ) -> Result<TransactionRequest> {
        let recipient = validate_address(&intent.recipient)?;
        let mint_pubkey = validate_address(mint)?;

        let decimals = self.rpc.get_mint_decimals(&mint_pubkey).await?;

        let raw_amount = ui_to_raw(&intent.amount, decimals)?;
        if raw_amount == 0 {
            return Err(Error::TransactionBuild(
                "transfer amount must be positive".to_string(),
            ));
        }

        let holdings = self.rpc.get_token_accounts(&intent.sender).await?;
        let held = holdings
            .iter()
            .find(|a| a.mint == mint)
            .ok_or_else(|| Error::NoTokenAccount(mint.to_string()))?;
        if held.amount < raw_amount {
            return Err(Error::InsufficientBalance {
                available: held.amount,
                required: raw_amount,
            });
        }

        let sender_ata = get_associated_token_address(&intent.sender, &mint_pubkey);
        let recipient_ata = get_associated_token_address(&recipient, &mint_pubkey);

        let mut instructions = Vec::with_capacity(2);
        if !self.rpc.account_exists(&recipient_ata).await? {
            debug!("Recipient token account missing; sender funds creation");
            instructions.push(create_associated_token_account(
                &intent.sender,
                &recipient,
                &mint_pubkey,
                &spl_token::ID,
            ));
        }

        instructions.push(
            spl_token::instruction::transfer_checked(
                &spl_token::ID,
                &sender_ata,
                &mint_pubkey,
                &recipient_ata,
                &intent.sender,
                &[],
                raw_amount,
                decimals,
            )
            .map_err(|e| Error::TransactionBuild(e.to_string()))?,
        );

        let blockhash = self.rpc.get_latest_blockhash().await?;

        Ok(TransactionRequest {
            payload: TxPayload::Instructions(instructions),
            fee_payer: intent.sender,
            blockhash,
        })
    }
}
