//! Core TxBuilder implementation
//!
//! Resolves the validity reference against the ledger, then assembles one
//! unsigned transfer from it. Both modes share the assembly path; only the
//! reference and the planned instruction list differ.

use crate::artifact;
use crate::nonce_manager::fetch_nonce_state;
use crate::rpc_manager::LedgerRpc;
use crate::tx_builder::context::ValidityReference;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::instructions::{plan_transfer_instructions, sanity_check_ix_order};
use crate::tx_builder::output::TxBuildOutput;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub struct TxBuilder {
    rpc: Arc<dyn LedgerRpc>,
}

impl TxBuilder {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// Read the nonce account and reference its current value
    ///
    /// The stored authority must match `nonce_authority`, otherwise the
    /// advance instruction could never be authorized.
    pub async fn prepare_nonce_validity(
        &self,
        nonce_account: &Pubkey,
        nonce_authority: &Pubkey,
    ) -> Result<ValidityReference, TransactionBuilderError> {
        let state = fetch_nonce_state(self.rpc.as_ref(), nonce_account).await?;

        if state.authority != *nonce_authority {
            return Err(crate::nonce_manager::NonceError::AuthorityMismatch {
                account: *nonce_account,
                expected: *nonce_authority,
                found: state.authority,
            }
            .into());
        }

        debug!(
            nonce_account = %nonce_account,
            nonce_value = %state.nonce_value,
            "Using durable nonce"
        );

        Ok(ValidityReference::NonceReferenced {
            nonce_account: *nonce_account,
            nonce_authority: *nonce_authority,
            nonce_value: state.nonce_value,
        })
    }

    /// Reference the latest blockhash
    pub async fn prepare_blockhash_validity(
        &self,
    ) -> Result<ValidityReference, TransactionBuilderError> {
        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(TransactionBuilderError::Blockhash)?;

        debug!(
            blockhash = %blockhash,
            last_valid_block_height = last_valid_block_height,
            "Using recent blockhash"
        );

        Ok(ValidityReference::BlockhashReferenced {
            blockhash,
            last_valid_block_height,
        })
    }

    /// Resolve the reference for the run: durable when `nonce` names
    /// `(nonce_account, nonce_authority)`, blockhash otherwise
    pub async fn prepare_validity(
        &self,
        nonce: Option<(Pubkey, Pubkey)>,
    ) -> Result<ValidityReference, TransactionBuilderError> {
        match nonce {
            Some((nonce_account, nonce_authority)) => {
                self.prepare_nonce_validity(&nonce_account, &nonce_authority)
                    .await
            }
            None => self.prepare_blockhash_validity().await,
        }
    }

    /// Assemble an unsigned transfer of `lamports` from `sender` to a fresh
    /// destination without persisting it
    pub fn assemble(
        validity: &ValidityReference,
        sender: &Pubkey,
        destination: &Pubkey,
        lamports: u64,
    ) -> Result<Transaction, TransactionBuilderError> {
        let plan = plan_transfer_instructions(validity, sender, destination, lamports)?;
        sanity_check_ix_order(&plan.instructions, plan.is_durable)?;

        let mut tx = Transaction::new_with_payer(&plan.instructions, Some(sender));
        tx.message.recent_blockhash = validity.recent_blockhash();
        Ok(tx)
    }

    /// Draft the transfer and write it to `unsigned_path` with every
    /// signature slot empty
    pub fn build_unsigned(
        &self,
        validity: ValidityReference,
        sender: &Pubkey,
        lamports: u64,
        unsigned_path: &Path,
    ) -> Result<TxBuildOutput, TransactionBuilderError> {
        let destination = Keypair::new().pubkey();
        let tx = Self::assemble(&validity, sender, &destination, lamports)?;

        let encoded = artifact::write(&tx, unsigned_path, false)?;

        info!(
            durable = validity.is_durable(),
            validity = %validity,
            fee_payer = %sender,
            destination = %destination,
            lamports = lamports,
            path = %unsigned_path.display(),
            "Unsigned transaction drafted"
        );

        Ok(TxBuildOutput::new(tx, validity, encoded, destination))
    }
}
