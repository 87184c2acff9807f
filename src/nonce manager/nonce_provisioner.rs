//! Durable nonce account provisioning
//!
//! Creates and initializes a fresh nonce account in one transaction, always
//! online against the current blockhash, and blocks until the ledger
//! confirms it. Failures are fatal to the run and never retried.

use super::nonce_errors::{NonceError, NonceResult};
use super::nonce_state::{fetch_nonce_state, NonceAccountState, NONCE_ACCOUNT_SIZE};
use crate::rpc_manager::{ConfirmationOutcome, ConfirmationRequest, LedgerRpc};
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use std::sync::Arc;
use tracing::{debug, info};

/// A nonce account that exists on-ledger and is ready to back transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionedNonce {
    pub nonce_account: Pubkey,
    /// Signature of the creation transaction
    pub signature: Signature,
    pub state: NonceAccountState,
}

/// Creates durable nonce accounts
pub struct NonceProvisioner {
    rpc: Arc<dyn LedgerRpc>,
}

impl NonceProvisioner {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// `[create_account, initialize_nonce]`, funded and authorized by `authority`
    pub fn plan_instructions(
        authority: &Pubkey,
        nonce_account: &Pubkey,
        rent_exempt_lamports: u64,
    ) -> Vec<Instruction> {
        system_instruction::create_nonce_account(
            authority,
            nonce_account,
            authority,
            rent_exempt_lamports,
        )
    }

    /// Create and initialize `nonce_keypair` as a nonce account owned by
    /// `authority`, which also pays for it
    pub async fn provision(
        &self,
        authority: &Keypair,
        nonce_keypair: &Keypair,
    ) -> NonceResult<ProvisionedNonce> {
        let authority_pubkey = authority.pubkey();
        let nonce_pubkey = nonce_keypair.pubkey();

        let rent = self
            .rpc
            .get_minimum_balance_for_rent_exemption(NONCE_ACCOUNT_SIZE)
            .await
            .map_err(|e| NonceError::rpc("get_minimum_balance_for_rent_exemption", e))?;

        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| NonceError::rpc("get_latest_blockhash", e))?;

        let instructions = Self::plan_instructions(&authority_pubkey, &nonce_pubkey, rent);
        let mut tx = Transaction::new_with_payer(&instructions, Some(&authority_pubkey));

        // The new account proves control of its address; the authority pays
        tx.try_sign(&[nonce_keypair, authority], blockhash)?;

        let wire = bincode::serialize(&tx).map_err(|e| NonceError::Encoding(e.to_string()))?;

        debug!(
            nonce_account = %nonce_pubkey,
            authority = %authority_pubkey,
            rent_lamports = rent,
            last_valid_block_height = last_valid_block_height,
            "Submitting nonce account creation"
        );

        let signature = self
            .rpc
            .send_raw_transaction(&wire)
            .await
            .map_err(|e| NonceError::rpc("send_create_nonce_account", e))?;

        let outcome = self
            .rpc
            .confirm_transaction(ConfirmationRequest {
                signature,
                blockhash,
                last_valid_block_height: Some(last_valid_block_height),
            })
            .await
            .map_err(|e| NonceError::rpc("confirm_create_nonce_account", e))?;

        match outcome {
            ConfirmationOutcome::Confirmed => {}
            ConfirmationOutcome::Expired => {
                return Err(NonceError::CreationExpired(format!(
                    "blockhash {} passed block height {}",
                    blockhash, last_valid_block_height
                )));
            }
            ConfirmationOutcome::TimedOut => {
                return Err(NonceError::ConfirmationFailed(format!(
                    "timed out waiting for {}",
                    signature
                )));
            }
            ConfirmationOutcome::Failed(reason) => {
                return Err(NonceError::ConfirmationFailed(reason));
            }
        }

        let state = fetch_nonce_state(self.rpc.as_ref(), &nonce_pubkey).await?;
        if state.authority != authority_pubkey {
            return Err(NonceError::AuthorityMismatch {
                account: nonce_pubkey,
                expected: authority_pubkey,
                found: state.authority,
            });
        }

        info!(
            nonce_account = %nonce_pubkey,
            signature = %signature,
            nonce_value = %state.nonce_value,
            "Nonce account provisioned"
        );

        Ok(ProvisionedNonce {
            nonce_account: nonce_pubkey,
            signature,
            state,
        })
    }
}
