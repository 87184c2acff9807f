//! Transaction build output
//!
//! Holds the drafted transaction together with the validity reference it was
//! built against, the text persisted to the unsigned artifact, and the
//! signer set the offline stage has to satisfy.

use crate::tx_builder::context::ValidityReference;
use solana_sdk::{pubkey::Pubkey, transaction::Transaction};

/// Unsigned transaction ready to cross the signing boundary
#[derive(Debug, Clone)]
pub struct TxBuildOutput {
    /// The drafted transaction; every signature slot is empty
    pub tx: Transaction,

    pub validity: ValidityReference,

    /// Exact text written to the unsigned artifact
    pub encoded: String,

    /// Public keys of all required signers, fee payer first
    /// Extracted from message.header.num_required_signatures
    pub required_signers: Vec<Pubkey>,

    /// Throwaway recipient generated for this draft
    pub destination: Pubkey,
}

impl TxBuildOutput {
    pub fn new(
        tx: Transaction,
        validity: ValidityReference,
        encoded: String,
        destination: Pubkey,
    ) -> Self {
        let required_signers = required_signers(&tx).to_vec();

        Self {
            tx,
            validity,
            encoded,
            required_signers,
            destination,
        }
    }

    pub fn required_signers(&self) -> &[Pubkey] {
        &self.required_signers
    }
}

/// The leading `num_required_signatures` account keys of the message
pub fn required_signers(tx: &Transaction) -> &[Pubkey] {
    let count = (tx.message.header.num_required_signatures as usize)
        .min(tx.message.account_keys.len());
    &tx.message.account_keys[..count]
}
