//! Broadcast stage
//!
//! Reloads the signed artifact, checks its signatures locally, submits the
//! wire bytes and waits for confirmation. Nothing here is retried: every
//! rejection reaches the caller with its classification intact.

use crate::artifact::{self, ArtifactError};
use crate::rpc_manager::{ConfirmationOutcome, ConfirmationRequest, LedgerRpc, RpcManagerError};
use crate::tx_builder::durable_accounts_of;
use solana_sdk::signature::Signature;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("RPC error during {operation}: {source}")]
    Rpc {
        operation: &'static str,
        #[source]
        source: RpcManagerError,
    },

    /// The blockhash passed its last valid height before the transaction landed
    #[error("Transaction {signature} expired before confirmation")]
    Expired { signature: Signature },

    #[error("Timed out waiting for confirmation of {signature}")]
    TimedOut { signature: Signature },

    /// Landed on-ledger but failed during execution
    #[error("Transaction {signature} failed: {reason}")]
    Failed { signature: Signature, reason: String },
}

impl BroadcastError {
    pub fn is_validity_expired(&self) -> bool {
        match self {
            Self::Expired { .. } => true,
            Self::Rpc { source, .. } => source.is_validity_expired(),
            _ => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Artifact(e) => e.category(),
            Self::Rpc { source, .. } => source.category(),
            Self::Expired { .. } => "validity_expired",
            Self::TimedOut { .. } => "timeout",
            Self::Failed { .. } => "execution",
        }
    }
}

/// Ledger acknowledgement of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub signature: Signature,
    /// Whether the transaction was nonce-referenced
    pub durable: bool,
}

pub struct Broadcaster {
    rpc: Arc<dyn LedgerRpc>,
}

impl Broadcaster {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// Submit the transaction stored at `signed_path`
    ///
    /// `last_valid_block_height` bounds the confirmation wait for blockhash
    /// transactions; durable transactions ignore it and are bounded by the
    /// ledger client's confirmation timeout.
    pub async fn broadcast(
        &self,
        signed_path: &Path,
        last_valid_block_height: Option<u64>,
    ) -> Result<BroadcastReceipt, BroadcastError> {
        let tx = artifact::read(signed_path)?;
        artifact::ensure_fully_signed(&tx)?;
        let wire = artifact::to_wire_bytes(&tx)?;

        let durable = durable_accounts_of(&tx).is_some();
        let blockhash = tx.message.recent_blockhash;

        let signature = self
            .rpc
            .send_raw_transaction(&wire)
            .await
            .map_err(|source| BroadcastError::Rpc {
                operation: "send_transaction",
                source,
            })?;

        info!(
            signature = %signature,
            durable = durable,
            endpoint = %self.rpc.endpoint(),
            "Transaction submitted"
        );

        let outcome = self
            .rpc
            .confirm_transaction(ConfirmationRequest {
                signature,
                blockhash,
                last_valid_block_height: if durable {
                    None
                } else {
                    last_valid_block_height
                },
            })
            .await
            .map_err(|source| BroadcastError::Rpc {
                operation: "confirm_transaction",
                source,
            })?;

        match outcome {
            ConfirmationOutcome::Confirmed => {
                info!(signature = %signature, "Transaction confirmed");
                Ok(BroadcastReceipt { signature, durable })
            }
            ConfirmationOutcome::Expired => {
                warn!(signature = %signature, "Blockhash expired before confirmation");
                Err(BroadcastError::Expired { signature })
            }
            ConfirmationOutcome::TimedOut => Err(BroadcastError::TimedOut { signature }),
            ConfirmationOutcome::Failed(reason) => {
                Err(BroadcastError::Failed { signature, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;
    use crate::tx_builder::TxBuilder;
    use solana_sdk::{
        pubkey::Pubkey,
        signature::{Keypair, Signer},
    };
    use tempfile::tempdir;

    async fn signed_blockhash_transfer(
        ledger: &MockLedger,
        sender: &Keypair,
        path: &Path,
    ) -> u64 {
        let (blockhash, last_valid) = ledger.get_latest_blockhash().await.unwrap();
        let validity = crate::tx_builder::ValidityReference::BlockhashReferenced {
            blockhash,
            last_valid_block_height: last_valid,
        };
        let mut tx =
            TxBuilder::assemble(&validity, &sender.pubkey(), &Pubkey::new_unique(), 1_000_000)
                .unwrap();
        tx.sign(&[sender], blockhash);
        artifact::write(&tx, path, true).unwrap();
        last_valid
    }

    #[tokio::test]
    async fn test_broadcast_confirms() {
        let ledger = Arc::new(MockLedger::new());
        let sender = Keypair::new();
        ledger.airdrop(&sender.pubkey(), 100_000_000);
        let dir = tempdir().unwrap();
        let path = dir.path().join("signed.txt");
        let last_valid = signed_blockhash_transfer(&ledger, &sender, &path).await;

        let receipt = Broadcaster::new(ledger.clone())
            .broadcast(&path, Some(last_valid))
            .await
            .unwrap();
        assert!(!receipt.durable);
        assert_eq!(
            ledger.account(&sender.pubkey()).unwrap().lamports,
            100_000_000 - 1_000_000 - 5_000
        );
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let ledger = Arc::new(MockLedger::new());
        let sender = Keypair::new();
        ledger.airdrop(&sender.pubkey(), 100_000_000);
        let dir = tempdir().unwrap();
        let path = dir.path().join("signed.txt");
        let last_valid = signed_blockhash_transfer(&ledger, &sender, &path).await;

        let broadcaster = Broadcaster::new(ledger.clone());
        broadcaster.broadcast(&path, Some(last_valid)).await.unwrap();
        let err = broadcaster
            .broadcast(&path, Some(last_valid))
            .await
            .unwrap_err();

        assert_eq!(err.category(), "duplicate");
        assert!(!err.is_validity_expired());
    }

    #[tokio::test]
    async fn test_insufficient_funds_surfaced() {
        let ledger = Arc::new(MockLedger::new());
        let sender = Keypair::new();
        ledger.airdrop(&sender.pubkey(), 10_000);
        let dir = tempdir().unwrap();
        let path = dir.path().join("signed.txt");
        let last_valid = signed_blockhash_transfer(&ledger, &sender, &path).await;

        let err = Broadcaster::new(ledger)
            .broadcast(&path, Some(last_valid))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "funds");
    }

    #[tokio::test]
    async fn test_unsigned_artifact_fails_locally() {
        let ledger = Arc::new(MockLedger::new());
        let sender = Keypair::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("signed.txt");

        let validity = crate::tx_builder::ValidityReference::BlockhashReferenced {
            blockhash: solana_sdk::hash::Hash::new_unique(),
            last_valid_block_height: 100,
        };
        let tx = TxBuilder::assemble(&validity, &sender.pubkey(), &Pubkey::new_unique(), 1)
            .unwrap();
        artifact::write(&tx, &path, false).unwrap();

        let err = Broadcaster::new(ledger.clone())
            .broadcast(&path, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BroadcastError::Artifact(ArtifactError::MissingSignatures { .. })
        ));
        assert_eq!(ledger.submitted_count(), 0);
    }
}
