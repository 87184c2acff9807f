//! Offline signing stage
//!
//! Reloads the unsigned artifact, waits out the air-gap delay, applies the
//! provided keys to the slots they own and persists the signed artifact.
//! The signed artifact is only written once every required slot verifies.
//!
//! Keys that no instruction requires are skipped with a debug log rather
//! than rejected, so one key list can serve both modes.

use crate::artifact::{self, ArtifactError};
use crate::pipeline::RunMode;
use crate::tx_builder::{durable_accounts_of, required_signers};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    signer::SignerError,
    transaction::Transaction,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// No key was provided for these required signers
    #[error("Missing key material for required signer(s): {}", format_keys(.missing))]
    MissingSigners { missing: Vec<Pubkey> },

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    /// The artifact was drafted for the other mode
    #[error("Artifact mode mismatch: run is {expected:?}, artifact is {found:?}")]
    ModeMismatch { expected: RunMode, found: RunMode },

    #[error("Signing cancelled before the delay elapsed")]
    Cancelled,
}

impl SigningError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Artifact(e) => e.category(),
            Self::MissingSigners { .. } | Self::Signer(_) => "signing",
            Self::ModeMismatch { .. } => "mode",
            Self::Cancelled => "cancelled",
        }
    }
}

fn format_keys(keys: &[Pubkey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// External request to abandon the signing wait
///
/// Cloning shares the same signal.
#[derive(Clone, Debug)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // Errors only once the sender is dropped, which cannot be signalled
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative air-gap wait; zero or negative durations return immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningDelay {
    pub duration_ms: i64,
}

impl SigningDelay {
    pub fn from_millis(duration_ms: i64) -> Self {
        Self { duration_ms }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.max(0) as u64)
    }

    pub async fn wait(&self, cancel: &CancellationSignal) -> Result<(), SigningError> {
        if cancel.is_cancelled() {
            return Err(SigningError::Cancelled);
        }
        if self.duration_ms <= 0 {
            return Ok(());
        }

        debug!(delay_ms = self.duration_ms, "Waiting before signing");
        tokio::select! {
            _ = tokio::time::sleep(self.duration()) => Ok(()),
            _ = cancel.cancelled() => Err(SigningError::Cancelled),
        }
    }
}

/// Result of the signing stage
#[derive(Debug, Clone)]
pub struct SignedArtifact {
    pub tx: Transaction,
    /// Exact text written to the signed artifact
    pub encoded: String,
    /// Keys that contributed a signature, in slot order
    pub signers: Vec<Pubkey>,
}

pub struct OfflineSigner {
    cancel: CancellationSignal,
}

impl OfflineSigner {
    pub fn new(cancel: CancellationSignal) -> Self {
        Self { cancel }
    }

    /// Reload `unsigned_path`, wait `delay`, sign with the applicable
    /// `signers` and write `signed_path`
    ///
    /// Nonce mode needs `[authority, sender]`, blockhash mode `[sender]`.
    /// Nothing is written unless every required slot ends up signed.
    pub async fn sign(
        &self,
        mode: RunMode,
        unsigned_path: &Path,
        signed_path: &Path,
        signers: &[&Keypair],
        delay: SigningDelay,
    ) -> Result<SignedArtifact, SigningError> {
        let mut tx = artifact::read(unsigned_path)?;

        let found = if durable_accounts_of(&tx).is_some() {
            RunMode::Nonce
        } else {
            RunMode::Blockhash
        };
        if found != mode {
            return Err(SigningError::ModeMismatch {
                expected: mode,
                found,
            });
        }

        delay.wait(&self.cancel).await?;

        let required = required_signers(&tx).to_vec();
        let applicable = select_signers(&required, signers);

        let missing: Vec<Pubkey> = required
            .iter()
            .filter(|key| !applicable.iter().any(|kp| kp.pubkey() == **key))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SigningError::MissingSigners { missing });
        }

        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&applicable, blockhash)?;

        let encoded = artifact::write(&tx, signed_path, true)?;

        info!(
            mode = ?mode,
            signers = required.len(),
            path = %signed_path.display(),
            "Transaction signed"
        );

        Ok(SignedArtifact {
            tx,
            encoded,
            signers: required,
        })
    }
}

/// Keep the keys that own a required slot, dropping duplicates
fn select_signers<'a>(required: &[Pubkey], signers: &[&'a Keypair]) -> Vec<&'a Keypair> {
    let mut selected: Vec<&'a Keypair> = Vec::with_capacity(required.len());
    for keypair in signers {
        let pubkey = keypair.pubkey();
        if !required.contains(&pubkey) {
            debug!(signer = %pubkey, "Key not required by the transaction, ignoring");
            continue;
        }
        if selected.iter().any(|kp| kp.pubkey() == pubkey) {
            continue;
        }
        selected.push(keypair);
    }
    selected
}
