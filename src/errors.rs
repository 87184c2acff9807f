//! Run-level error kinds
//!
//! Each stage has its own error type; this module folds them into the
//! kinds a caller acts on. Expiry is kept apart from generic network
//! failures so a caller can decide to re-provision a nonce and restart.

use crate::artifact::ArtifactError;
use crate::broadcaster::BroadcastError;
use crate::nonce_manager::NonceError;
use crate::offline_signer::SigningError;
use crate::pipeline::RunState;
use crate::rpc_manager::RpcManagerError;
use crate::tx_builder::TransactionBuilderError;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage an error originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Provision,
    Draft,
    Sign,
    Broadcast,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Provision => "provision",
            Stage::Draft => "draft",
            Stage::Sign => "sign",
            Stage::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or malformed secret, config value or argument
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ledger unreachable, timed out, or returned an unclassified error
    #[error("Network error during {stage}: {source}")]
    Network {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    /// Blockhash too old, or nonce value stale or consumed
    #[error("Validity reference expired during {stage}: {reason}")]
    ValidityExpired { stage: Stage, reason: String },

    /// Duplicate, insufficient funds, bad signatures or failed execution
    #[error("Rejected by the ledger during {stage}: {source}")]
    Rejected {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    /// Nonce account absent, malformed, or owned by another authority
    #[error("Nonce account unusable during {stage}: {source}")]
    NonceAccount {
        stage: Stage,
        #[source]
        source: NonceError,
    },

    /// Decode failures, and refused writes of incompletely signed artifacts
    #[error("Serialization error during {stage}: {source}")]
    Serialization {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("Signing error during {stage}: {reason}")]
    Signing { stage: Stage, reason: String },

    #[error("Run cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("Stage {stage} cannot run from state {from:?}")]
    InvalidState { stage: Stage, from: RunState },
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Configuration(_) => None,
            Self::Network { stage, .. }
            | Self::ValidityExpired { stage, .. }
            | Self::Rejected { stage, .. }
            | Self::NonceAccount { stage, .. }
            | Self::Serialization { stage, .. }
            | Self::Signing { stage, .. }
            | Self::Cancelled { stage }
            | Self::InvalidState { stage, .. } => Some(*stage),
        }
    }

    pub fn is_validity_expired(&self) -> bool {
        matches!(self, Self::ValidityExpired { .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config",
            Self::Network { .. } => "network",
            Self::ValidityExpired { .. } => "validity_expired",
            Self::Rejected { .. } => "rejected",
            Self::NonceAccount { .. } => "nonce_account",
            Self::Serialization { .. } => "serialization",
            Self::Signing { .. } => "signing",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidState { .. } => "invalid_state",
        }
    }

    /// Classify a ledger error raised while running `stage`
    pub fn from_rpc(stage: Stage, err: RpcManagerError) -> Self {
        if err.is_validity_expired() {
            Self::ValidityExpired {
                stage,
                reason: err.to_string(),
            }
        } else if err.is_rejection() {
            Self::Rejected {
                stage,
                source: Box::new(err),
            }
        } else {
            Self::Network {
                stage,
                source: Box::new(err),
            }
        }
    }

    pub fn from_nonce(stage: Stage, err: NonceError) -> Self {
        let rpc_class = match &err {
            NonceError::Rpc { source, .. } => {
                Some((source.is_validity_expired(), source.is_rejection()))
            }
            _ => None,
        };

        match err {
            NonceError::Rpc { .. } => match rpc_class {
                Some((true, _)) => Self::ValidityExpired {
                    stage,
                    reason: err.to_string(),
                },
                Some((false, true)) => Self::Rejected {
                    stage,
                    source: Box::new(err),
                },
                _ => Self::Network {
                    stage,
                    source: Box::new(err),
                },
            },
            NonceError::CreationExpired(reason) => Self::ValidityExpired { stage, reason },
            NonceError::ConfirmationFailed(_) => Self::Rejected {
                stage,
                source: Box::new(err),
            },
            NonceError::Signing(reason) => Self::Signing { stage, reason },
            NonceError::Encoding(_) => Self::Serialization {
                stage,
                source: Box::new(err),
            },
            NonceError::AccountNotFound(_)
            | NonceError::InvalidNonceAccount(_)
            | NonceError::AuthorityMismatch { .. } => Self::NonceAccount { stage, source: err },
        }
    }

    /// Codec failures, including a fail-closed refusal to write an
    /// incompletely signed artifact
    pub fn from_artifact(stage: Stage, err: ArtifactError) -> Self {
        Self::Serialization {
            stage,
            source: Box::new(err),
        }
    }
}

impl From<NonceError> for PipelineError {
    fn from(err: NonceError) -> Self {
        Self::from_nonce(Stage::Provision, err)
    }
}

impl From<TransactionBuilderError> for PipelineError {
    fn from(err: TransactionBuilderError) -> Self {
        let stage = Stage::Draft;
        match err {
            TransactionBuilderError::NonceState(e) => Self::from_nonce(stage, e),
            TransactionBuilderError::Blockhash(e) => Self::from_rpc(stage, e),
            TransactionBuilderError::Artifact(e) => Self::from_artifact(stage, e),
            TransactionBuilderError::InvalidInstructionOrder(_)
            | TransactionBuilderError::Configuration(_) => Self::Configuration(err.to_string()),
        }
    }
}

impl From<SigningError> for PipelineError {
    fn from(err: SigningError) -> Self {
        let stage = Stage::Sign;
        match err {
            SigningError::Artifact(e) => Self::from_artifact(stage, e),
            SigningError::MissingSigners { .. } | SigningError::Signer(_) => Self::Signing {
                stage,
                reason: err.to_string(),
            },
            SigningError::ModeMismatch { .. } => Self::Configuration(err.to_string()),
            SigningError::Cancelled => Self::Cancelled { stage },
        }
    }
}

impl From<BroadcastError> for PipelineError {
    fn from(err: BroadcastError) -> Self {
        let stage = Stage::Broadcast;
        match err {
            BroadcastError::Artifact(e) => Self::from_artifact(stage, e),
            BroadcastError::Rpc { source, .. } => Self::from_rpc(stage, source),
            BroadcastError::Expired { .. } => Self::ValidityExpired {
                stage,
                reason: err.to_string(),
            },
            BroadcastError::TimedOut { .. } => Self::Network {
                stage,
                source: Box::new(err),
            },
            BroadcastError::Failed { .. } => Self::Rejected {
                stage,
                source: Box::new(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    fn endpoint() -> String {
        "http://localhost:8899".to_string()
    }

    #[test]
    fn test_stale_nonce_is_validity_expired() {
        let err = PipelineError::from(BroadcastError::Rpc {
            operation: "send_transaction",
            source: RpcManagerError::BlockhashNotFound {
                endpoint: endpoint(),
            },
        });
        assert!(err.is_validity_expired());
        assert_eq!(err.stage(), Some(Stage::Broadcast));
    }

    #[test]
    fn test_transport_failure_is_network() {
        let err = PipelineError::from(NonceError::rpc(
            "get_latest_blockhash",
            RpcManagerError::Transport {
                endpoint: endpoint(),
                message: "connection refused".to_string(),
            },
        ));
        assert_eq!(err.category(), "network");
        assert_eq!(err.stage(), Some(Stage::Provision));
        assert!(err.to_string().contains("get_latest_blockhash"));
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let err = PipelineError::from_rpc(
            Stage::Broadcast,
            RpcManagerError::AlreadyProcessed {
                endpoint: endpoint(),
            },
        );
        assert_eq!(err.category(), "rejected");
        assert!(!err.is_validity_expired());
    }

    #[test]
    fn test_unsigned_write_refusal_is_serialization() {
        let err = PipelineError::from(SigningError::Artifact(ArtifactError::MissingSignatures {
            missing: vec![Pubkey::new_unique()],
        }));
        assert_eq!(err.category(), "serialization");
        assert_eq!(err.stage(), Some(Stage::Sign));

        let err = PipelineError::from(BroadcastError::Artifact(ArtifactError::InvalidSignature {
            signer: Pubkey::new_unique(),
        }));
        assert!(matches!(
            err,
            PipelineError::Serialization {
                stage: Stage::Broadcast,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_key_material_is_signing() {
        let err = PipelineError::from(SigningError::MissingSigners {
            missing: vec![Pubkey::new_unique()],
        });
        assert_eq!(err.category(), "signing");
    }

    #[test]
    fn test_draft_nonce_read_failure() {
        let account = Pubkey::new_unique();
        let err = PipelineError::from(TransactionBuilderError::from(
            NonceError::AccountNotFound(account),
        ));
        assert_eq!(err.category(), "nonce_account");
        assert_eq!(err.stage(), Some(Stage::Draft));
    }

    #[test]
    fn test_cancel_keeps_stage() {
        let err = PipelineError::from(SigningError::Cancelled);
        assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Sign }));
    }
}
