//! Error types for the Transaction Builder
//!
//! Errors are designed to be:
//! - Informative: the failing ledger read or artifact write is carried as the source
//! - Classifiable: `category()` feeds metrics, `is_network()` separates transport faults

use crate::artifact::ArtifactError;
use crate::nonce_manager::NonceError;
use crate::rpc_manager::RpcManagerError;
use thiserror::Error;

/// Error type for unsigned transaction drafting
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// Reading the nonce account at build time failed
    ///
    /// This typically indicates:
    /// - The nonce account does not exist (not provisioned, or closed)
    /// - The account data is not an initialized durable nonce
    /// - The ledger could not be reached
    #[error("Nonce state unavailable: {0}")]
    NonceState(#[from] NonceError),

    /// Fetching the latest blockhash failed
    #[error("Blockhash error: {0}")]
    Blockhash(#[source] RpcManagerError),

    /// Invalid instruction order or structure
    ///
    /// Durable nonce transactions require advance_nonce_account first and
    /// only there; blockhash transactions must not contain it at all
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persisting the unsigned artifact failed
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

impl TransactionBuilderError {
    /// Ledger could not be reached while resolving the validity reference
    pub fn is_network(&self) -> bool {
        match self {
            Self::Blockhash(_) => true,
            Self::NonceState(NonceError::Rpc { .. }) => true,
            _ => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::NonceState(e) => e.category(),
            Self::Blockhash(_) => "blockhash",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Configuration(_) => "config",
            Self::Artifact(_) => "serialization",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    /// Create an invalid instruction order error
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}
