use crate::rpc_manager::RpcManagerError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::SignerError;
use thiserror::Error;

/// Nonce account provisioning and read-back errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NonceError {
    /// RPC operation failed
    #[error("RPC error during {operation}: {source}")]
    Rpc {
        operation: &'static str,
        #[source]
        source: RpcManagerError,
    },

    /// Nonce account not found
    #[error("Nonce account not found: {0}")]
    AccountNotFound(Pubkey),

    /// Nonce account data is malformed or not a usable durable nonce
    #[error("Nonce account error: {0}")]
    InvalidNonceAccount(String),

    /// On-ledger authority differs from the expected one
    #[error("Nonce authority mismatch for {account}: expected {expected}, found {found}")]
    AuthorityMismatch {
        account: Pubkey,
        expected: Pubkey,
        found: Pubkey,
    },

    /// Signing error
    #[error("Signing error: {0}")]
    Signing(String),

    /// Provisioning transaction did not land before its blockhash expired
    #[error("Nonce account creation expired before confirmation: {0}")]
    CreationExpired(String),

    /// Transaction confirmation failed
    #[error("Transaction confirmation failed: {0}")]
    ConfirmationFailed(String),

    /// Wire serialization of the provisioning transaction failed
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl NonceError {
    pub fn rpc(operation: &'static str, source: RpcManagerError) -> Self {
        NonceError::Rpc { operation, source }
    }

    /// Validity reference of the provisioning transaction ran out
    pub fn is_validity_expired(&self) -> bool {
        match self {
            NonceError::CreationExpired(_) => true,
            NonceError::Rpc { source, .. } => source.is_validity_expired(),
            _ => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            NonceError::Rpc { source, .. } => source.category(),
            NonceError::AccountNotFound(_) => "account",
            NonceError::InvalidNonceAccount(_) => "nonce_state",
            NonceError::AuthorityMismatch { .. } => "nonce_state",
            NonceError::Signing(_) => "signing",
            NonceError::CreationExpired(_) => "validity_expired",
            NonceError::ConfirmationFailed(_) => "confirmation",
            NonceError::Encoding(_) => "serialization",
        }
    }
}

// Automatic conversion from SignerError
impl From<SignerError> for NonceError {
    fn from(err: SignerError) -> Self {
        NonceError::Signing(err.to_string())
    }
}

/// Result type for nonce operations
pub type NonceResult<T> = Result<T, NonceError>;
