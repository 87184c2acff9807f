//! RPC Manager Module
//!
//! Ledger access for the signing pipeline. Every stage talks to the ledger
//! through [`LedgerRpc`], so the same stages run against a live cluster
//! ([`RpcLedger`]) or the in-memory ledger used by the tests.

use async_trait::async_trait;
use solana_sdk::{account::Account, hash::Hash, pubkey::Pubkey, signature::Signature};

// Submodules
pub mod rpc_client;
pub mod rpc_config;
pub mod rpc_errors;

// Re-exports for convenience
pub use rpc_client::RpcLedger;
pub use rpc_config::{Cluster, RpcEndpointConfig};
pub use rpc_errors::RpcManagerError;

/// Result type for ledger operations
pub type RpcResult<T> = Result<T, RpcManagerError>;

/// What a confirmation wait is bounded by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub signature: Signature,
    pub blockhash: Hash,
    /// `None` for durable-nonce transactions, which never expire by height
    pub last_valid_block_height: Option<u64>,
}

/// Result of waiting for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    /// Block height passed the reference's last valid height
    Expired,
    TimedOut,
    /// Landed but failed on execution
    Failed(String),
}

/// The ledger operations the pipeline depends on
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Endpoint label used in errors and logs
    fn endpoint(&self) -> String;

    /// Fetch an account; absent accounts are `Ok(None)`
    async fn get_account(&self, pubkey: &Pubkey) -> RpcResult<Option<Account>>;

    /// Latest blockhash and the last block height at which it is valid
    async fn get_latest_blockhash(&self) -> RpcResult<(Hash, u64)>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64>;

    /// Submit serialized wire bytes
    async fn send_raw_transaction(&self, wire: &[u8]) -> RpcResult<Signature>;

    async fn confirm_transaction(
        &self,
        request: ConfirmationRequest,
    ) -> RpcResult<ConfirmationOutcome>;
}
