//! Offline transaction signing pipeline
//!
//! Drafts a transfer online, persists it unsigned, signs it after an
//! air-gap delay, and broadcasts the signed artifact. Transactions are kept
//! valid across the delay either by a recent blockhash (short-lived) or by a
//! durable nonce account provisioned at the start of the run.

pub mod artifact;
pub mod broadcaster;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod offline_signer;
pub mod pipeline;
pub mod structured_logging;
pub mod tx_builder;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "nonce manager/mod.rs"]
pub mod nonce_manager;

#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use errors::{PipelineError, Stage};
pub use pipeline::{Pipeline, RunContext, RunMode, RunReport, RunState};
pub use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::Transaction};

#[cfg(test)]
mod tests {
    // Include test modules
    mod nonce_lifecycle_tests;
    mod pipeline_scenario_tests;
    mod signing_properties_tests;
}
