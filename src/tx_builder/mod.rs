//! Transaction Builder
//!
//! Drafts the unsigned transfer in one of two modes:
//! - **durable nonce**: `[advance_nonce_account, transfer]`, referencing the
//!   nonce value read back from the ledger at build time
//! - **recent blockhash**: `[transfer]`, referencing the latest blockhash
//!
//! The fee payer is always the sender. The draft is persisted as the
//! unsigned artifact before any signature exists.
//!
//! ## Modules
//! - **errors**: error taxonomy with category labels
//! - **context**: the validity reference both modes build against
//! - **instructions**: instruction planning and ordering validation
//! - **output**: the drafted transaction and its signer set
//! - **builder**: ledger reads and assembly

pub mod errors;
pub use errors::TransactionBuilderError;

mod builder;
mod context;
mod instructions;
mod output;

pub use builder::TxBuilder;
pub use context::ValidityReference;
pub use instructions::{
    durable_accounts_of, is_advance_nonce, plan_transfer_instructions, sanity_check_ix_order,
    InstructionPlan,
};
pub use output::{required_signers, TxBuildOutput};
