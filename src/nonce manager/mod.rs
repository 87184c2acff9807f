//! Nonce Manager Module
//!
//! Durable nonce account provisioning and state read-back.

// Submodules
pub mod nonce_errors;
pub mod nonce_provisioner;
pub mod nonce_state;

// Re-exports for convenience
pub use nonce_errors::{NonceError, NonceResult};
pub use nonce_provisioner::{NonceProvisioner, ProvisionedNonce};
pub use nonce_state::{fetch_nonce_state, NonceAccountState, NONCE_ACCOUNT_SIZE};
