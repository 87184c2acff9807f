//! Durable nonce account read-back
//!
//! Decodes the on-ledger nonce record into [`NonceAccountState`]. State is
//! fetched on demand for a single build step and never cached.

use super::nonce_errors::{NonceError, NonceResult};
use crate::rpc_manager::LedgerRpc;
use solana_sdk::{
    account::Account,
    hash::Hash,
    nonce::state::{State, Versions},
    pubkey::Pubkey,
    system_program,
};
use tracing::debug;

/// Byte size of the nonce account record
pub const NONCE_ACCOUNT_SIZE: usize = State::size();

/// Authorized signer and current nonce value of a durable nonce account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceAccountState {
    pub authority: Pubkey,
    /// One-time-use substitute for a recent blockhash
    pub nonce_value: Hash,
    pub lamports_per_signature: u64,
}

impl NonceAccountState {
    /// Decode an account fetched from the ledger
    pub fn from_account(pubkey: &Pubkey, account: &Account) -> NonceResult<Self> {
        if account.owner != system_program::id() {
            return Err(NonceError::InvalidNonceAccount(format!(
                "{} is owned by {}, not the system program",
                pubkey, account.owner
            )));
        }
        if account.data.len() != NONCE_ACCOUNT_SIZE {
            return Err(NonceError::InvalidNonceAccount(format!(
                "{} has {} bytes of data, expected {}",
                pubkey,
                account.data.len(),
                NONCE_ACCOUNT_SIZE
            )));
        }

        let versions: Versions = bincode::deserialize(&account.data)
            .map_err(|e| NonceError::InvalidNonceAccount(format!("{}: {}", pubkey, e)))?;

        match versions.state() {
            // Legacy-domain nonces cannot back durable transactions
            State::Initialized(_) if matches!(versions, Versions::Legacy(_)) => {
                Err(NonceError::InvalidNonceAccount(format!(
                    "{} holds a legacy nonce that must be upgraded first",
                    pubkey
                )))
            }
            State::Initialized(data) => Ok(Self {
                authority: data.authority,
                nonce_value: data.blockhash(),
                lamports_per_signature: data.get_lamports_per_signature(),
            }),
            State::Uninitialized => Err(NonceError::InvalidNonceAccount(format!(
                "{} is uninitialized",
                pubkey
            ))),
        }
    }
}

/// Read the current nonce state of `nonce_account` (one blocking ledger read)
pub async fn fetch_nonce_state(
    rpc: &dyn LedgerRpc,
    nonce_account: &Pubkey,
) -> NonceResult<NonceAccountState> {
    let account = rpc
        .get_account(nonce_account)
        .await
        .map_err(|e| NonceError::rpc("get_nonce_account", e))?
        .ok_or(NonceError::AccountNotFound(*nonce_account))?;

    let state = NonceAccountState::from_account(nonce_account, &account)?;
    debug!(
        nonce_account = %nonce_account,
        authority = %state.authority,
        nonce_value = %state.nonce_value,
        "Fetched nonce account state"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::nonce::state::{Data, DurableNonce};

    fn nonce_account(state: State) -> Account {
        Account::new_data(1_500_000, &Versions::new(state), &system_program::id())
            .expect("serializable nonce state")
    }

    #[test]
    fn test_decode_initialized() {
        let pubkey = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let durable = DurableNonce::from_blockhash(&Hash::new_unique());
        let account = nonce_account(State::Initialized(Data::new(authority, durable, 5000)));

        let state = NonceAccountState::from_account(&pubkey, &account).unwrap();
        assert_eq!(state.authority, authority);
        assert_eq!(state.nonce_value, *durable.as_hash());
        assert_eq!(state.lamports_per_signature, 5000);
    }

    #[test]
    fn test_decode_uninitialized() {
        let pubkey = Pubkey::new_unique();
        let mut account = nonce_account(State::Uninitialized);
        // Uninitialized records serialize short; pad to the allocated size
        account.data.resize(NONCE_ACCOUNT_SIZE, 0);

        let err = NonceAccountState::from_account(&pubkey, &account).unwrap_err();
        assert!(matches!(err, NonceError::InvalidNonceAccount(msg) if msg.contains("uninitialized")));
    }

    #[test]
    fn test_wrong_owner_rejected() {
        let pubkey = Pubkey::new_unique();
        let mut account = nonce_account(State::Initialized(Data::default()));
        account.owner = Pubkey::new_unique();

        assert!(NonceAccountState::from_account(&pubkey, &account).is_err());
    }

    #[test]
    fn test_wrong_size_rejected() {
        let pubkey = Pubkey::new_unique();
        let account = Account::new(1_000_000, 0, &system_program::id());

        assert!(NonceAccountState::from_account(&pubkey, &account).is_err());
    }
}
