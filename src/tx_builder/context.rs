//! Validity reference for transaction building
//!
//! A transaction is kept recent either by a short-lived blockhash or by the
//! current value of a durable nonce account. Both paths feed the same
//! assembly code through [`ValidityReference`].

use solana_sdk::{hash::Hash, pubkey::Pubkey};
use std::fmt;

/// Which mechanism proves the transaction is recent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityReference {
    /// Durable nonce: valid until the nonce account is advanced
    NonceReferenced {
        nonce_account: Pubkey,
        nonce_authority: Pubkey,
        nonce_value: Hash,
    },

    /// Recent blockhash: valid until the ledger passes `last_valid_block_height`
    BlockhashReferenced {
        blockhash: Hash,
        last_valid_block_height: u64,
    },
}

impl ValidityReference {
    /// Value placed in the message's `recent_blockhash` field
    pub fn recent_blockhash(&self) -> Hash {
        match self {
            Self::NonceReferenced { nonce_value, .. } => *nonce_value,
            Self::BlockhashReferenced { blockhash, .. } => *blockhash,
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::NonceReferenced { .. })
    }

    /// `(nonce_account, nonce_authority)` when durable
    pub fn durable_accounts(&self) -> Option<(Pubkey, Pubkey)> {
        match self {
            Self::NonceReferenced {
                nonce_account,
                nonce_authority,
                ..
            } => Some((*nonce_account, *nonce_authority)),
            Self::BlockhashReferenced { .. } => None,
        }
    }

    /// Height bound for confirmation; durable references have none
    pub fn last_valid_block_height(&self) -> Option<u64> {
        match self {
            Self::NonceReferenced { .. } => None,
            Self::BlockhashReferenced {
                last_valid_block_height,
                ..
            } => Some(*last_valid_block_height),
        }
    }
}

impl fmt::Display for ValidityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonceReferenced {
                nonce_account,
                nonce_value,
                ..
            } => write!(f, "nonce {} (account {})", nonce_value, nonce_account),
            Self::BlockhashReferenced {
                blockhash,
                last_valid_block_height,
            } => write!(
                f,
                "blockhash {} (valid through height {})",
                blockhash, last_valid_block_height
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_reference_accessors() {
        let nonce_account = Pubkey::new_unique();
        let nonce_authority = Pubkey::new_unique();
        let nonce_value = Hash::new_unique();
        let validity = ValidityReference::NonceReferenced {
            nonce_account,
            nonce_authority,
            nonce_value,
        };

        assert!(validity.is_durable());
        assert_eq!(validity.recent_blockhash(), nonce_value);
        assert_eq!(
            validity.durable_accounts(),
            Some((nonce_account, nonce_authority))
        );
        assert_eq!(validity.last_valid_block_height(), None);
    }

    #[test]
    fn test_blockhash_reference_accessors() {
        let blockhash = Hash::new_unique();
        let validity = ValidityReference::BlockhashReferenced {
            blockhash,
            last_valid_block_height: 1_000,
        };

        assert!(!validity.is_durable());
        assert_eq!(validity.recent_blockhash(), blockhash);
        assert_eq!(validity.durable_accounts(), None);
        assert_eq!(validity.last_valid_block_height(), Some(1_000));
        assert!(validity.to_string().contains("1000"));
    }
}
