//! Wallet management module
//!
//! Sender and nonce-authority keys are supplied through the environment as
//! text-encoded secrets: base58 of the 64-byte keypair, or the JSON byte
//! array written by `solana-keygen`. Decoded bytes are wiped after use.

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use zeroize::Zeroizing;

pub const SENDER_SECRET_ENV: &str = "SENDER_SECRET_KEY";
pub const NONCE_AUTHORITY_SECRET_ENV: &str = "NONCE_AUTHORITY_SECRET_KEY";

/// Decode a text-encoded keypair secret
pub fn decode_secret_key(secret: &str) -> Result<Keypair> {
    let secret = secret.trim();
    if secret.is_empty() {
        anyhow::bail!("Secret key is empty");
    }

    let bytes: Zeroizing<Vec<u8>> = if secret.starts_with('[') {
        Zeroizing::new(
            serde_json::from_str::<Vec<u8>>(secret).context("Failed to parse keypair JSON")?,
        )
    } else {
        Zeroizing::new(
            bs58::decode(secret)
                .into_vec()
                .context("Secret key is neither a JSON byte array nor base58")?,
        )
    };

    if bytes.len() != 64 {
        anyhow::bail!(
            "Invalid keypair length: expected 64 bytes, got {}",
            bytes.len()
        );
    }
    if bytes.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }

    Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")
}

/// Holds one signing identity for the duration of a run
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Load the keypair stored in environment variable `var`
    pub fn from_env(var: &str) -> Result<Self> {
        let secret = Zeroizing::new(
            std::env::var(var).with_context(|| format!("{} is not set", var))?,
        );
        let keypair = decode_secret_key(&secret).with_context(|| format!("{} is invalid", var))?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}

/// The two environment-supplied identities of a run
#[derive(Clone)]
pub struct RunWallets {
    pub sender: WalletManager,
    pub nonce_authority: WalletManager,
}

impl RunWallets {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            sender: WalletManager::from_env(SENDER_SECRET_ENV)?,
            nonce_authority: WalletManager::from_env(NONCE_AUTHORITY_SECRET_ENV)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base58_secret() {
        let keypair = Keypair::new();
        let encoded = keypair.to_base58_string();

        let decoded = decode_secret_key(&encoded).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_decode_json_secret() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();

        let decoded = decode_secret_key(&format!("  {}\n", json)).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_reject_malformed_secrets() {
        assert!(decode_secret_key("").is_err());
        assert!(decode_secret_key("not-base58-0OIl").is_err());
        assert!(decode_secret_key(&bs58::encode([7u8; 32]).into_string()).is_err());
        assert!(decode_secret_key(&serde_json::to_string(&vec![0u8; 64]).unwrap()).is_err());
    }

    #[test]
    fn test_missing_env_var_named_in_error() {
        let err = WalletManager::from_env("OFFLINE_SIGNER_TEST_UNSET_SECRET")
            .err()
            .unwrap();
        assert!(err.to_string().contains("OFFLINE_SIGNER_TEST_UNSET_SECRET"));
    }
}
