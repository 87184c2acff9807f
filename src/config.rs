//! Configuration module for the offline signing pipeline
//!
//! Settings come from an optional TOML file, then environment overrides
//! (a `.env` file is honoured). Secrets are never read from the file; see
//! [`crate::wallet`].

use crate::rpc_manager::RpcEndpointConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CLUSTER_ENV: &str = "SOLANA_CLUSTER";
pub const RPC_URL_ENV: &str = "SOLANA_RPC_URL";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ledger endpoint configuration
    #[serde(default)]
    pub rpc: RpcEndpointConfig,

    /// Artifact locations
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub signing: SigningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_unsigned_path")]
    pub unsigned_path: PathBuf,

    #[serde(default = "default_signed_path")]
    pub signed_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Amount moved to the throwaway destination
    #[serde(default = "default_transfer_lamports")]
    pub lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Air-gap delay used when the command line does not give one
    #[serde(default = "default_delay_ms")]
    pub delay_ms: i64,
}

// Default value functions
fn default_unsigned_path() -> PathBuf { PathBuf::from("unsigned.txt") }
fn default_signed_path() -> PathBuf { PathBuf::from("signed.txt") }
fn default_transfer_lamports() -> u64 { 10_000_000 }
fn default_delay_ms() -> i64 { 120_000 }

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            unsigned_path: default_unsigned_path(),
            signed_path: default_signed_path(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            lamports: default_transfer_lamports(),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// File (or defaults when `path` is absent or missing), then environment,
    /// then validation
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `SOLANA_CLUSTER` / `SOLANA_RPC_URL` through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cluster) = lookup(CLUSTER_ENV).filter(|v| !v.trim().is_empty()) {
            self.rpc.cluster = cluster.trim().to_string();
        }
        if let Some(url) = lookup(RPC_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.rpc.url = Some(url.trim().to_string());
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.rpc.validate()?;

        if self.transfer.lamports == 0 {
            anyhow::bail!("transfer.lamports must be greater than 0");
        }
        if self.artifacts.unsigned_path == self.artifacts.signed_path {
            anyhow::bail!(
                "artifacts.unsigned_path and artifacts.signed_path must differ (both {})",
                self.artifacts.unsigned_path.display()
            );
        }
        Ok(())
    }
}
