use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::str::FromStr;
use std::time::Duration;

use super::rpc_errors::RpcManagerError;

/// Ledger cluster selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    MainnetBeta,
    Devnet,
    Testnet,
    Localnet,
}

impl Cluster {
    /// Public JSON-RPC endpoint for this cluster
    pub fn default_url(&self) -> &'static str {
        match self {
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::Localnet => "http://127.0.0.1:8899",
        }
    }
}

impl FromStr for Cluster {
    type Err = RpcManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "localnet" | "localhost" => Ok(Cluster::Localnet),
            other => Err(RpcManagerError::Configuration(format!(
                "Unknown cluster '{}': expected mainnet-beta, devnet, testnet or localnet",
                other
            ))),
        }
    }
}

/// Connection settings for the single ledger handle used by a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEndpointConfig {
    /// Cluster selector, used when no explicit URL is given
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Explicit endpoint override
    #[serde(default)]
    pub url: Option<String>,

    /// Commitment level: processed, confirmed or finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound on confirmation polling when no block height bound applies
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Signature status poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_cluster() -> String {
    "devnet".to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_confirm_timeout_secs() -> u64 {
    90
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for RpcEndpointConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            url: None,
            commitment: default_commitment(),
            timeout_ms: default_timeout_ms(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RpcEndpointConfig {
    /// Resolve the endpoint URL: explicit override wins, then the cluster selector
    pub fn resolve_url(&self) -> Result<String, RpcManagerError> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RpcManagerError::Configuration(format!(
                    "RPC URL must start with http:// or https://, got '{}'",
                    url
                )));
            }
            return Ok(url.to_string());
        }
        let cluster: Cluster = self.cluster.parse()?;
        Ok(cluster.default_url().to_string())
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig, RpcManagerError> {
        match self.commitment.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(RpcManagerError::Configuration(format!(
                "Unknown commitment level '{}'",
                other
            ))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), RpcManagerError> {
        self.resolve_url()?;
        self.commitment_config()?;
        if self.timeout_ms == 0 {
            return Err(RpcManagerError::Configuration(
                "RPC timeout must be greater than 0".to_string(),
            ));
        }
        if self.confirm_timeout_secs == 0 {
            return Err(RpcManagerError::Configuration(
                "Confirmation timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
