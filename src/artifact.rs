//! Transaction artifacts
//!
//! An artifact is the text form of a transaction persisted across the
//! offline signing boundary: bincode wire bytes (the ledger's own format),
//! base58 encoded on a single line with a trailing newline.
//!
//! Writes are atomic. A write that requires full signatures checks every
//! slot before the filesystem is touched, so a failed write never replaces
//! an existing artifact.

use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::Transaction};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Ledger packet limit for serialized transactions
pub const PACKET_DATA_SIZE: usize = 1232;

#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Required signature slots are still empty
    #[error("Transaction is missing {} required signature(s): {}", .missing.len(), format_keys(.missing))]
    MissingSignatures { missing: Vec<Pubkey> },

    /// A filled slot does not verify against the message
    #[error("Invalid signature for {signer}")]
    InvalidSignature { signer: Pubkey },

    #[error("Failed to encode transaction: {0}")]
    Encoding(String),

    #[error("Failed to decode artifact: {0}")]
    Decode(String),

    /// Decoded, but not a well-formed transaction
    #[error("Malformed transaction artifact: {0}")]
    Malformed(String),

    #[error("Transaction too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingSignatures { .. } | Self::InvalidSignature { .. } => "signature",
            Self::Encoding(_) | Self::TooLarge { .. } => "encoding",
            Self::Decode(_) | Self::Malformed(_) => "decoding",
            Self::Io { .. } => "io",
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn format_keys(keys: &[Pubkey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Pubkeys whose signature slots are still empty
pub fn missing_signers(tx: &Transaction) -> Vec<Pubkey> {
    let required = tx.message.header.num_required_signatures as usize;
    tx.message
        .account_keys
        .iter()
        .take(required)
        .enumerate()
        .filter(|(idx, _)| {
            tx.signatures
                .get(*idx)
                .map_or(true, |sig| *sig == Signature::default())
        })
        .map(|(_, key)| *key)
        .collect()
}

/// Fail unless every required slot holds a signature valid for the message
pub fn ensure_fully_signed(tx: &Transaction) -> ArtifactResult<()> {
    let missing = missing_signers(tx);
    if !missing.is_empty() {
        return Err(ArtifactError::MissingSignatures { missing });
    }

    let results = tx.verify_with_results();
    if let Some(idx) = results.iter().position(|ok| !ok) {
        return Err(ArtifactError::InvalidSignature {
            signer: tx.message.account_keys[idx],
        });
    }
    Ok(())
}

/// Wire bytes as submitted to the ledger
pub fn to_wire_bytes(tx: &Transaction) -> ArtifactResult<Vec<u8>> {
    let bytes = bincode::serialize(tx).map_err(|e| ArtifactError::Encoding(e.to_string()))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(ArtifactError::TooLarge {
            size: bytes.len(),
            limit: PACKET_DATA_SIZE,
        });
    }
    Ok(bytes)
}

/// Text form of `tx`, without the trailing newline
pub fn encode(tx: &Transaction) -> ArtifactResult<String> {
    let bytes = to_wire_bytes(tx)?;
    Ok(bs58::encode(bytes).into_string())
}

/// Parse the text form produced by [`encode`]
pub fn decode(text: &str) -> ArtifactResult<Transaction> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ArtifactError::Decode("artifact is empty".to_string()));
    }

    let bytes = bs58::decode(trimmed)
        .into_vec()
        .map_err(|e| ArtifactError::Decode(e.to_string()))?;
    if bytes.len() > PACKET_DATA_SIZE {
        return Err(ArtifactError::TooLarge {
            size: bytes.len(),
            limit: PACKET_DATA_SIZE,
        });
    }

    let tx: Transaction =
        bincode::deserialize(&bytes).map_err(|e| ArtifactError::Decode(e.to_string()))?;

    let required = tx.message.header.num_required_signatures as usize;
    if tx.signatures.len() != required {
        return Err(ArtifactError::Malformed(format!(
            "{} signature slots for {} required signers",
            tx.signatures.len(),
            required
        )));
    }
    if tx.message.account_keys.len() < required {
        return Err(ArtifactError::Malformed(format!(
            "{} account keys for {} required signers",
            tx.message.account_keys.len(),
            required
        )));
    }
    if tx.message.instructions.is_empty() {
        return Err(ArtifactError::Malformed("no instructions".to_string()));
    }

    Ok(tx)
}

/// Serialize `tx` to `path`, returning the encoded text
///
/// With `require_all_signatures`, every required slot must carry a valid
/// signature; the check runs before any file is created.
pub fn write(
    tx: &Transaction,
    path: impl AsRef<Path>,
    require_all_signatures: bool,
) -> ArtifactResult<String> {
    let path = path.as_ref();

    if require_all_signatures {
        ensure_fully_signed(tx)?;
    }

    let encoded = encode(tx)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io(path, e))?;
    tmp.write_all(encoded.as_bytes())
        .and_then(|_| tmp.write_all(b"\n"))
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ArtifactError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| ArtifactError::io(path, e.error))?;

    debug!(
        path = %path.display(),
        bytes = encoded.len(),
        fully_signed = require_all_signatures,
        "Artifact written"
    );

    Ok(encoded)
}

/// Load the transaction stored at `path`
pub fn read(path: impl AsRef<Path>) -> ArtifactResult<Transaction> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ArtifactError::io(path, e))?;
    decode(&text)
}
