use solana_client::client_error::ClientError;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// Ledger RPC error types, classified so callers can tell an expired
/// validity reference apart from a transport failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// The blockhash or durable nonce referenced by the transaction is not
    /// (or no longer) accepted by the ledger
    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    /// Duplicate submission
    #[error("Transaction already processed (endpoint: {endpoint})")]
    AlreadyProcessed { endpoint: String },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound { account: String, endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// Missing or invalid signatures
    #[error("Signature verification failed: {message} (endpoint: {endpoint})")]
    SignatureFailure { endpoint: String, message: String },

    /// Transaction was accepted but failed on execution
    #[error("Transaction failed: {message} (endpoint: {endpoint})")]
    TransactionFailed { endpoint: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcManagerError {
    /// Validity reference expired: blockhash too old, or nonce stale/consumed
    pub fn is_validity_expired(&self) -> bool {
        matches!(
            self,
            RpcManagerError::BlockhashNotFound { .. } | RpcManagerError::TransactionExpired { .. }
        )
    }

    /// Rejected by the ledger for a reason tied to the transaction itself,
    /// as opposed to the network or the endpoint
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RpcManagerError::AlreadyProcessed { .. }
                | RpcManagerError::InsufficientFunds { .. }
                | RpcManagerError::SignatureFailure { .. }
                | RpcManagerError::TransactionFailed { .. }
                | RpcManagerError::AccountNotFound { .. }
        )
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. } => Some(endpoint),
            RpcManagerError::Timeout { endpoint, .. } => Some(endpoint),
            RpcManagerError::RpcResponse { endpoint, .. } => Some(endpoint),
            RpcManagerError::BlockhashNotFound { endpoint } => Some(endpoint),
            RpcManagerError::TransactionExpired { endpoint } => Some(endpoint),
            RpcManagerError::AlreadyProcessed { endpoint } => Some(endpoint),
            RpcManagerError::AccountNotFound { endpoint, .. } => Some(endpoint),
            RpcManagerError::InsufficientFunds { endpoint } => Some(endpoint),
            RpcManagerError::SignatureFailure { endpoint, .. } => Some(endpoint),
            RpcManagerError::TransactionFailed { endpoint, .. } => Some(endpoint),
            RpcManagerError::Configuration(_) | RpcManagerError::Internal(_) => None,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            RpcManagerError::Transport { .. } => "transport",
            RpcManagerError::Timeout { .. } => "timeout",
            RpcManagerError::RpcResponse { .. } => "rpc",
            RpcManagerError::BlockhashNotFound { .. } => "validity_expired",
            RpcManagerError::TransactionExpired { .. } => "validity_expired",
            RpcManagerError::AlreadyProcessed { .. } => "duplicate",
            RpcManagerError::AccountNotFound { .. } => "account",
            RpcManagerError::InsufficientFunds { .. } => "funds",
            RpcManagerError::SignatureFailure { .. } => "signature",
            RpcManagerError::TransactionFailed { .. } => "execution",
            RpcManagerError::Configuration(_) => "config",
            RpcManagerError::Internal(_) => "internal",
        }
    }

    /// Classify a ledger-level transaction error
    pub fn from_transaction_error(err: &TransactionError, endpoint: &str) -> Self {
        let endpoint = endpoint.to_string();
        match err {
            TransactionError::BlockhashNotFound => RpcManagerError::BlockhashNotFound { endpoint },
            TransactionError::AlreadyProcessed => RpcManagerError::AlreadyProcessed { endpoint },
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => {
                RpcManagerError::InsufficientFunds { endpoint }
            }
            TransactionError::SignatureFailure | TransactionError::MissingSignatureForFee => {
                RpcManagerError::SignatureFailure {
                    endpoint,
                    message: err.to_string(),
                }
            }
            TransactionError::AccountNotFound => RpcManagerError::AccountNotFound {
                account: "fee payer".to_string(),
                endpoint,
            },
            other => {
                let message = other.to_string();
                // System program transfer failures surface as instruction errors
                if message.to_lowercase().contains("insufficient") {
                    RpcManagerError::InsufficientFunds { endpoint }
                } else {
                    RpcManagerError::TransactionFailed { endpoint, message }
                }
            }
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        if let Some(tx_err) = err.get_transaction_error() {
            return Self::from_transaction_error(&tx_err, endpoint);
        }

        let err_str = err.to_string().to_lowercase();

        // Classify based on error message
        if err_str.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("transaction expired")
            || err_str.contains("block height exceeded")
        {
            RpcManagerError::TransactionExpired {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("already been processed") {
            RpcManagerError::AlreadyProcessed {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("account not found") {
            RpcManagerError::AccountNotFound {
                account: "unknown".to_string(),
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            RpcManagerError::InsufficientFunds {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("signature verification")
            || err_str.contains("missing signature")
        {
            RpcManagerError::SignatureFailure {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcManagerError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 0,
            }
        } else if err_str.contains("error sending request")
            || err_str.contains("connection refused")
            || err_str.contains("dns error")
        {
            RpcManagerError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            RpcManagerError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
                code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_client::client_error::ClientErrorKind;
    use solana_client::rpc_request::{RpcError, RpcResponseErrorData};

    fn rpc_client_error(message: &str) -> ClientError {
        ClientError::from(ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code: -32002,
            message: message.to_string(),
            data: RpcResponseErrorData::Empty,
        }))
    }

    #[test]
    fn test_validity_expired_family() {
        assert!(RpcManagerError::BlockhashNotFound {
            endpoint: "test".to_string(),
        }
        .is_validity_expired());
        assert!(RpcManagerError::TransactionExpired {
            endpoint: "test".to_string(),
        }
        .is_validity_expired());

        assert!(!RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_validity_expired());
        assert!(!RpcManagerError::AlreadyProcessed {
            endpoint: "test".to_string(),
        }
        .is_validity_expired());
    }

    #[test]
    fn test_transaction_error_classification() {
        let err = RpcManagerError::from_transaction_error(&TransactionError::BlockhashNotFound, "e");
        assert!(err.is_validity_expired());

        let err = RpcManagerError::from_transaction_error(&TransactionError::AlreadyProcessed, "e");
        assert!(matches!(err, RpcManagerError::AlreadyProcessed { .. }));
        assert!(err.is_rejection());

        let err =
            RpcManagerError::from_transaction_error(&TransactionError::InsufficientFundsForFee, "e");
        assert!(matches!(err, RpcManagerError::InsufficientFunds { .. }));

        let err = RpcManagerError::from_transaction_error(&TransactionError::SignatureFailure, "e");
        assert_eq!(err.category(), "signature");
    }

    #[test]
    fn test_client_error_string_classification() {
        let err = RpcManagerError::from_client_error(
            rpc_client_error("Transaction simulation failed: Blockhash not found"),
            "https://test.com",
        );
        assert!(err.is_validity_expired());
        assert_eq!(err.endpoint(), Some("https://test.com"));

        let err = RpcManagerError::from_client_error(
            rpc_client_error("This transaction has already been processed"),
            "https://test.com",
        );
        assert!(matches!(err, RpcManagerError::AlreadyProcessed { .. }));

        let err = RpcManagerError::from_client_error(
            rpc_client_error("something unexpected"),
            "https://test.com",
        );
        assert!(matches!(err, RpcManagerError::RpcResponse { .. }));
    }

    #[test]
    fn test_error_endpoint() {
        let err = RpcManagerError::Timeout {
            endpoint: "https://test.com".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.endpoint(), Some("https://test.com"));

        let internal = RpcManagerError::Internal("test".to_string());
        assert_eq!(internal.endpoint(), None);
    }
}
