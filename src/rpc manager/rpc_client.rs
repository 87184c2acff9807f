//! Live ledger access over JSON-RPC
//!
//! Wraps the nonblocking `RpcClient` behind [`LedgerRpc`]. One instance is
//! built per run and shared by every stage.

use super::rpc_config::RpcEndpointConfig;
use super::rpc_errors::RpcManagerError;
use super::{ConfirmationOutcome, ConfirmationRequest, LedgerRpc, RpcResult};
use async_trait::async_trait;
use base64::Engine;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::RpcRequest;
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::TransactionError,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// [`LedgerRpc`] backed by a JSON-RPC endpoint
pub struct RpcLedger {
    client: Arc<RpcClient>,
    endpoint: String,
    commitment: CommitmentConfig,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl RpcLedger {
    pub fn new(config: &RpcEndpointConfig) -> RpcResult<Self> {
        config.validate()?;
        let endpoint = config.resolve_url()?;
        let commitment = config.commitment_config()?;
        let client = RpcClient::new_with_timeout_and_commitment(
            endpoint.clone(),
            config.timeout(),
            commitment,
        );

        Ok(Self {
            client: Arc::new(client),
            endpoint,
            commitment,
            confirm_timeout: config.confirm_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.endpoint)
    }
}

/// One signature status reading
#[derive(Debug, Clone, PartialEq, Eq)]
struct PolledStatus {
    err: Option<TransactionError>,
    /// Reached the configured commitment level
    committed: bool,
}

/// The two reads a confirmation wait polls
#[async_trait]
trait ConfirmationSource: Sync {
    async fn signature_status(&self, signature: &Signature) -> RpcResult<Option<PolledStatus>>;

    async fn block_height(&self) -> RpcResult<u64>;
}

#[async_trait]
impl ConfirmationSource for RpcLedger {
    async fn signature_status(&self, signature: &Signature) -> RpcResult<Option<PolledStatus>> {
        let statuses = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.map_err(e))?;

        Ok(statuses
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|status| PolledStatus {
                committed: status.satisfies_commitment(self.commitment),
                err: status.err,
            }))
    }

    async fn block_height(&self) -> RpcResult<u64> {
        self.client
            .get_block_height()
            .await
            .map_err(|e| self.map_err(e))
    }
}

/// Poll `source` until the transaction lands, fails, outlives its last
/// valid block height, or `timeout` passes
async fn poll_confirmation<S: ConfirmationSource>(
    source: &S,
    request: &ConfirmationRequest,
    poll_interval: Duration,
    timeout: Duration,
) -> RpcResult<ConfirmationOutcome> {
    let started_at = Instant::now();
    let mut interval = tokio::time::interval(poll_interval);
    let mut attempts = 0u32;

    loop {
        interval.tick().await;
        attempts += 1;

        if let Some(status) = source.signature_status(&request.signature).await? {
            if let Some(err) = status.err {
                return Ok(ConfirmationOutcome::Failed(err.to_string()));
            }
            if status.committed {
                debug!(
                    signature = %request.signature,
                    attempts = attempts,
                    latency_ms = started_at.elapsed().as_millis() as u64,
                    "Transaction confirmed"
                );
                return Ok(ConfirmationOutcome::Confirmed);
            }
        }

        if let Some(last_valid) = request.last_valid_block_height {
            match source.block_height().await {
                Ok(height) if height > last_valid => {
                    return Ok(ConfirmationOutcome::Expired);
                }
                Ok(_) => {}
                Err(err) => {
                    // Keep polling; the status query above is authoritative
                    warn!(error = %err, "Failed to read block height while confirming");
                }
            }
        }

        if started_at.elapsed() >= timeout {
            warn!(
                signature = %request.signature,
                attempts = attempts,
                timeout_sec = timeout.as_secs(),
                "Confirmation timed out"
            );
            return Ok(ConfirmationOutcome::TimedOut);
        }
    }
}

fn parse_signature(raw: &str, endpoint: &str) -> RpcResult<Signature> {
    Signature::from_str(raw).map_err(|e| RpcManagerError::RpcResponse {
        endpoint: endpoint.to_string(),
        message: format!("Malformed signature in response: {}", e),
        code: None,
    })
}

#[async_trait]
impl LedgerRpc for RpcLedger {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn get_account(&self, pubkey: &Pubkey) -> RpcResult<Option<Account>> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, self.commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(response.value)
    }

    async fn get_latest_blockhash(&self) -> RpcResult<(Hash, u64)> {
        self.client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> RpcResult<u64> {
        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn send_raw_transaction(&self, wire: &[u8]) -> RpcResult<Signature> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(wire);
        let params = serde_json::json!([
            encoded,
            {
                "encoding": "base64",
                "skipPreflight": false,
                "preflightCommitment": self.commitment.commitment,
            }
        ]);

        let signature: String = self
            .client
            .send(RpcRequest::SendTransaction, params)
            .await
            .map_err(|e| self.map_err(e))?;

        parse_signature(&signature, &self.endpoint)
    }

    async fn confirm_transaction(
        &self,
        request: ConfirmationRequest,
    ) -> RpcResult<ConfirmationOutcome> {
        poll_confirmation(self, &request, self.poll_interval, self.confirm_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_client::client_error::{ClientError, ClientErrorKind};
    use solana_client::rpc_custom_error::JSON_RPC_SERVER_ERROR_SEND_TRANSACTION_PREFLIGHT_FAILURE;
    use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
    use solana_client::rpc_response::RpcSimulateTransactionResult;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const POLL: Duration = Duration::from_secs(2);
    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Replays canned readings; an exhausted script reads as "not seen yet"
    #[derive(Default)]
    struct ScriptedSource {
        statuses: Mutex<VecDeque<RpcResult<Option<PolledStatus>>>>,
        heights: Mutex<VecDeque<RpcResult<u64>>>,
        status_reads: AtomicU32,
        height_reads: AtomicU32,
    }

    impl ScriptedSource {
        fn with_statuses(statuses: Vec<RpcResult<Option<PolledStatus>>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ..Default::default()
            }
        }

        fn with_heights(heights: Vec<RpcResult<u64>>) -> Self {
            Self {
                heights: Mutex::new(heights.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ConfirmationSource for ScriptedSource {
        async fn signature_status(&self, _: &Signature) -> RpcResult<Option<PolledStatus>> {
            self.status_reads.fetch_add(1, Ordering::SeqCst);
            self.statuses.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        async fn block_height(&self) -> RpcResult<u64> {
            self.height_reads.fetch_add(1, Ordering::SeqCst);
            self.heights.lock().unwrap().pop_front().unwrap_or(Ok(0))
        }
    }

    fn request(last_valid_block_height: Option<u64>) -> ConfirmationRequest {
        ConfirmationRequest {
            signature: Signature::from([7u8; 64]),
            blockhash: Hash::new_unique(),
            last_valid_block_height,
        }
    }

    fn seen(committed: bool) -> RpcResult<Option<PolledStatus>> {
        Ok(Some(PolledStatus {
            err: None,
            committed,
        }))
    }

    fn rpc_error(code: i64, message: &str, data: RpcResponseErrorData) -> ClientError {
        ClientError::from(ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message: message.to_string(),
            data,
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_once_commitment_reached() {
        let source = ScriptedSource::with_statuses(vec![Ok(None), seen(false), seen(true)]);

        let start = Instant::now();
        let outcome = poll_confirmation(&source, &request(Some(500)), POLL, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(source.status_reads.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= 2 * POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_failure_reported() {
        let source = ScriptedSource::with_statuses(vec![Ok(Some(PolledStatus {
            err: Some(TransactionError::InsufficientFundsForFee),
            committed: true,
        }))]);

        let outcome = poll_confirmation(&source, &request(None), POLL, TIMEOUT)
            .await
            .unwrap();

        match outcome {
            ConfirmationOutcome::Failed(message) => {
                assert_eq!(message, TransactionError::InsufficientFundsForFee.to_string())
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_past_last_valid_height() {
        let source = ScriptedSource::with_heights(vec![Ok(149), Ok(150), Ok(151)]);

        let outcome = poll_confirmation(&source, &request(Some(150)), POLL, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::Expired);
        assert_eq!(source.height_reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_height_keeps_polling() {
        let source = ScriptedSource::with_heights(vec![
            Err(RpcManagerError::Transport {
                endpoint: "scripted".to_string(),
                message: "connection reset".to_string(),
            }),
            Ok(900),
        ]);

        let outcome = poll_confirmation(&source, &request(Some(150)), POLL, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::Expired);
        assert_eq!(source.status_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonce_wait_times_out_without_height_checks() {
        let source = ScriptedSource::default();

        let start = Instant::now();
        let outcome = poll_confirmation(&source, &request(None), POLL, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::TimedOut);
        assert!(start.elapsed() >= TIMEOUT);
        assert!(start.elapsed() < TIMEOUT + POLL);
        assert_eq!(source.height_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_read_failure_propagates() {
        let source = ScriptedSource::with_statuses(vec![
            Ok(None),
            Err(RpcManagerError::Timeout {
                endpoint: "scripted".to_string(),
                timeout_ms: 30_000,
            }),
        ]);

        let err = poll_confirmation(&source, &request(None), POLL, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "timeout");
    }

    #[test]
    fn test_stale_nonce_preflight_payload_is_validity_expired() {
        // Error object as returned by sendTransaction when the durable nonce
        // value was already consumed
        let payload = serde_json::json!({
            "code": -32002,
            "message": "Transaction simulation failed: Blockhash not found",
            "data": {
                "err": "BlockhashNotFound",
                "logs": [],
                "accounts": null,
                "unitsConsumed": 0,
                "returnData": null
            }
        });
        let code = payload["code"].as_i64().unwrap();
        assert_eq!(code, JSON_RPC_SERVER_ERROR_SEND_TRANSACTION_PREFLIGHT_FAILURE);
        let simulation: RpcSimulateTransactionResult =
            serde_json::from_value(payload["data"].clone()).unwrap();
        assert_eq!(simulation.err, Some(TransactionError::BlockhashNotFound));

        let err = RpcManagerError::from_client_error(
            rpc_error(
                code,
                payload["message"].as_str().unwrap(),
                RpcResponseErrorData::SendTransactionPreflightFailure(simulation),
            ),
            "https://api.devnet.solana.com",
        );
        assert!(matches!(err, RpcManagerError::BlockhashNotFound { .. }));
        assert!(err.is_validity_expired());
        assert_eq!(err.endpoint(), Some("https://api.devnet.solana.com"));
    }

    #[test]
    fn test_expired_height_message_is_validity_expired() {
        let err = RpcManagerError::from_client_error(
            rpc_error(
                -32002,
                "Transaction simulation failed: block height exceeded",
                RpcResponseErrorData::Empty,
            ),
            "https://api.devnet.solana.com",
        );
        assert!(matches!(err, RpcManagerError::TransactionExpired { .. }));
    }

    #[test]
    fn test_send_transaction_result_parsing() {
        let signature = Signature::from([7u8; 64]);
        assert_eq!(
            parse_signature(&signature.to_string(), "e").unwrap(),
            signature
        );

        let err = parse_signature("not-a-signature", "e").unwrap_err();
        assert!(matches!(err, RpcManagerError::RpcResponse { code: None, .. }));
        assert_eq!(err.endpoint(), Some("e"));
    }
}
