//! Run orchestration
//!
//! A run moves strictly forward through
//! `Init -> NonceProvisioned -> Drafted -> Signed -> Broadcast`
//! (blockhash runs skip provisioning). Each stage checks the state it is
//! entered from; a failed stage leaves the state where it was, and a rerun
//! starts over from `Init` with a fresh nonce account.
//!
//! Cancellation is observed by every stage that waits: provisioning, the
//! signing delay, and broadcast. A transaction already handed to the ledger
//! may still land after a cancelled provisioning or broadcast.

use crate::broadcaster::{BroadcastReceipt, Broadcaster};
use crate::config::Config;
use crate::errors::{PipelineError, Stage};
use crate::metrics::{Metrics, Timer};
use crate::nonce_manager::{NonceProvisioner, ProvisionedNonce};
use crate::offline_signer::{CancellationSignal, OfflineSigner, SignedArtifact, SigningDelay};
use crate::rpc_manager::LedgerRpc;
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{TxBuildOutput, TxBuilder};
use crate::wallet::WalletManager;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// Validity mechanism chosen once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Nonce,
    Blockhash,
}

impl RunMode {
    pub fn from_nonce_flag(nonce: bool) -> Self {
        if nonce {
            RunMode::Nonce
        } else {
            RunMode::Blockhash
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Nonce => "nonce",
            RunMode::Blockhash => "blockhash",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    NonceProvisioned,
    Drafted,
    Signed,
    Broadcast,
}

/// Everything a run shares across stages
pub struct RunContext {
    /// Single ledger handle reused by every stage
    pub rpc: Arc<dyn LedgerRpc>,
    pub sender: WalletManager,
    pub nonce_authority: WalletManager,
    /// Generated fresh for each run
    pub nonce_account: Keypair,
    pub config: Config,
    pub logger: StructuredLogger,
    pub metrics: Arc<Metrics>,
    pub cancel: CancellationSignal,
}

impl RunContext {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        sender: WalletManager,
        nonce_authority: WalletManager,
        config: Config,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            rpc,
            sender,
            nonce_authority,
            nonce_account: Keypair::new(),
            config,
            logger: StructuredLogger::for_new_run(),
            metrics: Arc::new(Metrics::new()?),
            cancel: CancellationSignal::new(),
        })
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub nonce_account: Option<Pubkey>,
    pub signature: Signature,
    pub unsigned_path: PathBuf,
    pub signed_path: PathBuf,
}

pub struct Pipeline {
    ctx: RunContext,
    mode: RunMode,
    delay: SigningDelay,
    state: RunState,
    provisioned: Option<ProvisionedNonce>,
    draft: Option<TxBuildOutput>,
    signed: Option<SignedArtifact>,
}

impl Pipeline {
    pub fn new(ctx: RunContext, mode: RunMode, delay: SigningDelay) -> Self {
        Self {
            ctx,
            mode,
            delay,
            state: RunState::Init,
            provisioned: None,
            draft: None,
            signed: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn expect_state(&self, stage: Stage, expected: RunState) -> Result<(), PipelineError> {
        if self.state != expected {
            return Err(PipelineError::InvalidState {
                stage,
                from: self.state,
            });
        }
        Ok(())
    }

    /// Drive a ledger-bound stage future, abandoning it once the run is cancelled
    async fn until_cancelled<T>(
        &self,
        stage: Stage,
        work: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
            result = work => result,
        }
    }

    /// Log and count the outcome of `stage`
    fn record<T>(
        &self,
        stage: Stage,
        timer: &Timer,
        result: Result<T, PipelineError>,
        detail: impl FnOnce(&T) -> String,
    ) -> Result<T, PipelineError> {
        match &result {
            Ok(value) => {
                self.ctx.metrics.record_success(stage, timer);
                self.ctx
                    .logger
                    .log_stage_completed(stage, &detail(value), timer.elapsed_ms());
            }
            Err(err) => {
                self.ctx.metrics.record_failure(stage, err.category(), timer);
                self.ctx.logger.log_stage_failed(
                    stage,
                    err.category(),
                    &err.to_string(),
                    timer.elapsed_ms(),
                );
            }
        }
        result
    }

    /// Create and initialize the run's nonce account
    pub async fn provision_nonce(&mut self) -> Result<ProvisionedNonce, PipelineError> {
        let stage = Stage::Provision;
        if self.mode != RunMode::Nonce {
            return Err(PipelineError::InvalidState {
                stage,
                from: self.state,
            });
        }
        self.expect_state(stage, RunState::Init)?;

        self.ctx.logger.log_stage_started(stage);
        let timer = Timer::new();
        let provisioner = NonceProvisioner::new(self.ctx.rpc.clone());
        let work = async {
            provisioner
                .provision(self.ctx.nonce_authority.keypair(), &self.ctx.nonce_account)
                .await
                .map_err(PipelineError::from)
        };
        let result = self.until_cancelled(stage, work).await;
        let provisioned = self.record(stage, &timer, result, |p| {
            format!("nonce account {} at {}", p.nonce_account, p.state.nonce_value)
        })?;

        self.provisioned = Some(provisioned);
        self.state = RunState::NonceProvisioned;
        Ok(provisioned)
    }

    /// Draft the unsigned transfer and persist the unsigned artifact
    pub async fn draft(&mut self) -> Result<&TxBuildOutput, PipelineError> {
        let stage = Stage::Draft;
        let (entry, nonce) = match self.mode {
            RunMode::Nonce => (
                RunState::NonceProvisioned,
                self.provisioned
                    .map(|p| (p.nonce_account, self.ctx.nonce_authority.pubkey())),
            ),
            RunMode::Blockhash => (RunState::Init, None),
        };
        self.expect_state(stage, entry)?;

        self.ctx.logger.log_stage_started(stage);
        let timer = Timer::new();
        let builder = TxBuilder::new(self.ctx.rpc.clone());
        let result = async {
            let validity = builder.prepare_validity(nonce).await?;
            let output = builder.build_unsigned(
                validity,
                &self.ctx.sender.pubkey(),
                self.ctx.config.transfer.lamports,
                &self.ctx.config.artifacts.unsigned_path,
            )?;
            Ok::<_, PipelineError>(output)
        }
        .await;
        let output = self.record(stage, &timer, result, |o| {
            format!("{} -> {}", o.validity, self.ctx.config.artifacts.unsigned_path.display())
        })?;

        self.state = RunState::Drafted;
        Ok(self.draft.insert(output))
    }

    /// Wait out the signing delay, sign, and persist the signed artifact
    pub async fn sign(&mut self) -> Result<&SignedArtifact, PipelineError> {
        let stage = Stage::Sign;
        self.expect_state(stage, RunState::Drafted)?;

        self.ctx.logger.log_stage_started(stage);
        let timer = Timer::new();
        let signers: Vec<&Keypair> = match self.mode {
            RunMode::Nonce => vec![self.ctx.nonce_authority.keypair(), self.ctx.sender.keypair()],
            RunMode::Blockhash => vec![self.ctx.sender.keypair()],
        };
        let result = OfflineSigner::new(self.ctx.cancel.clone())
            .sign(
                self.mode,
                &self.ctx.config.artifacts.unsigned_path,
                &self.ctx.config.artifacts.signed_path,
                &signers,
                self.delay,
            )
            .await
            .map_err(PipelineError::from);
        let signed = self.record(stage, &timer, result, |s| {
            format!(
                "{} signature(s) -> {}",
                s.signers.len(),
                self.ctx.config.artifacts.signed_path.display()
            )
        })?;

        self.state = RunState::Signed;
        Ok(self.signed.insert(signed))
    }

    /// Submit the signed artifact and wait for confirmation
    pub async fn broadcast(&mut self) -> Result<BroadcastReceipt, PipelineError> {
        let stage = Stage::Broadcast;
        self.expect_state(stage, RunState::Signed)?;

        self.ctx.logger.log_stage_started(stage);
        let timer = Timer::new();
        let last_valid_block_height = self
            .draft
            .as_ref()
            .and_then(|d| d.validity.last_valid_block_height());
        let broadcaster = Broadcaster::new(self.ctx.rpc.clone());
        let work = async {
            broadcaster
                .broadcast(&self.ctx.config.artifacts.signed_path, last_valid_block_height)
                .await
                .map_err(PipelineError::from)
        };
        let result = self.until_cancelled(stage, work).await;
        let receipt = self.record(stage, &timer, result, |r| format!("signature {}", r.signature))?;

        self.state = RunState::Broadcast;
        Ok(receipt)
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(mut self) -> Result<RunReport, PipelineError> {
        self.ctx
            .logger
            .log_run_started(self.mode.as_str(), &self.ctx.sender.pubkey().to_string());

        let nonce_account = match self.mode {
            RunMode::Nonce => Some(self.provision_nonce().await?.nonce_account),
            RunMode::Blockhash => None,
        };
        self.draft().await?;
        self.sign().await?;
        let receipt = self.broadcast().await?;

        self.ctx
            .logger
            .log_run_completed(&receipt.signature.to_string());

        Ok(RunReport {
            run_id: self.ctx.logger.run_id().to_string(),
            mode: self.mode,
            nonce_account,
            signature: receipt.signature,
            unsigned_path: self.ctx.config.artifacts.unsigned_path.clone(),
            signed_path: self.ctx.config.artifacts.signed_path.clone(),
        })
    }
}
