//! Structured logging for pipeline runs
//!
//! Every stage event carries the run's correlation id so the lines of one
//! run can be pulled out of a shared log.

use crate::errors::Stage;
use uuid::Uuid;

/// Structured logger for pipeline events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: String) -> Self {
        Self { run_id }
    }

    /// Logger with a fresh random run id
    pub fn for_new_run() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_run_started(&self, mode: &str, sender: &str) {
        tracing::info!(
            run_id = %self.run_id,
            mode = %mode,
            sender = %sender,
            "Run started"
        );
    }

    pub fn log_stage_started(&self, stage: Stage) {
        tracing::debug!(
            run_id = %self.run_id,
            stage = %stage,
            "Stage started"
        );
    }

    /// The per-stage progress line
    pub fn log_stage_completed(&self, stage: Stage, detail: &str, latency_ms: u64) {
        tracing::info!(
            run_id = %self.run_id,
            stage = %stage,
            detail = %detail,
            latency_ms = %latency_ms,
            "Stage completed"
        );
    }

    pub fn log_stage_failed(&self, stage: Stage, category: &str, error: &str, latency_ms: u64) {
        tracing::error!(
            run_id = %self.run_id,
            stage = %stage,
            category = %category,
            error = %error,
            latency_ms = %latency_ms,
            "Stage failed"
        );
    }

    pub fn log_run_completed(&self, signature: &str) {
        tracing::info!(
            run_id = %self.run_id,
            signature = %signature,
            "Run completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        let a = StructuredLogger::for_new_run();
        let b = StructuredLogger::for_new_run();
        assert_ne!(a.run_id(), b.run_id());
        assert!(Uuid::parse_str(a.run_id()).is_ok());
    }
}
