//! Metrics collection and export module
//!
//! One registry per run; nothing is global. The text exposition can be
//! written to a file at exit for a node-exporter textfile collector.

use crate::errors::Stage;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::path::Path;
use std::time::Instant;

/// Per-stage counters and latency
pub struct Metrics {
    registry: Registry,

    pub stage_success: IntCounterVec,
    pub stage_failure: IntCounterVec,
    pub stage_latency: HistogramVec,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let stage_success = IntCounterVec::new(
            Opts::new("stage_success_total", "Pipeline stages completed"),
            &["stage"],
        )?;

        let stage_failure = IntCounterVec::new(
            Opts::new("stage_failure_total", "Pipeline stages that failed"),
            &["stage", "category"],
        )?;

        // Provisioning and broadcast wait for confirmation; signing includes the delay
        let stage_latency = HistogramVec::new(
            HistogramOpts::new("stage_latency_seconds", "Pipeline stage latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 180.0]),
            &["stage"],
        )?;

        // Register all metrics
        registry.register(Box::new(stage_success.clone()))?;
        registry.register(Box::new(stage_failure.clone()))?;
        registry.register(Box::new(stage_latency.clone()))?;

        Ok(Self {
            registry,
            stage_success,
            stage_failure,
            stage_latency,
        })
    }

    pub fn record_success(&self, stage: Stage, timer: &Timer) {
        self.stage_success.with_label_values(&[stage.as_str()]).inc();
        timer.observe_duration(self, stage);
    }

    pub fn record_failure(&self, stage: Stage, category: &str, timer: &Timer) {
        self.stage_failure
            .with_label_values(&[stage.as_str(), category])
            .inc();
        timer.observe_duration(self, stage);
    }

    pub fn success_count(&self, stage: Stage) -> u64 {
        self.stage_success.with_label_values(&[stage.as_str()]).get()
    }

    pub fn failure_count(&self, stage: Stage, category: &str) -> u64 {
        self.stage_failure
            .with_label_values(&[stage.as_str(), category])
            .get()
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.render()?)?;
        Ok(())
    }
}

/// Timer helper for measuring stage duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, metrics: &Metrics, stage: Stage) {
        metrics
            .stage_latency
            .with_label_values(&[stage.as_str()])
            .observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
