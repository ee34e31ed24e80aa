//! Pipeline metrics — per-run counters shared across concurrent runs.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters updated by every pipeline run.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    messages_received: AtomicU64,
    command_runs: AtomicU64,
    rollout_misses: AtomicU64,
    gate_denials: AtomicU64,
    client_errors: AtomicU64,
    internal_errors: AtomicU64,
    delegations: AtomicU64,
    hook_failures: AtomicU64,
    runs_by_command: Mutex<BTreeMap<String, u64>>,
    start_time: Option<Instant>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Record a message that resolved to a command.
    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a command reaching its run stage.
    pub fn record_command_run(&self, command: &str) {
        self.command_runs.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_command) = self.runs_by_command.lock() {
            *by_command.entry(command.to_string()).or_default() += 1;
        }
    }

    pub fn record_rollout_miss(&self) {
        self.rollout_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gate_denial(&self) {
        self.gate_denials.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error raised during a run.
    pub fn record_error(&self, client_facing: bool) {
        if client_facing {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else {
            self.internal_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delegation(&self) {
        self.delegations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hook_failure(&self) {
        self.hook_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|s| s.elapsed().as_secs()).unwrap_or(0)
    }

    /// Get a summary snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            command_runs: self.command_runs.load(Ordering::Relaxed),
            rollout_misses: self.rollout_misses.load(Ordering::Relaxed),
            gate_denials: self.gate_denials.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            delegations: self.delegations.load(Ordering::Relaxed),
            hook_failures: self.hook_failures.load(Ordering::Relaxed),
            runs_by_command: self
                .runs_by_command
                .lock()
                .map(|m| m.clone())
                .unwrap_or_default(),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Immutable snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub command_runs: u64,
    pub rollout_misses: u64,
    pub gate_denials: u64,
    pub client_errors: u64,
    pub internal_errors: u64,
    pub delegations: u64,
    pub hook_failures: u64,
    pub runs_by_command: BTreeMap<String, u64>,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    pub fn errors(&self) -> u64 {
        self.client_errors + self.internal_errors
    }
}
