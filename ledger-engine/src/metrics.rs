//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_events_applied_total` - Events committed successfully
//! - `ledger_events_rejected_total` - Events rejected before commit
//! - `ledger_commit_conflicts_total` - Batches that lost a version race
//! - `ledger_apply_duration_seconds` - Histogram of apply latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Events committed successfully
    pub events_applied: IntCounter,

    /// Events rejected (validation, not-found, invariant, store failures)
    pub events_rejected: IntCounter,

    /// Commit-time version conflicts (subset of rejections)
    pub commit_conflicts: IntCounter,

    /// Apply latency histogram
    pub apply_duration: Histogram,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_applied = IntCounter::with_opts(Opts::new(
            "ledger_events_applied_total",
            "Events committed successfully",
        ))?;
        registry.register(Box::new(events_applied.clone()))?;

        let events_rejected = IntCounter::with_opts(Opts::new(
            "ledger_events_rejected_total",
            "Events rejected before commit",
        ))?;
        registry.register(Box::new(events_rejected.clone()))?;

        let commit_conflicts = IntCounter::with_opts(Opts::new(
            "ledger_commit_conflicts_total",
            "Batches that lost a version race",
        ))?;
        registry.register(Box::new(commit_conflicts.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_apply_duration_seconds",
                "Histogram of apply latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        Ok(Self {
            events_applied,
            events_rejected,
            commit_conflicts,
            apply_duration,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("events_applied", &self.events_applied.get())
            .field("events_rejected", &self.events_rejected.get())
            .field("commit_conflicts", &self.commit_conflicts.get())
            .finish_non_exhaustive()
    }
}
