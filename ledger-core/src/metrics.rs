//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_claims_committed_total` - Claims written (insert or update)
//! - `ledger_claims_rejected_total` - Claims refused by the overclaim check
//! - `ledger_unclaims_total` - Unclaim calls that removed a claim
//! - `ledger_claim_duration_seconds` - Histogram of claim round-trip latency

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Claims committed
    pub claims_committed: IntCounter,

    /// Claims rejected as overclaims
    pub claims_rejected: IntCounter,

    /// Claims removed by unclaim
    pub unclaims: IntCounter,

    /// Claim latency
    pub claim_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let claims_committed = IntCounter::new(
            "ledger_claims_committed_total",
            "Claims written (insert or update)",
        )?;
        registry.register(Box::new(claims_committed.clone()))?;

        let claims_rejected = IntCounter::new(
            "ledger_claims_rejected_total",
            "Claims refused by the overclaim check",
        )?;
        registry.register(Box::new(claims_rejected.clone()))?;

        let unclaims = IntCounter::new("ledger_unclaims_total", "Unclaim calls that removed a claim")?;
        registry.register(Box::new(unclaims.clone()))?;

        let claim_duration = Histogram::with_opts(
            HistogramOpts::new("ledger_claim_duration_seconds", "Claim round-trip latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(claim_duration.clone()))?;

        Ok(Self {
            claims_committed,
            claims_rejected,
            unclaims,
            claim_duration,
            registry,
        })
    }

    /// Record a committed claim
    pub fn record_claim(&self, duration_seconds: f64) {
        self.claims_committed.inc();
        self.claim_duration.observe(duration_seconds);
    }

    /// Record an overclaim rejection
    pub fn record_rejection(&self) {
        self.claims_rejected.inc();
    }

    /// Record a removed claim
    pub fn record_unclaim(&self) {
        self.unclaims.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
