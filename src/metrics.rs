//! Decision statistics for the risk pipeline.

use crate::types::alert::{FraudAlert, Severity};
use crate::types::decision::{Decision, DecisionStatus, EngineTier};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector for pipeline decisions
pub struct PipelineMetrics {
    /// Total decisions produced
    pub decisions: AtomicU64,
    /// Alerts raised or refreshed
    pub alerts: AtomicU64,
    /// Messages that could not be decoded
    pub rejected: AtomicU64,
    by_tier: RwLock<HashMap<EngineTier, u64>>,
    by_status: RwLock<HashMap<DecisionStatus, u64>>,
    by_severity: RwLock<HashMap<Severity, u64>>,
    /// Decision latencies in microseconds
    latencies: RwLock<Vec<u64>>,
    /// Risk score distribution, 10 buckets of width 10
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            decisions: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            by_tier: RwLock::new(HashMap::new()),
            by_status: RwLock::new(HashMap::new()),
            by_severity: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a produced decision
    pub fn record_decision(&self, decision: &Decision) {
        self.decisions.fetch_add(1, Ordering::Relaxed);

        *self.by_tier.write().entry(decision.tier).or_insert(0) += 1;
        *self.by_status.write().entry(decision.status).or_insert(0) += 1;

        {
            let mut latencies = self.latencies.write();
            latencies.push((decision.decision_latency_ms * 1000.0).round() as u64);
            // Keep only the most recent samples
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }

        let bucket = (usize::from(decision.risk_score) / 10).min(9);
        self.score_buckets.write()[bucket] += 1;
    }

    pub fn record_alert(&self, alert: &FraudAlert) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
        *self.by_severity.write().entry(alert.severity).or_insert(0) += 1;
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency statistics over the retained samples
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = self.latencies.read().clone();
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let pct = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: pct(0.50),
            p95_us: pct(0.95),
            p99_us: pct(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Decisions per second since start
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.decisions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn tier_count(&self, tier: EngineTier) -> u64 {
        self.by_tier.read().get(&tier).copied().unwrap_or(0)
    }

    pub fn status_count(&self, status: DecisionStatus) -> u64 {
        self.by_status.read().get(&status).copied().unwrap_or(0)
    }

    pub fn severity_count(&self, severity: Severity) -> u64 {
        self.by_severity.read().get(&severity).copied().unwrap_or(0)
    }

    pub fn score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read()
    }

    /// Log a summary of everything recorded so far
    pub fn print_summary(&self) {
        let decisions = self.decisions.load(Ordering::Relaxed);
        let alerts = self.alerts.load(Ordering::Relaxed);
        let latency = self.latency_stats();

        info!(
            decisions,
            alerts,
            rejected = self.rejected.load(Ordering::Relaxed),
            throughput = format!("{:.1} tx/s", self.throughput()),
            "Pipeline summary"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Decision latency"
        );
        info!(
            remote = self.tier_count(EngineTier::Remote),
            hybrid = self.tier_count(EngineTier::Hybrid),
            rules_only = self.tier_count(EngineTier::RulesOnly),
            precheck = self.tier_count(EngineTier::Precheck),
            degraded = self.tier_count(EngineTier::Degraded),
            "Decisions by tier"
        );
        info!(
            approved = self.status_count(DecisionStatus::Approved),
            review = self.status_count(DecisionStatus::Review),
            blocked = self.status_count(DecisionStatus::Blocked),
            high = self.severity_count(Severity::High),
            critical = self.severity_count(Severity::Critical),
            "Decisions by status"
        );

        let dist = self.score_distribution();
        let total: u64 = dist.iter().sum();
        for (i, &count) in dist.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!("  {:>3}-{:<3}: {:>6} ({:>5.1}%) {}", i * 10, i * 10 + 9, count, pct, bar);
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Decision latency statistics
#[derive(Debug, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
