//! Decision metrics collection and reporting

use revguard_core::Decision;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What was evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationKind {
    Content,
    Summary,
}

impl EvaluationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Summary => "summary",
        }
    }
}

/// Metrics collector for policy decisions.
///
/// Counters are kept in-process for `/v1/stats` and mirrored to the
/// `metrics` facade for whichever recorder is installed.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    content_evaluations: AtomicU64,
    summary_evaluations: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    policy_updates: AtomicU64,
    rejected_requests: AtomicU64,
    internal_errors: AtomicU64,
    total_latency_us: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Record one evaluation and its latency
    pub fn record_evaluation(&self, kind: EvaluationKind, decision: Decision, latency_us: u64) {
        let counter = match kind {
            EvaluationKind::Content => &self.inner.content_evaluations,
            EvaluationKind::Summary => &self.inner.summary_evaluations,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let outcome = match decision {
            Decision::Allow => &self.inner.allowed,
            Decision::Deny => &self.inner.denied,
        };
        outcome.fetch_add(1, Ordering::Relaxed);

        self.inner
            .total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);

        ::metrics::counter!(
            "revguard_decisions_total",
            "kind" => kind.as_str(),
            "decision" => decision.as_str()
        )
        .increment(1);
        ::metrics::histogram!("revguard_evaluation_latency_us", "kind" => kind.as_str())
            .record(latency_us as f64);
    }

    /// Record an applied rule table update
    pub fn record_policy_update(&self) {
        self.inner.policy_updates.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("revguard_policy_updates_total").increment(1);
    }

    /// Record a request rejected before evaluation
    pub fn record_rejected(&self, reason: &'static str) {
        self.inner.rejected_requests.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("revguard_errors_total", "reason" => reason).increment(1);
    }

    /// Record a failure that did not change a decision (audit writes)
    pub fn record_internal_error(&self, reason: &'static str) {
        self.inner.internal_errors.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("revguard_errors_total", "reason" => reason).increment(1);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            content_evaluations: self.inner.content_evaluations.load(Ordering::Relaxed),
            summary_evaluations: self.inner.summary_evaluations.load(Ordering::Relaxed),
            allowed: self.inner.allowed.load(Ordering::Relaxed),
            denied: self.inner.denied.load(Ordering::Relaxed),
            policy_updates: self.inner.policy_updates.load(Ordering::Relaxed),
            rejected_requests: self.inner.rejected_requests.load(Ordering::Relaxed),
            internal_errors: self.inner.internal_errors.load(Ordering::Relaxed),
            total_latency_us: self.inner.total_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub content_evaluations: u64,
    pub summary_evaluations: u64,
    pub allowed: u64,
    pub denied: u64,
    pub policy_updates: u64,
    pub rejected_requests: u64,
    pub internal_errors: u64,
    pub total_latency_us: u64,
}

impl MetricsSnapshot {
    pub fn evaluations(&self) -> u64 {
        self.content_evaluations + self.summary_evaluations
    }

    /// Average evaluation latency
    pub fn avg_latency_us(&self) -> u64 {
        match self.evaluations() {
            0 => 0,
            n => self.total_latency_us / n,
        }
    }

    /// Fraction of evaluations that were denied
    pub fn deny_rate(&self) -> f64 {
        match self.evaluations() {
            0 => 0.0,
            n => self.denied as f64 / n as f64,
        }
    }
}
