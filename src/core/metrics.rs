use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{MatchResult, MatchStatus};

/// Process-local counters for terminal matching outcomes
#[derive(Debug, Default)]
pub struct MatchMetrics {
    matched: AtomicU64,
    no_helpers: AtomicU64,
    all_declined: AtomicU64,
    timeout: AtomicU64,
    cancelled: AtomicU64,
    error: AtomicU64,
    duration_ms_total: AtomicU64,
    candidates_total: AtomicU64,
    notified_total: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub matched: u64,
    pub no_helpers: u64,
    pub all_declined: u64,
    pub timeout: u64,
    pub cancelled: u64,
    pub error: u64,
    pub avg_duration_ms: f64,
    pub avg_candidates: f64,
    pub helpers_notified: u64,
}

impl MatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &MatchResult) {
        let counter = match result.status {
            MatchStatus::Matched => &self.matched,
            MatchStatus::NoHelpers => &self.no_helpers,
            MatchStatus::AllDeclined => &self.all_declined,
            MatchStatus::Timeout => &self.timeout,
            MatchStatus::Cancelled => &self.cancelled,
            MatchStatus::Error => &self.error,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.duration_ms_total
            .fetch_add(result.timings.duration_ms, Ordering::Relaxed);
        self.candidates_total
            .fetch_add(result.timings.candidates_found as u64, Ordering::Relaxed);
        self.notified_total
            .fetch_add(result.timings.helpers_notified as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let matched = self.matched.load(Ordering::Relaxed);
        let no_helpers = self.no_helpers.load(Ordering::Relaxed);
        let all_declined = self.all_declined.load(Ordering::Relaxed);
        let timeout = self.timeout.load(Ordering::Relaxed);
        let cancelled = self.cancelled.load(Ordering::Relaxed);
        let error = self.error.load(Ordering::Relaxed);
        let attempts = matched + no_helpers + all_declined + timeout + cancelled + error;

        let average = |total: &AtomicU64| {
            if attempts == 0 {
                0.0
            } else {
                total.load(Ordering::Relaxed) as f64 / attempts as f64
            }
        };

        MetricsSnapshot {
            attempts,
            matched,
            no_helpers,
            all_declined,
            timeout,
            cancelled,
            error,
            avg_duration_ms: average(&self.duration_ms_total),
            avg_candidates: average(&self.candidates_total),
            helpers_notified: self.notified_total.load(Ordering::Relaxed),
        }
    }
}
