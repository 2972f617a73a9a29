//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics shared between the poll loop, the credential
//! manager, and the store writer task.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    /// Poll cycles completed, including failed ones (monotonic)
    cycles_total: AtomicU64,
    /// Vehicle positions evaluated across all cycles (monotonic)
    vehicles_seen_total: AtomicU64,
    /// Passage events emitted (monotonic)
    passages_total: AtomicU64,
    /// Candidates suppressed by the cooldown registry (monotonic)
    cooldown_skips_total: AtomicU64,
    /// Cycles lost to a fetch or auth failure (monotonic)
    fetch_errors_total: AtomicU64,
    /// Records that could not be handed to / written by the store (monotonic)
    persist_errors_total: AtomicU64,
    /// Successful token exchanges (monotonic)
    token_renewals_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            vehicles_seen_total: AtomicU64::new(0),
            passages_total: AtomicU64::new(0),
            cooldown_skips_total: AtomicU64::new(0),
            fetch_errors_total: AtomicU64::new(0),
            persist_errors_total: AtomicU64::new(0),
            token_renewals_total: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_cycle(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_vehicles_seen(&self, count: u64) {
        self.vehicles_seen_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_passage(&self) {
        self.passages_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cooldown_skip(&self) {
        self.cooldown_skips_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_error(&self) {
        self.fetch_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persist_error(&self) {
        self.persist_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_token_renewal(&self) {
        self.token_renewals_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn passages_total(&self) -> u64 {
        self.passages_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn persist_errors_total(&self) -> u64 {
        self.persist_errors_total.load(Ordering::Relaxed)
    }

    /// Consistent-enough snapshot for periodic logging. Nothing is reset;
    /// every counter is monotonic.
    pub fn report(&self, cooldown_entries: usize) -> MetricsSummary {
        MetricsSummary {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            vehicles_seen_total: self.vehicles_seen_total.load(Ordering::Relaxed),
            passages_total: self.passages_total.load(Ordering::Relaxed),
            cooldown_skips_total: self.cooldown_skips_total.load(Ordering::Relaxed),
            fetch_errors_total: self.fetch_errors_total.load(Ordering::Relaxed),
            persist_errors_total: self.persist_errors_total.load(Ordering::Relaxed),
            token_renewals_total: self.token_renewals_total.load(Ordering::Relaxed),
            cooldown_entries,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub cycles_total: u64,
    pub vehicles_seen_total: u64,
    pub passages_total: u64,
    pub cooldown_skips_total: u64,
    pub fetch_errors_total: u64,
    pub persist_errors_total: u64,
    pub token_renewals_total: u64,
    /// Live cooldown entries at snapshot time
    pub cooldown_entries: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles = %self.cycles_total,
            vehicles_seen = %self.vehicles_seen_total,
            passages = %self.passages_total,
            cooldown_skips = %self.cooldown_skips_total,
            fetch_errors = %self.fetch_errors_total,
            persist_errors = %self.persist_errors_total,
            token_renewals = %self.token_renewals_total,
            cooldown_entries = %self.cooldown_entries,
            "metrics"
        );
    }
}
