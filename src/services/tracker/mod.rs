//! Poll loop orchestration and proximity evaluation
//!
//! The Tracker owns the per-cycle sequence: evict expired cooldowns, fetch
//! vehicle positions, measure each against the monitored stop, emit passage
//! events, sleep until the next poll. A transient failure costs one cycle,
//! never the process.

#[cfg(test)]
mod tests;

use crate::domain::geo;
use crate::domain::types::{MonitoredStop, PassageEvent, VehiclePosition};
use crate::error::FetchError;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::StoreSender;
use crate::services::auth::TokenManager;
use crate::services::cooldown::CooldownRegistry;
use crate::services::fetcher::PositionFetcher;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Central poll loop for stop proximity monitoring
pub struct Tracker {
    /// The stop every vehicle is measured against
    pub(crate) stop: MonitoredStop,
    /// Bearer token lifecycle
    pub(crate) auth: TokenManager,
    /// Vehicle position source
    pub(crate) fetcher: PositionFetcher,
    /// Per-vehicle notification suppression
    pub(crate) cooldown: CooldownRegistry,
    /// Hands detected passages to the store writer
    pub(crate) store_sender: StoreSender,
    /// Application configuration
    pub(crate) config: Config,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
}

/// What one poll cycle saw and did
#[derive(Debug, Default)]
pub(crate) struct CycleSummary {
    pub(crate) vehicles: usize,
    pub(crate) nearby: usize,
    pub(crate) events: usize,
    pub(crate) suppressed: usize,
    pub(crate) min_distance_m: Option<f64>,
}

impl CycleSummary {
    fn track_min(&mut self, distance: f64) {
        if distance.is_nan() {
            return;
        }
        self.min_distance_m = Some(match self.min_distance_m {
            Some(current) => current.min(distance),
            None => distance,
        });
    }
}

impl Tracker {
    /// Create a new Tracker with the given configuration and dependencies
    pub fn new(
        config: Config,
        stop: MonitoredStop,
        auth: TokenManager,
        fetcher: PositionFetcher,
        store_sender: StoreSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        let window = Duration::from_secs(config.cooldown_minutes().saturating_mul(60));
        let cooldown = CooldownRegistry::new(window);
        Self { stop, auth, fetcher, cooldown, store_sender, config, metrics }
    }

    /// Run poll cycles until shutdown is signalled. The in-flight cycle
    /// always completes; the signal is only honored at the sleep boundary.
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let poll_interval = Duration::from_secs(self.config.poll_interval_secs());
        let report_interval = Duration::from_secs(self.config.metrics_interval_secs());
        let mut last_report = Instant::now();

        info!(
            stop_id = %self.stop.external_id,
            stop = %self.stop.label,
            lines = %self.config.lines().join(","),
            threshold_m = %self.config.proximity_threshold_meters(),
            poll_interval_s = %self.config.poll_interval_secs(),
            cooldown_min = %self.config.cooldown_minutes(),
            "tracker_started"
        );

        loop {
            self.run_cycle().await;

            if last_report.elapsed() >= report_interval {
                self.metrics.report(self.cooldown.len()).log();
                last_report = Instant::now();
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("tracker_shutdown_requested");
                        break;
                    }
                }
            }
        }

        self.metrics.report(self.cooldown.len()).log();
        info!("tracker_stopped");
    }

    /// One full poll cycle. Errors are logged and absorbed here.
    pub(crate) async fn run_cycle(&mut self) {
        let cycle_start = Instant::now();
        let detected_at = Utc::now();
        self.metrics.record_cycle();

        let evicted = self.cooldown.evict_expired(cycle_start);

        let positions = match self.fetch_cycle_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                self.metrics.record_fetch_error();
                error!(error = %e, auth = %e.is_auth(), "cycle_fetch_failed");
                return;
            }
        };

        let summary = self.evaluate_positions(&positions, cycle_start, detected_at);

        info!(
            vehicles = %summary.vehicles,
            nearby = %summary.nearby,
            events = %summary.events,
            suppressed = %summary.suppressed,
            evicted = %evicted,
            min_distance_m = %summary
                .min_distance_m
                .map(|d| format!("{:.1}", d))
                .unwrap_or_else(|| "-".to_string()),
            latency_us = %cycle_start.elapsed().as_micros(),
            "cycle_complete"
        );
    }

    async fn fetch_cycle_positions(&mut self) -> Result<Vec<VehiclePosition>, FetchError> {
        let token = self.auth.ensure_valid_token().await?;
        self.fetcher.fetch_positions(token.value()).await
    }

    /// Measure every vehicle against the stop and emit events for the ones
    /// inside the threshold that are not in cooldown.
    pub(crate) fn evaluate_positions(
        &mut self,
        positions: &[VehiclePosition],
        now: Instant,
        detected_at: DateTime<Utc>,
    ) -> CycleSummary {
        let threshold = self.config.proximity_threshold_meters();
        let mut summary = CycleSummary { vehicles: positions.len(), ..Default::default() };
        self.metrics.record_vehicles_seen(positions.len() as u64);

        for position in positions {
            let distance = geo::distance_meters(
                self.stop.latitude,
                self.stop.longitude,
                position.latitude,
                position.longitude,
            );
            summary.track_min(distance);

            // NaN distances fail this comparison and are dropped
            if !(distance <= threshold) {
                continue;
            }
            summary.nearby += 1;

            if self.cooldown.is_in_cooldown(&position.vehicle_id, now) {
                summary.suppressed += 1;
                self.metrics.record_cooldown_skip();
                debug!(
                    vehicle_id = %position.vehicle_id,
                    distance_m = %format!("{:.1}", distance),
                    "cooldown_suppressed"
                );
                continue;
            }

            self.emit_passage(position, distance, now, detected_at);
            summary.events += 1;
        }

        summary
    }

    fn emit_passage(
        &mut self,
        position: &VehiclePosition,
        distance: f64,
        now: Instant,
        detected_at: DateTime<Utc>,
    ) {
        let event = PassageEvent::new(position, distance, detected_at);

        info!(
            vehicle_id = %event.vehicle_id,
            line = %event.line,
            destination = %event.destination,
            distance_m = %format!("{:.1}", distance),
            stop = %self.stop.label,
            "bus_approaching"
        );
        self.metrics.record_passage();

        if let Err(e) = self.store_sender.send_passage(&event) {
            self.metrics.record_persist_error();
            warn!(vehicle_id = %event.vehicle_id, error = %e, "passage_enqueue_failed");
        }

        // Cooldown starts at detection even if the enqueue failed
        self.cooldown.register(event.vehicle_id, now);
    }
}
