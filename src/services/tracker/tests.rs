//! Tests for the Tracker module

use super::*;
use crate::domain::types::VehicleId;
use crate::io::store::PassageRecord;
use crate::io::store_channel::{create_store_channel, StoreMessage};
use tokio::sync::mpsc;

// Stop on Av. Gral. Rondeau, one vehicle about 64 m away and one about
// 1.1 km away
const STOP_LAT: f64 = -34.9011;
const STOP_LON: f64 = -56.1645;
const NEAR: (f64, f64) = (-34.9015, -56.1640);
const FAR: (f64, f64) = (-34.9100, -56.1700);

/// Test harness that keeps the store receiver alive so `try_send` succeeds
struct TestTracker {
    tracker: Tracker,
    store_rx: mpsc::Receiver<StoreMessage>,
}

impl std::ops::Deref for TestTracker {
    type Target = Tracker;
    fn deref(&self) -> &Self::Target {
        &self.tracker
    }
}

impl std::ops::DerefMut for TestTracker {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tracker
    }
}

fn create_test_tracker() -> TestTracker {
    create_test_tracker_with_config(Config::default().with_credentials("id", "secret"))
}

fn create_test_tracker_with_config(config: Config) -> TestTracker {
    let stop = MonitoredStop {
        external_id: 2071,
        latitude: STOP_LAT,
        longitude: STOP_LON,
        label: "AV GRAL RONDEAU y PANAMA".to_string(),
    };
    let client = reqwest::Client::new();
    let metrics = Arc::new(Metrics::new());
    let mut auth = TokenManager::new(client.clone(), &config, Arc::clone(&metrics));
    auth.set_mock_token("test-token");
    let fetcher = PositionFetcher::new(client, &config);
    let (store_sender, store_rx) = create_store_channel(8, stop.external_id);
    let tracker = Tracker::new(config, stop, auth, fetcher, store_sender, metrics);
    TestTracker { tracker, store_rx }
}

fn vehicle_at(id: &str, coords: (f64, f64)) -> VehiclePosition {
    VehiclePosition {
        vehicle_id: VehicleId::from(id),
        line: "147".to_string(),
        destination: "CIUDAD VIEJA".to_string(),
        latitude: coords.0,
        longitude: coords.1,
    }
}

fn next_record(rx: &mut mpsc::Receiver<StoreMessage>) -> Option<PassageRecord> {
    match rx.try_recv() {
        Ok(StoreMessage::Passage(record)) => Some(record),
        Err(_) => None,
    }
}

#[tokio::test]
async fn test_nearby_vehicle_emits_passage_event() {
    let mut harness = create_test_tracker();
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);

    harness.run_cycle().await;

    let record = next_record(&mut harness.store_rx).unwrap();
    assert_eq!(record.vehicle_id, "812");
    assert_eq!(record.line, "147");
    assert_eq!(record.stop_id, 2071);
    assert!(record.distance_meters > 50.0 && record.distance_meters <= 100.0);
    assert_eq!(harness.metrics.passages_total(), 1);
    assert!(harness.cooldown.is_in_cooldown(&VehicleId::from("812"), Instant::now()));
}

#[tokio::test]
async fn test_distant_vehicle_is_ignored() {
    let mut harness = create_test_tracker();
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", FAR)]);

    harness.run_cycle().await;

    assert!(next_record(&mut harness.store_rx).is_none());
    assert_eq!(harness.metrics.passages_total(), 0);
    assert!(harness.cooldown.is_empty());
}

#[tokio::test]
async fn test_cooldown_suppresses_repeat_sightings() {
    let mut harness = create_test_tracker();
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);

    harness.run_cycle().await;
    harness.run_cycle().await;
    harness.run_cycle().await;

    assert!(next_record(&mut harness.store_rx).is_some());
    assert!(next_record(&mut harness.store_rx).is_none());
    assert_eq!(harness.metrics.passages_total(), 1);
}

#[tokio::test]
async fn test_second_event_after_cooldown_expires() {
    let mut harness = create_test_tracker_with_config(
        Config::default().with_credentials("id", "secret").with_cooldown_minutes(1),
    );
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);

    harness.run_cycle().await;
    assert!(next_record(&mut harness.store_rx).is_some());

    // Age the entry past the one minute window
    harness.cooldown.register(VehicleId::from("812"), Instant::now() - Duration::from_secs(61));

    harness.run_cycle().await;
    assert!(next_record(&mut harness.store_rx).is_some());
    assert_eq!(harness.metrics.passages_total(), 2);
}

#[tokio::test]
async fn test_extreme_cooldown_minutes_still_suppresses() {
    let mut harness = create_test_tracker_with_config(
        Config::default().with_credentials("id", "secret").with_cooldown_minutes(u64::MAX),
    );
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);

    harness.run_cycle().await;
    harness.run_cycle().await;

    assert!(next_record(&mut harness.store_rx).is_some());
    assert!(next_record(&mut harness.store_rx).is_none());
    assert_eq!(harness.metrics.passages_total(), 1);
}

#[tokio::test]
async fn test_cooldown_is_per_vehicle() {
    let mut harness = create_test_tracker();
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);
    harness.run_cycle().await;

    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR), vehicle_at("813", NEAR)]);
    harness.run_cycle().await;

    let first = next_record(&mut harness.store_rx).unwrap();
    let second = next_record(&mut harness.store_rx).unwrap();
    assert_eq!(first.vehicle_id, "812");
    assert_eq!(second.vehicle_id, "813");
    assert!(next_record(&mut harness.store_rx).is_none());
    assert_eq!(harness.metrics.passages_total(), 2);
}

#[tokio::test]
async fn test_mixed_vehicles_summary() {
    let mut harness = create_test_tracker();
    let positions = vec![vehicle_at("812", NEAR), vehicle_at("900", FAR)];

    let summary = harness.evaluate_positions(&positions, Instant::now(), Utc::now());

    assert_eq!(summary.vehicles, 2);
    assert_eq!(summary.nearby, 1);
    assert_eq!(summary.events, 1);
    assert_eq!(summary.suppressed, 0);
    let min = summary.min_distance_m.unwrap();
    assert!(min > 50.0 && min < 75.0);
}

#[tokio::test]
async fn test_fetch_failure_preserves_cooldown_state() {
    let mut harness = create_test_tracker();
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);
    harness.run_cycle().await;
    assert!(next_record(&mut harness.store_rx).is_some());

    harness.fetcher.set_mock_failure();
    harness.run_cycle().await;
    assert_eq!(harness.cooldown.len(), 1);

    // Vehicle is still suppressed once fetching recovers
    harness.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);
    harness.run_cycle().await;
    assert!(next_record(&mut harness.store_rx).is_none());
    assert_eq!(harness.metrics.passages_total(), 1);
}

#[tokio::test]
async fn test_persist_failure_still_registers_cooldown() {
    let TestTracker { mut tracker, store_rx } = create_test_tracker();
    tracker.fetcher.set_mock_positions(vec![vehicle_at("812", NEAR)]);
    drop(store_rx);

    tracker.run_cycle().await;

    assert_eq!(tracker.metrics.passages_total(), 1);
    assert_eq!(tracker.metrics.persist_errors_total(), 1);
    assert!(tracker.cooldown.is_in_cooldown(&VehicleId::from("812"), Instant::now()));

    // And the suppression holds on the next sighting
    tracker.run_cycle().await;
    assert_eq!(tracker.metrics.passages_total(), 1);
}

#[tokio::test]
async fn test_empty_vehicle_list_is_a_quiet_cycle() {
    let mut harness = create_test_tracker();
    harness.fetcher.set_mock_positions(vec![]);

    harness.run_cycle().await;

    assert!(next_record(&mut harness.store_rx).is_none());
    assert_eq!(harness.metrics.passages_total(), 0);
    assert!(harness.cooldown.is_empty());
}

#[tokio::test]
async fn test_token_exchanged_once_across_cycles() {
    let mut harness = create_test_tracker();
    harness.fetcher.set_mock_positions(vec![]);

    harness.run_cycle().await;
    harness.run_cycle().await;
    harness.run_cycle().await;

    assert_eq!(harness.auth.exchange_count(), 1);
}

#[tokio::test]
async fn test_shutdown_signal_stops_the_loop() {
    let TestTracker { mut tracker, store_rx: _store_rx } = create_test_tracker();
    tracker.fetcher.set_mock_positions(vec![]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracker.run(shutdown_rx).await;
        tracker
    });

    shutdown_tx.send(true).unwrap();

    let tracker = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop on shutdown")
        .unwrap();
    assert_eq!(tracker.metrics.passages_total(), 0);
}
