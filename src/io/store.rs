//! Passage persistence - stop cache plus append-only passage log
//!
//! Stops live in `stops.json` so the monitored stop survives restarts
//! without re-scanning the full directory endpoint. Passages are written in
//! JSONL format (one JSON object per line) to `passages.jsonl`.

use crate::domain::types::{new_event_id, MonitoredStop, PassageEvent};
use crate::error::PersistError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One persisted passage. The vehicle coordinates are the ones that
/// triggered the event, not the stop's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageRecord {
    pub event_id: String,
    pub stop_id: i64,
    pub vehicle_id: String,
    pub line: String,
    pub destination: String,
    pub distance_meters: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub detected_at: DateTime<Utc>,
}

impl PassageRecord {
    pub fn from_event(event: &PassageEvent, stop_id: i64) -> Self {
        Self {
            event_id: new_event_id(),
            stop_id,
            vehicle_id: event.vehicle_id.to_string(),
            line: event.line.clone(),
            destination: event.destination.clone(),
            distance_meters: event.distance_meters,
            latitude: event.latitude,
            longitude: event.longitude,
            detected_at: event.detected_at,
        }
    }
}

/// Storage port for stops and passages.
#[async_trait]
pub trait PassageStore: Send + Sync {
    async fn find_stop(&self, stop_id: i64) -> Result<Option<MonitoredStop>, PersistError>;
    async fn save_stop(&self, stop: &MonitoredStop) -> Result<(), PersistError>;
    async fn record_passage(&self, record: &PassageRecord) -> Result<(), PersistError>;
}

/// File-backed store under a single data directory.
pub struct FileStore {
    stops_path: PathBuf,
    passages_path: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: &str) -> Self {
        let dir = Path::new(data_dir);
        info!(data_dir = %data_dir, "file_store_initialized");
        Self { stops_path: dir.join("stops.json"), passages_path: dir.join("passages.jsonl") }
    }

    fn read_stops(&self) -> Vec<MonitoredStop> {
        let content = match std::fs::read_to_string(&self.stops_path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(stops) => stops,
            Err(e) => {
                // Treat a damaged cache as a miss; the next save rewrites it
                warn!(path = %self.stops_path.display(), error = %e, "stop_cache_unreadable");
                Vec::new()
            }
        }
    }

    fn write_stops(&self, stops: &[MonitoredStop]) -> Result<(), PersistError> {
        if let Some(parent) = self.stops_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(stops)?;
        std::fs::write(&self.stops_path, json)?;
        Ok(())
    }

    fn append_line(&self, line: &str) -> Result<(), PersistError> {
        if let Some(parent) = self.passages_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.passages_path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.passages_path.display(), bytes = %line.len(), "passage_written");
        Ok(())
    }
}

#[async_trait]
impl PassageStore for FileStore {
    async fn find_stop(&self, stop_id: i64) -> Result<Option<MonitoredStop>, PersistError> {
        Ok(self.read_stops().into_iter().find(|stop| stop.external_id == stop_id))
    }

    async fn save_stop(&self, stop: &MonitoredStop) -> Result<(), PersistError> {
        let mut stops = self.read_stops();
        stops.retain(|existing| existing.external_id != stop.external_id);
        stops.push(stop.clone());
        self.write_stops(&stops)?;
        info!(stop_id = %stop.external_id, label = %stop.label, "stop_cached");
        Ok(())
    }

    async fn record_passage(&self, record: &PassageRecord) -> Result<(), PersistError> {
        let json = serde_json::to_string(record)?;
        self.append_line(&json)
    }
}
