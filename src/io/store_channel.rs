//! Typed channel between the poll loop and the store writer
//!
//! The poll loop never blocks on disk I/O. Passages cross a bounded mpsc
//! channel to a writer task that owns the store; a full queue drops the
//! record and reports it rather than stalling the loop.

use crate::domain::types::PassageEvent;
use crate::error::PersistError;
use crate::infra::metrics::Metrics;
use crate::io::store::{PassageRecord, PassageStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Messages handled by the store writer
#[derive(Debug)]
pub enum StoreMessage {
    /// Detected passage for the append-only log
    Passage(PassageRecord),
}

/// Sender handle for store messages
///
/// Clone this to share across producers. Non-blocking; a full channel
/// surfaces as an error instead of backpressure.
#[derive(Clone)]
pub struct StoreSender {
    tx: mpsc::Sender<StoreMessage>,
    stop_id: i64,
}

impl StoreSender {
    /// Create a new sender from an mpsc sender.
    /// stop_id is stamped onto every record for downstream consumers.
    pub fn new(tx: mpsc::Sender<StoreMessage>, stop_id: i64) -> Self {
        Self { tx, stop_id }
    }

    /// Queue a passage for persistence
    pub fn send_passage(&self, event: &PassageEvent) -> Result<(), PersistError> {
        let record = PassageRecord::from_event(event, self.stop_id);
        self.tx.try_send(StoreMessage::Passage(record)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PersistError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PersistError::QueueClosed,
        })
    }
}

/// Create a new store channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many records can be queued.
pub fn create_store_channel(
    buffer_size: usize,
    stop_id: i64,
) -> (StoreSender, mpsc::Receiver<StoreMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (StoreSender::new(tx, stop_id), rx)
}

/// Drain the channel into the store. Runs until every sender is dropped,
/// so records queued before shutdown still reach disk.
pub async fn run_store_writer<S: PassageStore>(
    store: S,
    mut rx: mpsc::Receiver<StoreMessage>,
    metrics: Arc<Metrics>,
) {
    info!("store_writer_started");
    while let Some(message) = rx.recv().await {
        match message {
            StoreMessage::Passage(record) => match store.record_passage(&record).await {
                Ok(()) => {
                    info!(
                        event_id = %record.event_id,
                        vehicle_id = %record.vehicle_id,
                        line = %record.line,
                        distance_m = %format!("{:.1}", record.distance_meters),
                        "passage_recorded"
                    );
                }
                Err(e) => {
                    metrics.record_persist_error();
                    error!(event_id = %record.event_id, error = %e, "passage_record_failed");
                }
            },
        }
    }
    debug!("store_writer_stopped");
}
