//! Per-vehicle cooldown between proximity notifications
//!
//! One passage event per vehicle per cooldown window. A vehicle that lingers
//! near the stop, or crosses it on consecutive polls, stays suppressed until
//! its entry ages out.

use crate::domain::types::VehicleId;
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};

/// Tracks which vehicles recently triggered an event and when.
///
/// All methods take the caller's clock reading so one poll cycle evaluates
/// every vehicle against the same timestamp.
pub struct CooldownRegistry {
    window: Duration,
    entries: FxHashMap<VehicleId, Instant>,
}

impl CooldownRegistry {
    pub fn new(window: Duration) -> Self {
        Self { window, entries: FxHashMap::default() }
    }

    /// Drop entries whose age has reached the window. Returns how many were
    /// evicted.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries.retain(|_, registered| now.duration_since(*registered) < window);
        before - self.entries.len()
    }

    /// A vehicle is in cooldown while its entry is younger than the window.
    pub fn is_in_cooldown(&self, vehicle_id: &VehicleId, now: Instant) -> bool {
        match self.entries.get(vehicle_id) {
            Some(registered) => now.duration_since(*registered) < self.window,
            None => false,
        }
    }

    /// Start (or restart) the window for a vehicle.
    pub fn register(&mut self, vehicle_id: VehicleId, now: Instant) {
        self.entries.insert(vehicle_id, now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
