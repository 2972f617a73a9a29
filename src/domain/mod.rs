//! Domain models - core types of the proximity tracker
//!
//! This module contains the canonical data types used throughout the system:
//! - `VehiclePosition` - one vehicle snapshot from a poll cycle
//! - `MonitoredStop` - the stop being watched, resolved once at startup
//! - `PassageEvent` - a detected passage handed to persistence
//! - `geo::distance_meters` - the great-circle distance the threshold is
//!   applied to

pub mod geo;
pub mod types;
