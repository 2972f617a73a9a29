//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `tracker` - Poll loop orchestrator and proximity evaluation
//! - `auth` - OAuth2 token lifecycle for the transit API
//! - `fetcher` - Vehicle-location and stop-lookup calls
//! - `cooldown` - Per-vehicle notification cooldown

pub mod auth;
pub mod cooldown;
pub mod fetcher;
pub mod tracker;

// Re-export commonly used types
pub use auth::TokenManager;
pub use cooldown::CooldownRegistry;
pub use fetcher::PositionFetcher;
pub use tracker::Tracker;
