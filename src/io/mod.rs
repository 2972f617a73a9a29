//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `store` - Stop cache and passage log on the local filesystem
//! - `store_channel` - Typed channel for store writes

pub mod store;
pub mod store_channel;

// Re-export commonly used types
pub use store::{FileStore, PassageRecord, PassageStore};
pub use store_channel::{create_store_channel, run_store_writer, StoreMessage, StoreSender};
