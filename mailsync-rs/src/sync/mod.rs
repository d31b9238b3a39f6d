//! Synchronization engine
//!
//! - [`engine`]: the per-run orchestrator (handshake, folder loop,
//!   dedup/correlation, persistence)
//! - [`report`]: run results returned to the caller

pub mod engine;
pub mod report;

pub use engine::{SyncEngine, SyncOptions};
pub use report::{FolderSummary, SyncReport};
