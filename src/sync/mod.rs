//! Gist publishing loop
//!
//! # Components
//!
//! - [`pipeline`]: one tick of fetch, detect, publish, commit and notify
//! - [`scheduler`]: readiness-gated fixed-interval scheduler with manual trigger
//!
//! # Example
//!
//! ```ignore
//! use sheet_gist_sync::sync::{GistSync, SchedulerConfig, SyncScheduler};
//!
//! let sync = Arc::new(GistSync::new(source, store, notifier, detector, gist_id, interval));
//! let scheduler = SyncScheduler::new(SchedulerConfig::default(), sync, readiness, shutdown_rx);
//! tokio::spawn(scheduler.run());
//! ```

pub mod pipeline;
pub mod scheduler;

// Re-export main types for convenience
pub use pipeline::{Clock, FixedClock, GistSync, SystemClock, TickOutcome};
pub use scheduler::{
    ManualSyncHandle, SchedulerConfig, StatusHandle, SyncScheduler, SyncStatus, Syncable,
};
