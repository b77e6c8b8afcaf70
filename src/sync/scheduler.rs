//! Sync scheduler for the gist publishing loop
//!
//! This module provides a scheduler that waits for the readiness gate, runs a
//! first tick immediately and then one tick per fixed interval. Ticks never
//! overlap: an overrunning tick swallows the ticks it missed, and manual
//! triggers run inside the same loop. A started tick always runs to the end,
//! so a rate-limit wait inside the GitHub client is never cut short.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::pipeline::{Clock, SystemClock, TickOutcome};
use crate::config::SchedulerSettings;
use crate::error::SyncError;
use crate::notify::{Notifier, Readiness};

/// Configuration for the sync scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Time between tick starts
    pub interval: Duration,
    /// Report failed ticks to the notifier
    pub notify_failures: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            notify_failures: settings.notify_failures,
        }
    }
}

/// Status of the scheduled task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    /// When the last tick finished
    pub last_tick: Option<DateTime<Utc>>,
    /// Result of the last tick
    pub last_result: Option<Result<TickOutcome, String>>,
    /// Estimate of the next scheduled tick
    pub next_tick: Option<DateTime<Utc>>,
    /// Whether a tick is currently running
    pub in_progress: bool,
    /// Number of ticks run so far
    pub ticks: u64,
}

/// A task the scheduler runs once per tick
#[async_trait]
pub trait Syncable: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run one tick
    async fn sync(&self) -> Result<TickOutcome, SyncError>;
}

/// Manual sync request
struct ManualSyncRequest {
    response: mpsc::Sender<Result<TickOutcome, SyncError>>,
}

/// Fixed-interval scheduler for one [`Syncable`]
pub struct SyncScheduler {
    config: SchedulerConfig,
    task: Arc<dyn Syncable>,
    readiness: Readiness,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Arc<dyn Clock>,
    status: Arc<RwLock<SyncStatus>>,
    shutdown_rx: broadcast::Receiver<()>,
    manual_sync_rx: mpsc::Receiver<ManualSyncRequest>,
    manual_sync_tx: mpsc::Sender<ManualSyncRequest>,
}

impl SyncScheduler {
    /// Create a new sync scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Scheduler configuration
    /// * `task` - Task run on every tick
    /// * `readiness` - Gate that must open before the first tick
    /// * `shutdown_rx` - Broadcast receiver for shutdown signal
    pub fn new(
        config: SchedulerConfig,
        task: Arc<dyn Syncable>,
        readiness: Readiness,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (manual_sync_tx, manual_sync_rx) = mpsc::channel(32);

        Self {
            config,
            task,
            readiness,
            notifier: None,
            clock: Arc::new(SystemClock),
            status: Arc::new(RwLock::new(SyncStatus::default())),
            shutdown_rx,
            manual_sync_rx,
            manual_sync_tx,
        }
    }

    /// Send failed ticks to `notifier` when `notify_failures` is set
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get a handle for triggering manual syncs
    pub fn manual_sync_handle(&self) -> ManualSyncHandle {
        ManualSyncHandle {
            tx: self.manual_sync_tx.clone(),
        }
    }

    /// Get a handle for reading the sync status
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            status: self.status.clone(),
        }
    }

    /// Run the scheduler until shutdown is signaled
    pub async fn run(mut self) {
        info!(
            task = self.task.name(),
            interval_secs = self.config.interval.as_secs(),
            "Starting sync scheduler"
        );

        tokio::select! {
            _ = self.readiness.wait_until_ready() => {
                debug!("Readiness gate open");
            }
            _ = self.shutdown_rx.recv() => {
                info!("Shutdown signal received before start, stopping sync scheduler");
                return;
            }
        }

        // First tick completes immediately
        let mut timer = tokio::time::interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping sync scheduler");
                    break;
                }
                Some(request) = self.manual_sync_rx.recv() => {
                    info!(task = self.task.name(), "Manual sync triggered");
                    let result = self.perform_sync().await;
                    let _ = request.response.send(result).await;
                }
                _ = timer.tick() => {
                    debug!(task = self.task.name(), "Performing scheduled sync");
                    let _ = self.perform_sync().await;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    async fn perform_sync(&self) -> Result<TickOutcome, SyncError> {
        let name = self.task.name().to_string();

        // Mark as in progress
        self.status.write().await.in_progress = true;

        let result = self.task.sync().await;

        // Update status
        {
            let now = self.clock.now();
            let mut status = self.status.write().await;
            status.in_progress = false;
            status.ticks += 1;
            status.last_tick = Some(now);
            status.next_tick = chrono::Duration::from_std(self.config.interval)
                .ok()
                .map(|interval| now + interval);
            status.last_result = Some(result.clone().map_err(|e| e.to_string()));
        }

        match &result {
            Ok(TickOutcome::Unchanged) => {
                debug!(task = name, "Sync skipped (data unchanged)");
            }
            Ok(TickOutcome::Published { url, categories }) => {
                info!(task = name, url = %url, categories = categories.len(), "Sync completed");
            }
            Err(SyncError::TimedOut(secs)) => {
                error!(task = name, timeout_secs = *secs, "Sync timed out");
            }
            Err(err) => {
                warn!(task = name, error = %err, "Sync failed");
            }
        }

        if let (Err(err), Some(notifier), true) =
            (&result, &self.notifier, self.config.notify_failures)
        {
            if let Err(notify_err) = notifier.notify(&format!("Sync failed: {}", err)).await {
                warn!(error = %notify_err, "Failed to send failure notification");
            }
        }

        result
    }
}

/// Handle for triggering manual syncs
#[derive(Clone)]
pub struct ManualSyncHandle {
    tx: mpsc::Sender<ManualSyncRequest>,
}

impl ManualSyncHandle {
    /// Request an immediate tick and wait for its result
    pub async fn trigger_sync(&self) -> Result<TickOutcome, SyncError> {
        let (response_tx, mut response_rx) = mpsc::channel(1);

        self.tx
            .send(ManualSyncRequest {
                response: response_tx,
            })
            .await
            .map_err(|_| SyncError::SchedulerStopped)?;

        response_rx
            .recv()
            .await
            .ok_or(SyncError::SchedulerStopped)?
    }
}

/// Read access to the scheduler status
#[derive(Clone)]
pub struct StatusHandle {
    status: Arc<RwLock<SyncStatus>>,
}

impl StatusHandle {
    pub async fn get(&self) -> SyncStatus {
        self.status.read().await.clone()
    }
}
