//! One sync tick: fetch, detect, publish, commit, notify
//!
//! State moves forward only after the gist write carrying the dirty set has
//! succeeded. A failed fetch or write leaves the detector untouched, so the
//! next tick stages the same files again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::scheduler::Syncable;
use crate::detect::{ChangeDetector, DirtySet, Evaluation, PublishState};
use crate::error::SyncError;
use crate::github::DocumentStore;
use crate::notify::Notifier;
use crate::source::TableSource;

/// Wall-clock time source for descriptions and publish timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// What a successful tick did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TickOutcome {
    /// Nothing differed from the published state
    Unchanged,
    /// The listed categories were written to the gist
    Published { url: String, categories: Vec<String> },
}

/// Default time budget for fetching the sheet
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(240);

/// Publishes the tracked categories of a sheet into one gist
pub struct GistSync {
    source: Arc<dyn TableSource>,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    detector: Mutex<ChangeDetector>,
    gist_id: String,
    interval: Duration,
    fetch_timeout: Duration,
}

impl GistSync {
    pub fn new(
        source: Arc<dyn TableSource>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        detector: ChangeDetector,
        gist_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            clock: Arc::new(SystemClock),
            detector: Mutex::new(detector),
            gist_id: gist_id.into(),
            interval,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound the sheet fetch; the gist write is never bounded
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Copy of the current publish state
    pub async fn state(&self) -> PublishState {
        self.detector.lock().await.state().clone()
    }

    /// Run one tick
    pub async fn tick(&self) -> Result<TickOutcome, SyncError> {
        // Held for the whole tick so ticks never interleave
        let mut detector = self.detector.lock().await;

        let table = tokio::time::timeout(self.fetch_timeout, self.source.fetch_table())
            .await
            .map_err(|_| SyncError::TimedOut(self.fetch_timeout.as_secs()))??;
        let evaluation = detector.evaluate(&table);
        let dirty = evaluation.dirty_set();

        if dirty.is_empty() {
            debug!(rows = table.len(), "No category changed");
            return Ok(TickOutcome::Unchanged);
        }

        let now = self.clock.now();
        let description = describe(&evaluation, now, self.interval);
        let files = dirty.to_gist_files();

        // Rate-limit waits happen inside the store; nothing here may cancel them
        let url = self
            .store
            .update_document(&self.gist_id, &files, Some(description))
            .await?;

        detector.commit(&dirty, now);
        drop(detector);

        let categories: Vec<String> = dirty.categories().into_iter().map(String::from).collect();
        info!(
            gist_id = %self.gist_id,
            categories = ?categories,
            "Published changed categories"
        );

        let message = update_message(&dirty, &evaluation, &url);
        if let Err(err) = self.notifier.notify(&message).await {
            warn!(error = %err, "Failed to send update notification");
        }

        Ok(TickOutcome::Published { url, categories })
    }
}

#[async_trait]
impl Syncable for GistSync {
    fn name(&self) -> &str {
        &self.gist_id
    }

    async fn sync(&self) -> Result<TickOutcome, SyncError> {
        self.tick().await
    }
}

impl std::fmt::Debug for GistSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GistSync")
            .field("gist_id", &self.gist_id)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Join with ", " and a final " and "
fn join_and(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}

/// Human form of the polling interval, e.g. "5 minutes"
pub fn cadence(interval: Duration) -> String {
    let secs = interval.as_secs();
    let (n, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };

    if n == 1 {
        unit.to_string()
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Gist description with every category's count
pub fn describe(evaluation: &Evaluation, at: DateTime<Utc>, interval: Duration) -> String {
    let counts: Vec<String> = evaluation
        .snapshots()
        .map(|snapshot| snapshot.description.clone())
        .collect();

    format!(
        "{} - As of {} GMT (Checks every {}, and updates only if there is a change)",
        join_and(&counts),
        at.format("%I:%M%p, %d/%m/%Y"),
        cadence(interval)
    )
}

/// Notification announcing a publish
pub fn update_message(dirty: &DirtySet, evaluation: &Evaluation, url: &str) -> String {
    let items: Vec<String> = dirty
        .iter()
        .map(|entry| {
            let count = evaluation
                .get(&entry.category)
                .map(|s| s.count)
                .unwrap_or(entry.fingerprint.count);
            format!("`{}` **({})**", entry.label, count)
        })
        .collect();

    format!("Updated {}! ({})", items.join(" and "), url)
}
