//! Outbound notifications and the readiness gate
//!
//! Publishes are announced through a [`Notifier`]. The scheduler does not
//! start ticking until [`Readiness`] is marked ready, which the binary does
//! once the sink has been set up.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{NotifyConfig, NotifyKind};
use crate::error::NotifyError;

/// Longest message a chat webhook accepts
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Notification sink
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Build the sink selected in configuration
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match (config.kind, config.webhook_url.as_deref()) {
        (NotifyKind::Webhook, Some(url)) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        (NotifyKind::Webhook, None) => Err(NotifyError::Network(
            "Webhook sink selected without a URL".to_string(),
        )),
        (NotifyKind::Log, _) => Ok(Arc::new(LogNotifier)),
    }
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        info!(message = message, "Notification");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Posts notifications to a Discord-compatible webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let content = truncate(message, MAX_MESSAGE_CHARS);
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content: &content })
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!(chars = content.chars().count(), "Webhook notification sent");
        Ok(())
    }
}

/// Cut `message` to at most `max` characters, marking the cut with "..."
pub fn truncate(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Start-up precondition shared by the binary and the scheduler
#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once [`Readiness::mark_ready`] has been called
    pub async fn wait_until_ready(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|ready| *ready).await;
    }
}
