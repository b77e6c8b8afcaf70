//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sheet_gist_sync::config::{Config, RateLimitConfig};
use sheet_gist_sync::detect::{ChangeDetector, RenderContext};
use sheet_gist_sync::error::NotifyError;
use sheet_gist_sync::github::{GistStore, RateLimitedClient};
use sheet_gist_sync::notify::Notifier;
use sheet_gist_sync::source::CsvExportSource;
use sheet_gist_sync::sync::{FixedClock, GistSync};

pub const GIST_ID: &str = "2206767186c249f17b07ad9a299f068c";
pub const EXPORT_PATH: &str = "/spreadsheets/d/sheet/export";

const PREAMBLE: [&str; 6] = [
    "Pokemon art project,,,,,,",
    ",,,,,,",
    "Claim a pokemon by adding your name,,,,,,",
    "Submit an imgur link when done,,,,,,",
    ",,,,,,",
    ",,,,,,",
];
const HEADER: &str = "#,Name,Person in Charge,Person's ID,Complete Imgur Link,Approval Status,Comment";

/// CSV export with the sheet's six preamble rows and header
pub fn export(rows: &[&str]) -> String {
    let mut lines: Vec<&str> = PREAMBLE.to_vec();
    lines.push(HEADER);
    lines.extend_from_slice(rows);
    lines.join("\n")
}

/// Instant used for every description and publish timestamp
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 15, 5, 0).unwrap()
}

/// Configuration pointing at the two mock servers
pub fn test_config(sheet: &MockServer, github: &MockServer) -> Config {
    let mut config = Config::default();
    config.github.api_base = github.uri();
    config.github.token = Some("ghp_test".to_string());
    config.github.gist_id = GIST_ID.to_string();
    config.rate_limit = RateLimitConfig {
        max_retries: 3,
        fallback_wait_secs: 0,
        max_wait_secs: 2,
    };
    config.source.url = format!("{}{}?gid=0&format=csv", sheet.uri(), EXPORT_PATH);
    config.source.timeout_secs = 5;
    config
}

/// Wire the sync pipeline the way the binary does, with a fixed clock
pub fn build_sync(config: &Config, notifier: Arc<dyn Notifier>) -> GistSync {
    let client = RateLimitedClient::new(&config.github, config.rate_limit.clone())
        .expect("Failed to create GitHub client");
    let source = CsvExportSource::new(&config.source).expect("Failed to create source");
    let detector = ChangeDetector::with_builtin(
        config.detect.signature,
        RenderContext::new(&config.source, config.detect.users.clone()),
    );

    GistSync::new(
        Arc::new(source),
        Arc::new(GistStore::new(Arc::new(client))),
        notifier,
        detector,
        config.github.gist_id.clone(),
        Duration::from_secs(config.scheduler.interval_secs),
    )
    .with_fetch_timeout(Duration::from_secs(config.scheduler.fetch_timeout_secs))
    .with_clock(Arc::new(FixedClock(fixed_now())))
}

/// Serve `body` as the sheet export, replacing earlier mocks
pub async fn mount_export(server: &MockServer, body: String) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(EXPORT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Accept gist updates and answer with the gist URL
pub async fn mount_gist_update(server: &MockServer) {
    Mock::given(method("PATCH"))
        .and(path_regex(r"^/gists/[0-9a-f]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gist_response()))
        .mount(server)
        .await;
}

pub fn gist_url() -> String {
    format!("https://gist.github.com/{}", GIST_ID)
}

pub fn gist_response() -> Value {
    json!({"id": GIST_ID, "html_url": gist_url()})
}

/// JSON bodies of the PATCH requests received so far
pub async fn patch_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == "PATCH")
        .map(|request| serde_json::from_slice(&request.body).expect("PATCH body is not JSON"))
        .collect()
}

/// File names of a PATCH body, sorted
pub fn file_names(body: &Value) -> Vec<String> {
    let mut names: Vec<String> = body["files"]
        .as_object()
        .map(|files| files.keys().cloned().collect())
        .unwrap_or_default();
    names.sort();
    names
}

/// Notifier that keeps every message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        self.messages.lock().await.push(message.to_string());
        Ok(())
    }
}
