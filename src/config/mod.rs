//! Configuration management for sheet-gist-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// GitHub API configuration
    #[serde(default)]
    pub github: GithubConfig,

    /// Rate limit handling for the GitHub client
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Spreadsheet export configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Change detection configuration
    #[serde(default)]
    pub detect: DetectConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Notification sink configuration
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix SHEET_SYNC_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(token) = std::env::var("SHEET_SYNC_GITHUB_TOKEN") {
            config.github.token = Some(token);
        } else if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            config.github.token = Some(token);
        }
        if let Ok(gist_id) = std::env::var("SHEET_SYNC_GIST_ID") {
            config.github.gist_id = gist_id;
        }
        if let Ok(api_base) = std::env::var("SHEET_SYNC_GITHUB_API_BASE") {
            config.github.api_base = api_base;
        }

        if let Ok(url) = std::env::var("SHEET_SYNC_SOURCE_URL") {
            config.source.url = url;
        }
        if let Ok(header_row) = std::env::var("SHEET_SYNC_SOURCE_HEADER_ROW") {
            config.source.header_row = header_row
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid header row".to_string()))?;
        }

        if let Ok(interval) = std::env::var("SHEET_SYNC_INTERVAL_SECS") {
            config.scheduler.interval_secs = interval
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid interval".to_string()))?;
        }

        if let Ok(url) = std::env::var("SHEET_SYNC_WEBHOOK_URL") {
            config.notify.kind = NotifyKind::Webhook;
            config.notify.webhook_url = Some(url);
        }

        if let Ok(level) = std::env::var("SHEET_SYNC_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Check that everything needed to run the sync loop is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_token()?;
        if self.github.gist_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired("github.gist_id".to_string()));
        }
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("source.url".to_string()));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.notify.kind == NotifyKind::Webhook && self.notify.webhook_url.is_none() {
            return Err(ConfigError::MissingRequired("notify.webhook_url".to_string()));
        }
        Ok(())
    }

    /// Check that a GitHub token is configured and both it and the
    /// User-Agent can be sent as header values
    pub fn validate_token(&self) -> Result<(), ConfigError> {
        let token = match self.github.token.as_deref() {
            Some(token) if !token.trim().is_empty() => token,
            _ => return Err(ConfigError::MissingRequired("github.token".to_string())),
        };
        check_header_value("github.token", token)?;
        check_header_value("github.user_agent", &self.github.user_agent)
    }
}

/// GitHub API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GithubConfig {
    /// Base URL of the REST API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Access token with the gist scope
    pub token: Option<String>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Gist that receives the rendered categories
    #[serde(default)]
    pub gist_id: String,

    /// Request timeout in seconds
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            user_agent: default_user_agent(),
            gist_id: String::new(),
            timeout_secs: default_github_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    concat!("sheet-gist-sync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_github_timeout() -> u64 {
    30
}

/// Rate limit handling for the GitHub client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum number of re-issued requests after limit exhaustion
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait time when the response carries no reset information (in seconds)
    #[serde(default = "default_fallback_wait")]
    pub fallback_wait_secs: u64,

    /// Upper bound for a single rate-limit wait (in seconds)
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            fallback_wait_secs: default_fallback_wait(),
            max_wait_secs: default_max_wait(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_fallback_wait() -> u64 {
    60
}

fn default_max_wait() -> u64 {
    3600
}

/// Spreadsheet export configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// CSV export URL
    #[serde(default)]
    pub url: String,

    /// Sheet URL used for location links; derived from `url` when absent
    pub edit_url: Option<String>,

    /// Number of preamble records before the header row
    #[serde(default = "default_header_row")]
    pub header_row: usize,

    /// Request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,

    /// Column names of the sheet
    #[serde(default)]
    pub columns: ColumnNames,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            edit_url: None,
            header_row: default_header_row(),
            timeout_secs: default_source_timeout(),
            columns: ColumnNames::default(),
        }
    }
}

impl SourceConfig {
    /// Sheet URL used for location links
    ///
    /// Google export URLs look like `.../d/<id>/export?gid=0&format=csv`;
    /// the edit URL is the same document path with `/edit`.
    pub fn sheet_edit_url(&self) -> String {
        if let Some(url) = &self.edit_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.url.find("/export") {
            Some(idx) => format!("{}/edit", &self.url[..idx]),
            None => self.url.clone(),
        }
    }

    /// Sheet tab id taken from the export URL's `gid` parameter
    pub fn sheet_gid(&self) -> String {
        self.url
            .split(['?', '&', '#'])
            .find_map(|part| part.strip_prefix("gid="))
            .filter(|gid| !gid.is_empty())
            .unwrap_or("0")
            .to_string()
    }
}

fn default_header_row() -> usize {
    6
}

fn default_source_timeout() -> u64 {
    30
}

/// Column names of the sheet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnNames {
    #[serde(default = "default_name_column")]
    pub name: String,
    #[serde(default = "default_person_in_charge_column")]
    pub person_in_charge: String,
    #[serde(default = "default_owner_id_column")]
    pub owner_id: String,
    #[serde(default = "default_image_link_column")]
    pub image_link: String,
    #[serde(default = "default_approval_status_column")]
    pub approval_status: String,
    #[serde(default = "default_comment_column")]
    pub comment: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: default_name_column(),
            person_in_charge: default_person_in_charge_column(),
            owner_id: default_owner_id_column(),
            image_link: default_image_link_column(),
            approval_status: default_approval_status_column(),
            comment: default_comment_column(),
        }
    }
}

fn default_name_column() -> String {
    "Name".to_string()
}

fn default_person_in_charge_column() -> String {
    "Person in Charge".to_string()
}

fn default_owner_id_column() -> String {
    "Person's ID".to_string()
}

fn default_image_link_column() -> String {
    "Complete Imgur Link".to_string()
}

fn default_approval_status_column() -> String {
    "Approval Status".to_string()
}

fn default_comment_column() -> String {
    "Comment".to_string()
}

/// How a category fingerprint is compared between ticks
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// Compare a hash of the rendered content
    #[default]
    Content,
    /// Compare the matched row count only
    Count,
}

/// Change detection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectConfig {
    /// Fingerprint comparison mode
    #[serde(default)]
    pub signature: SignatureMode,

    /// Display names for owner ids
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    /// Interval between ticks in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Time budget for fetching the sheet in seconds
    ///
    /// Publishing is not bounded: rate-limit waits run to completion and a
    /// gist write is never cancelled half-way.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Whether failed ticks are reported to the notification sink
    #[serde(default)]
    pub notify_failures: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            notify_failures: false,
        }
    }
}

fn default_interval() -> u64 {
    300 // 5 minutes
}

fn default_fetch_timeout() -> u64 {
    240
}

/// Notification sink kind
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// Write notifications to the log only
    #[default]
    Log,
    /// POST notifications to a chat webhook
    Webhook,
}

/// Notification sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotifyConfig {
    /// Sink kind
    #[serde(default)]
    pub kind: NotifyKind,

    /// Webhook URL (required for the webhook sink)
    pub webhook_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

fn check_header_value(field: &str, value: &str) -> Result<(), ConfigError> {
    reqwest::header::HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| {
            ConfigError::InvalidValue(format!("{} contains characters not allowed in a header", field))
        })
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
