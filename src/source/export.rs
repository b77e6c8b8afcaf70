//! CSV export fetcher
//!
//! Downloads the spreadsheet export over HTTP and parses it with
//! [`parse_table`]. The export endpoint is not rate limited, so this uses a
//! plain reqwest client with a request timeout.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::table::{parse_table, Table, TableLayout};
use super::TableSource;
use crate::config::SourceConfig;
use crate::error::FetchError;

/// Fetches a spreadsheet as CSV from its export URL
#[derive(Debug, Clone)]
pub struct CsvExportSource {
    client: Client,
    url: String,
    layout: TableLayout,
}

impl CsvExportSource {
    /// Create a source from configuration
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config))
    }

    /// Create a source around a custom reqwest Client
    pub fn with_client(client: Client, config: &SourceConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            layout: TableLayout::from(config),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TableSource for CsvExportSource {
    async fn fetch_table(&self) -> Result<Table, FetchError> {
        debug!(url = %self.url, "Fetching sheet export");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let table = parse_table(&text, &self.layout)?;
        debug!(rows = table.len(), bytes = text.len(), "Parsed sheet export");
        Ok(table)
    }
}
