//! Gist document store
//!
//! Thin create/update operations for multi-file gists. Every network call
//! goes through [`RateLimitedClient`]; errors are surfaced unchanged.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::client::RateLimitedClient;
use crate::error::ApiError;

/// One file of a gist update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistFile {
    pub filename: String,
    pub content: String,
}

impl GistFile {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Files of a gist update keyed by their current file name
pub type GistFiles = BTreeMap<String, GistFile>;

/// Whether a created gist is listed publicly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Secret,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// Remote multi-file document operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a single-file document and return its URL
    async fn create_document(
        &self,
        content: &str,
        filename: &str,
        description: Option<String>,
        visibility: Visibility,
    ) -> Result<String, ApiError>;

    /// Merge `files` into document `id` and return its URL
    async fn update_document(
        &self,
        id: &str,
        files: &GistFiles,
        description: Option<String>,
    ) -> Result<String, ApiError>;
}

#[derive(Debug, Serialize)]
struct CreateGistRequest<'a> {
    public: bool,
    files: BTreeMap<&'a str, NewFile<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct NewFile<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateGistRequest<'a> {
    files: &'a GistFiles,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// GitHub gist store backed by the rate-limited client
#[derive(Debug, Clone)]
pub struct GistStore {
    client: Arc<RateLimitedClient>,
}

impl GistStore {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }

    fn v3_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers
    }
}

#[async_trait]
impl DocumentStore for GistStore {
    async fn create_document(
        &self,
        content: &str,
        filename: &str,
        description: Option<String>,
        visibility: Visibility,
    ) -> Result<String, ApiError> {
        let request = CreateGistRequest {
            public: visibility.is_public(),
            files: BTreeMap::from([(filename, NewFile { content })]),
            description: description.as_deref().filter(|d| !d.is_empty()),
        };
        let body = to_json(&request)?;

        let response = self
            .client
            .request(
                Method::POST,
                "gists",
                Some(&[("scope", "gist")]),
                Some(&body),
                Some(&Self::v3_headers()),
            )
            .await?;

        let url = html_url(&response)?;
        info!(url = url, filename = filename, "Created gist");
        Ok(url)
    }

    async fn update_document(
        &self,
        id: &str,
        files: &GistFiles,
        description: Option<String>,
    ) -> Result<String, ApiError> {
        let request = UpdateGistRequest {
            files,
            description: description.as_deref().filter(|d| !d.is_empty()),
        };
        let body = to_json(&request)?;

        let response = self
            .client
            .request(
                Method::PATCH,
                &format!("gists/{}", id),
                None,
                Some(&body),
                Some(&Self::v3_headers()),
            )
            .await?;

        let url = html_url(&response)?;
        info!(url = url, gist_id = id, files = files.len(), "Updated gist");
        Ok(url)
    }
}

fn to_json<T: Serialize>(request: &T) -> Result<Value, ApiError> {
    serde_json::to_value(request).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

fn html_url(response: &Value) -> Result<String, ApiError> {
    response
        .get("html_url")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ApiError::InvalidResponse("Response has no html_url".to_string()))
}
