//! Rate-limited GitHub REST client
//!
//! Every request goes through a single gate so only one call is in flight
//! per client. When GitHub reports that the rate limit is exhausted the
//! client releases the gate, waits for the advertised reset and re-issues
//! the same request. A successful response that spends the last call of the
//! window is returned as is; the reset is kept in the gate and the next
//! request waits for it before going out.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::ratelimit::RateLimitWindow;
use crate::config::{GithubConfig, RateLimitConfig};
use crate::error::ApiError;

/// Media type requested when the caller does not override `Accept`
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// GitHub client with single-flight rate limiting
///
/// Features:
/// - One request in flight at a time per client instance
/// - Automatic wait-and-retry on HTTP 429 or a depleted rate-limit window
/// - Bearer token authentication with per-call header overrides
#[derive(Debug)]
pub struct RateLimitedClient {
    client: Client,
    base_url: String,
    default_headers: HeaderMap,
    /// Single-flight gate; holds the reset of a window depleted by a success
    gate: Mutex<Option<Instant>>,
    config: RateLimitConfig,
}

impl RateLimitedClient {
    /// Create a new client from the GitHub and rate limit configuration
    pub fn new(github: &GithubConfig, config: RateLimitConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(github.timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Self::with_client(client, github, config)
    }

    /// Create a client around a custom reqwest Client
    pub fn with_client(
        client: Client,
        github: &GithubConfig,
        config: RateLimitConfig,
    ) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&github.user_agent).map_err(|_| {
                ApiError::InvalidConfig("github.user_agent is not a valid header value".to_string())
            })?,
        );
        if let Some(token) = github.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| {
                    ApiError::InvalidConfig("github.token is not a valid header value".to_string())
                })?;
            value.set_sensitive(true);
            default_headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            base_url: github.api_base.trim_end_matches('/').to_string(),
            default_headers,
            gate: Mutex::new(None),
            config,
        })
    }

    /// Issue a request and return the decoded JSON body
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - Path relative to the API base (e.g. `gists/abc`)
    /// * `params` - Query parameters
    /// * `body` - JSON request body
    /// * `headers` - Headers that override the client defaults
    ///
    /// # Returns
    ///
    /// The parsed response body (`Value::Null` for an empty body), or
    /// `ApiError::Rejected` carrying GitHub's message for non-2xx answers
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: Option<&[(&str, &str)]>,
        body: Option<&Value>,
        headers: Option<&HeaderMap>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        let mut attempt = 0u32;

        loop {
            let mut gate = self.gate.lock().await;

            // The previous call used up the window: wait for its reset first
            if let Some(resume_at) = *gate {
                if resume_at > Instant::now() {
                    debug!(url = url, "Rate limit window depleted, waiting for reset");
                    tokio::time::sleep_until(resume_at).await;
                }
                *gate = None;
            }

            attempt += 1;

            debug!(method = %method, url = url, attempt = attempt, "Sending GitHub API request");

            let response = self.send(method.clone(), &url, params, body, headers).await?;
            let status = response.status();
            let window = RateLimitWindow::from_headers(response.headers());
            let text = response.text().await.map_err(map_reqwest_error)?;

            if window.signals_exhaustion(status) {
                drop(gate);

                if attempt > self.config.max_retries {
                    warn!(url = url, attempts = attempt, "Rate limit retries exhausted");
                    return Err(ApiError::RateLimitRetriesExhausted { attempts: attempt });
                }

                let wait = self.backoff(&window);
                warn!(
                    url = url,
                    status = status.as_u16(),
                    wait_ms = wait.as_millis() as u64,
                    attempt = attempt,
                    "Rate limited by GitHub, waiting for reset"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            // A success that spent the last call; the next request backs off
            if window.is_depleted() {
                let wait = self.backoff(&window);
                debug!(
                    url = url,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limit window depleted by this request"
                );
                *gate = Some(Instant::now() + wait);
            }
            drop(gate);

            if status.is_success() {
                debug!(
                    url = url,
                    status = status.as_u16(),
                    remaining = ?window.remaining,
                    "Received response"
                );
                return parse_body(&text);
            }

            let message = error_message(&text, status);
            warn!(url = url, status = status.as_u16(), message = message, "GitHub API error");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
    }

    fn backoff(&self, window: &RateLimitWindow) -> Duration {
        window.wait_duration(
            chrono::Utc::now().timestamp(),
            Duration::from_secs(self.config.fallback_wait_secs),
            Duration::from_secs(self.config.max_wait_secs),
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        params: Option<&[(&str, &str)]>,
        body: Option<&Value>,
        headers: Option<&HeaderMap>,
    ) -> Result<Response, ApiError> {
        let mut merged = self.default_headers.clone();
        if let Some(extra) = headers {
            for (name, value) in extra {
                merged.insert(name.clone(), value.clone());
            }
        }

        let mut builder = self.client.request(method, url).headers(merged);
        if let Some(params) = params {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(map_reqwest_error)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Get current rate limit configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

fn parse_body(text: &str) -> Result<Value, ApiError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// GitHub error bodies look like `{"message": "Not Found", ...}`
fn error_message(text: &str, status: StatusCode) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        if let Some(Value::String(message)) = map.get("message") {
            return message.clone();
        }
    }
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Instant;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn github_config(server: &MockServer) -> GithubConfig {
        GithubConfig {
            api_base: server.uri(),
            token: Some("ghp_test".to_string()),
            user_agent: "sheet-gist-sync-tests".to_string(),
            gist_id: "abc".to_string(),
            timeout_secs: 5,
        }
    }

    fn rate_limit(max_retries: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_retries,
            fallback_wait_secs: 0,
            max_wait_secs: 5,
        }
    }

    fn exhausted() -> ResponseTemplate {
        ResponseTemplate::new(429)
            .insert_header("x-ratelimit-remaining", "0")
            .insert_header("x-ratelimit-reset-after", "0.2")
            .set_body_json(json!({"message": "API rate limit exceeded"}))
    }

    // Test 1: Successful request returns the parsed body with default headers
    #[tokio::test]
    async fn test_success_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gists/abc"))
            .and(header("authorization", "Bearer ghp_test"))
            .and(header("accept", GITHUB_ACCEPT))
            .and(header("user-agent", "sheet-gist-sync-tests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap();
        let body = client
            .request(Method::GET, "gists/abc", None, None, None)
            .await
            .unwrap();

        assert_eq!(body, json!({"id": "abc"}));
    }

    // Test 2: Query params, JSON body and header overrides are sent
    #[tokio::test]
    async fn test_params_body_and_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gists"))
            .and(query_param("scope", "gist"))
            .and(header("accept", "application/vnd.github.v3+json"))
            .and(body_json(json!({"public": false})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        let body = client
            .request(
                Method::POST,
                "/gists",
                Some(&[("scope", "gist")]),
                Some(&json!({"public": false})),
                Some(&headers),
            )
            .await
            .unwrap();

        assert_eq!(body, json!({"ok": true}));
    }

    // Test 3: [exhausted, exhausted, success] yields one result after waiting
    #[tokio::test]
    async fn test_retries_after_exhaustion() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/gists/abc"))
            .respond_with(exhausted())
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/gists/abc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"html_url": "https://gist/abc"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(5)).unwrap();

        let start = Instant::now();
        let body = client
            .request(Method::PATCH, "gists/abc", None, Some(&json!({})), None)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(body["html_url"], "https://gist/abc");
        assert!(
            elapsed >= Duration::from_millis(400),
            "Client should wait for both resets: {:?}",
            elapsed
        );
    }

    // Test 4: 403 with a depleted window is treated as exhaustion
    #[tokio::test]
    async fn test_forbidden_with_depleted_window_is_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rate"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("retry-after", "0"),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(5)).unwrap();
        let body = client
            .request(Method::GET, "rate", None, None, None)
            .await
            .unwrap();

        assert_eq!(body, json!([1, 2]));
    }

    // Test 5: Retry bound surfaces an error instead of looping forever
    #[tokio::test]
    async fn test_retry_bound() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(2)).unwrap();
        let result = client.request(Method::GET, "limited", None, None, None).await;

        assert_eq!(
            result,
            Err(ApiError::RateLimitRetriesExhausted { attempts: 3 })
        );
    }

    // Test 6: Non rate-limit failures carry GitHub's message
    #[tokio::test]
    async fn test_rejected_carries_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/gists/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Not Found",
                "documentation_url": "https://docs.github.com/rest"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap();
        let result = client
            .request(Method::PATCH, "gists/missing", None, Some(&json!({})), None)
            .await;

        assert_eq!(
            result,
            Err(ApiError::Rejected {
                status: 404,
                message: "Not Found".to_string()
            })
        );
    }

    // Test 7: 403 with quota left is a plain rejection
    #[tokio::test]
    async fn test_forbidden_with_quota_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "4999")
                    .set_body_string("forbidden"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap();
        let result = client.request(Method::GET, "private", None, None, None).await;

        assert_eq!(
            result,
            Err(ApiError::Rejected {
                status: 403,
                message: "forbidden".to_string()
            })
        );
    }

    // Test 8: The gate serializes concurrent callers
    #[tokio::test]
    async fn test_single_flight() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = Arc::new(
            RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap(),
        );

        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let c = client.clone();
                tokio::spawn(async move { c.request(Method::GET, "slow", None, None, None).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(290),
            "Requests should run one at a time: {:?}",
            elapsed
        );
    }

    // Test 9: The gate is released after an error
    #[tokio::test]
    async fn test_gate_released_after_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1})))
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap();

        let first = client.request(Method::GET, "flaky", None, None, None).await;
        assert!(matches!(first, Err(ApiError::Rejected { status: 500, .. })));

        let second = tokio::time::timeout(
            Duration::from_secs(2),
            client.request(Method::GET, "flaky", None, None, None),
        )
        .await
        .expect("gate should not stay locked");
        assert_eq!(second.unwrap(), json!({"ok": 1}));
    }

    // Test 10: Empty success body decodes to null
    #[tokio::test]
    async fn test_empty_body_is_null() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/gists/abc"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap();
        let body = client
            .request(Method::DELETE, "gists/abc", None, None, None)
            .await
            .unwrap();

        assert_eq!(body, Value::Null);
    }

    // Test 11: Error message extraction
    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"message":"Validation Failed"}"#, StatusCode::UNPROCESSABLE_ENTITY),
            "Validation Failed"
        );
        assert_eq!(error_message("  oops ", StatusCode::BAD_GATEWAY), "oops");
        assert_eq!(error_message("", StatusCode::BAD_GATEWAY), "Bad Gateway");
    }

    // Test 12: A success that depletes the window delays the next call instead of burning it
    #[tokio::test]
    async fn test_depleted_success_delays_next_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/gists/abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset-after", "0.3")
                    .set_body_json(json!({"html_url": "https://gist/abc"})),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/gists/abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "4999")
                    .set_body_json(json!({"html_url": "https://gist/abc"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RateLimitedClient::new(&github_config(&mock_server), rate_limit(3)).unwrap();

        let start = Instant::now();
        let first = client
            .request(Method::PATCH, "gists/abc", None, Some(&json!({})), None)
            .await
            .unwrap();
        assert_eq!(first["html_url"], "https://gist/abc");
        assert!(start.elapsed() < Duration::from_millis(300));

        client
            .request(Method::PATCH, "gists/abc", None, Some(&json!({})), None)
            .await
            .unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(300),
            "Second call should wait for the reset: {:?}",
            start.elapsed()
        );

        let received = mock_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2);
    }

    // Test 13: Header values that cannot be sent are configuration errors
    #[test]
    fn test_invalid_header_values() {
        let mut github = GithubConfig {
            api_base: "http://localhost".to_string(),
            token: Some("ghp_bad\ntoken".to_string()),
            user_agent: "sheet-gist-sync-tests".to_string(),
            gist_id: "abc".to_string(),
            timeout_secs: 5,
        };
        assert_eq!(
            RateLimitedClient::new(&github, rate_limit(3)).unwrap_err(),
            ApiError::InvalidConfig("github.token is not a valid header value".to_string())
        );

        github.token = None;
        github.user_agent = "bad\u{7f}agent".to_string();
        assert!(matches!(
            RateLimitedClient::new(&github, rate_limit(3)),
            Err(ApiError::InvalidConfig(_))
        ));
    }
}
