use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::tail::FetchError;

const API_PREFIX: &str = "/api/v4";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Thin GitLab REST client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(host: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("glt/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: api_base_url(host),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let response = self.send(path).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchError::transient(format!("failed to read response: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| FetchError::transient(format!("malformed response from {path}: {err}")))
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.send(path).await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| FetchError::transient(format!("failed to read response: {err}")))
    }

    async fn send(&self, path: &str) -> Result<Response, FetchError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::transient(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

fn api_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let host = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    if host.ends_with(API_PREFIX) {
        host
    } else {
        format!("{host}{API_PREFIX}")
    }
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let message = error_message(status, body);
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound { message },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized { message },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            FetchError::Transient { message }
        }
        s if s.is_server_error() => FetchError::Transient { message },
        s => FetchError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

/// GitLab errors look like `{"message": "404 Not found"}` or
/// `{"error": "invalid_token", ...}`; anything else is passed through trimmed.
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .map(|m| match m {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        });

    let detail =
        from_json.unwrap_or_else(|| body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect());
    if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    }
}
