//! Shared HTTP plumbing: client construction and status → [`ProviderError`] mapping.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use url::Url;

use enhancer_shared::{EnhancerError, ProviderError, Result};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("Enhancer/", env!("CARGO_PKG_VERSION"));

/// Longest body excerpt carried inside an error message.
const BODY_EXCERPT_CHARS: usize = 200;

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")).into())
}

/// Join `path` onto a configured base URL. An empty path returns the base itself.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url> {
    let base = base.trim_end_matches('/');
    let joined = if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{}", path.trim_start_matches('/'))
    };
    Url::parse(&joined)
        .map_err(|e| EnhancerError::config(format!("invalid endpoint URL '{joined}': {e}")))
}

pub(crate) fn map_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Pass successful responses through; classify everything else.
pub(crate) async fn check_status(response: Response) -> std::result::Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify(status, &body))
}

fn classify(status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited;
    }
    if status == StatusCode::FORBIDDEN && mentions_quota(body) {
        return ProviderError::QuotaExceeded;
    }
    if status.is_server_error() {
        return ProviderError::Network(format!("HTTP {status}"));
    }
    ProviderError::InvalidResponse(format!("HTTP {status}: {}", excerpt(body)))
}

fn mentions_quota(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("quota") || lower.contains("limitexceeded")
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{cut}…")
    }
}

pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> std::result::Result<T, ProviderError> {
    let bytes = response.bytes().await.map_err(map_send_error)?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}
