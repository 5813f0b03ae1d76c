use super::auth::{percent_encode, TwitterAuth};
use super::types::*;
use crate::error::SourceError;
use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for `count` on the list timeline endpoint.
pub const MAX_PAGE_SIZE: u32 = 200;

pub struct TwitterRest {
    client: Client,
    auth: Arc<TwitterAuth>,
    base_url: String,
}

impl TwitterRest {
    pub fn new(auth: Arc<TwitterAuth>, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Statuses from a list, most recent first.
    pub async fn list_statuses(
        &self,
        list_id: &str,
        since_id: Option<&str>,
        count: u32,
    ) -> Result<Vec<Status>, SourceError> {
        let mut params: Vec<(&str, String)> = vec![
            ("list_id", list_id.to_string()),
            ("count", count.min(MAX_PAGE_SIZE).to_string()),
            ("include_entities", "false".to_string()),
            ("tweet_mode", "extended".to_string()),
        ];
        if let Some(id) = since_id {
            params.push(("since_id", id.to_string()));
        }
        self.get_signed("/1.1/lists/statuses.json", &params).await
    }

    /// Pre-flight check: verify the four OAuth credentials before polling.
    pub async fn verify_credentials(&self) -> Result<User> {
        let params = [("skip_status", "true".to_string())];
        self.get_signed("/1.1/account/verify_credentials.json", &params)
            .await
            .map_err(|e| anyhow::anyhow!("Twitter credential check failed: {}", e))
    }

    /// Signed GET request.
    async fn get_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let authorization = self.auth.header("GET", &url, params);
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        tracing::debug!(path, "twitter GET");
        let resp = self
            .client
            .get(format!("{}?{}", url, query))
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| SourceError::transient(format!("GET {} failed: {}", path, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = rate_limit_reset(resp.headers(), TwitterAuth::timestamp_secs());
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, retry_after, &body));
        }

        resp.json().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::transient(format!("reading {} response timed out", path))
            } else {
                SourceError::Permanent(format!("failed to parse {} response: {}", path, e))
            }
        })
    }
}

/// Time until `x-rate-limit-reset` (epoch seconds), if the header is present.
fn rate_limit_reset(headers: &HeaderMap, now_secs: u64) -> Option<Duration> {
    headers
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|reset| Duration::from_secs(reset.saturating_sub(now_secs)))
}

fn classify_failure(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SourceError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.errors.into_iter().next())
        .map(|e| format!("{} (code {})", e.message, e.code))
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SourceError::Transient {
            reason: format!("twitter returned {}: {}", status, detail),
            retry_after: if status == StatusCode::TOO_MANY_REQUESTS { retry_after } else { None },
        }
    } else {
        SourceError::Permanent(format!("twitter returned {}: {}", status, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_rate_limited_is_transient_with_reset() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-reset", HeaderValue::from_static("1000"));
        let retry_after = rate_limit_reset(&headers, 940);
        assert_eq!(retry_after, Some(Duration::from_secs(60)));

        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, retry_after, "");
        match err {
            SourceError::Transient { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(60)))
            }
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_in_the_past_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-reset", HeaderValue::from_static("10"));
        assert_eq!(rate_limit_reset(&headers, 50), Some(Duration::ZERO));
        assert_eq!(rate_limit_reset(&HeaderMap::new(), 50), None);
    }

    #[test]
    fn test_server_error_is_transient() {
        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, None, "over capacity");
        assert!(matches!(err, SourceError::Transient { .. }));
    }

    #[test]
    fn test_not_found_is_permanent_and_reports_api_message() {
        let body = r#"{"errors":[{"code":34,"message":"Sorry, that page does not exist."}]}"#;
        let err = classify_failure(StatusCode::NOT_FOUND, None, body);
        match err {
            SourceError::Permanent(msg) => {
                assert!(msg.contains("Sorry, that page does not exist. (code 34)"))
            }
            other => panic!("expected permanent, got {:?}", other),
        }
    }
}
