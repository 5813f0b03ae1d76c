use super::rate_limit::{retry_after_header, wait_from_secs, RateLimits};
use super::types::*;
use crate::error::SinkError;
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct DiscordRest {
    client: Client,
    bot_token: String,
    base_url: String,
    rate_limits: Mutex<RateLimits>,
}

fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

impl DiscordRest {
    pub fn new(bot_token: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .user_agent(concat!(
                "DiscordBot (",
                env!("CARGO_PKG_NAME"),
                ", ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            bot_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limits: Mutex::new(RateLimits::new()),
        })
    }

    fn messages_path(channel_id: &str) -> String {
        format!("/channels/{}/messages", channel_id)
    }

    /// Post a message to a channel.
    ///
    /// An exhausted rate-limit bucket is reported as a transient failure
    /// carrying the wait, without calling Discord.
    pub async fn create_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<Option<Message>, SinkError> {
        let path = Self::messages_path(channel_id);

        if let Ok(limits) = self.rate_limits.lock() {
            if let Some(wait) = limits.wait_for(&path, now_epoch_secs()) {
                return Err(SinkError::Transient {
                    reason: format!("rate limit bucket for {} exhausted", path),
                    retry_after: Some(wait),
                });
            }
        }

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&CreateMessageRequest { content })
            .send()
            .await
            .map_err(|e| SinkError::transient(format!("POST {} failed: {}", path, e)))?;

        if let Ok(mut limits) = self.rate_limits.lock() {
            limits.observe(&path, resp.headers(), now_epoch_secs());
        }

        let status = resp.status();
        if !status.is_success() {
            let header_wait = retry_after_header(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, header_wait, &body));
        }

        // The message is accepted at this point; an unreadable echo is not a failure.
        match resp.json::<Message>().await {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "could not decode created message");
                Ok(None)
            }
        }
    }

    /// Most recent message in a channel, if there is one.
    pub async fn last_message(&self, channel_id: &str) -> Result<Option<Message>> {
        let url = format!("{}{}?limit=1", self.base_url, Self::messages_path(channel_id));
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await
            .context("Discord channel history request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Discord channel history failed ({}): {}", status, body);
        }
        let messages: Vec<Message> = resp
            .json()
            .await
            .context("failed to parse Discord channel history")?;
        Ok(messages.into_iter().next())
    }

    /// Pre-flight check: the token can see the channel.
    pub async fn check_channel(&self, channel_id: &str) -> Result<()> {
        let url = format!("{}/channels/{}", self.base_url, channel_id);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await
            .context("Discord channel pre-flight request failed")?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            anyhow::bail!("Discord authentication failed (401 Unauthorized): check the bot token");
        }
        if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
            anyhow::bail!(
                "Discord channel {} is not visible to the bot ({}): check the channel id and bot permissions",
                channel_id,
                status
            );
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Discord channel pre-flight failed ({}): {}", status, body);
        }
        Ok(())
    }
}

/// Map a non-success response onto the sink failure kinds.
pub fn classify_failure(status: StatusCode, header_wait: Option<Duration>, body: &str) -> SinkError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let parsed = serde_json::from_str::<RateLimitedResponse>(body).ok();
        let body_wait = parsed
            .as_ref()
            .and_then(|r| wait_from_secs(r.retry_after));
        let global = parsed.as_ref().is_some_and(|r| r.global);
        return SinkError::Transient {
            reason: format!(
                "discord rate limited{}: {}",
                if global { " (global)" } else { "" },
                parsed.map(|r| r.message).unwrap_or_default()
            ),
            retry_after: body_wait.or(header_wait),
        };
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|e| format!("{} (code {})", e.message, e.code))
        .unwrap_or_else(|| body.to_string());

    if status.is_server_error() {
        SinkError::transient(format!("discord returned {}: {}", status, detail))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        SinkError::Unauthorized(format!("discord returned {}: {}", status, detail))
    } else {
        SinkError::Permanent(format!("discord returned {}: {}", status, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_uses_body_retry_after() {
        let body = r#"{"message":"You are being rate limited.","retry_after":1.5,"global":false}"#;
        match classify_failure(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(9)), body) {
            SinkError::Transient { retry_after, reason } => {
                assert_eq!(retry_after, Some(Duration::from_millis(1500)));
                assert!(reason.contains("rate limited"));
            }
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn test_429_falls_back_to_header() {
        match classify_failure(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(9)), "") {
            SinkError::Transient { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(9)))
            }
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn test_429_with_absurd_body_wait_is_capped() {
        let body = r#"{"message":"slow down","retry_after":1e30,"global":true}"#;
        match classify_failure(StatusCode::TOO_MANY_REQUESTS, None, body) {
            SinkError::Transient { retry_after, reason } => {
                assert_eq!(retry_after, Some(crate::discord::rate_limit::MAX_SERVER_WAIT));
                assert!(reason.contains("(global)"));
            }
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, None, ""),
            SinkError::Transient { .. }
        ));
    }

    #[test]
    fn test_bad_request_is_permanent() {
        let body = r#"{"code":50035,"message":"Invalid Form Body"}"#;
        match classify_failure(StatusCode::BAD_REQUEST, None, body) {
            SinkError::Permanent(msg) => assert!(msg.contains("Invalid Form Body (code 50035)")),
            other => panic!("expected permanent, got {:?}", other),
        }
        assert!(matches!(
            classify_failure(StatusCode::PAYLOAD_TOO_LARGE, None, ""),
            SinkError::Permanent(_)
        ));
    }

    #[test]
    fn test_auth_failures_are_unauthorized() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, None, ""),
            SinkError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, None, ""),
            SinkError::Unauthorized(_)
        ));
    }
}
