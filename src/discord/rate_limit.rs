use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::time::Duration;

/// Longest wait accepted from a server-supplied value.
pub const MAX_SERVER_WAIT: Duration = Duration::from_secs(3600);

/// Server-supplied seconds as a `Duration`, capped at `MAX_SERVER_WAIT`.
/// Negative and non-finite values are rejected.
pub fn wait_from_secs(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs.min(MAX_SERVER_WAIT.as_secs_f64())).ok()
}

/// Bucket state reported by Discord for one route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub remaining: u32,
    /// Epoch seconds at which the bucket refills.
    pub reset_at: f64,
}

/// Rate-limit buckets keyed by route (e.g. the channel messages URL).
#[derive(Debug, Default)]
pub struct RateLimits {
    buckets: HashMap<String, Bucket>,
}

impl RateLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bucket headers of a response, if any.
    pub fn observe(&mut self, route: &str, headers: &HeaderMap, now: f64) {
        if let Some(bucket) = parse_bucket(headers, now) {
            self.buckets.insert(route.to_string(), bucket);
        }
    }

    /// How long to wait before the route can be called again, if the
    /// bucket is exhausted and has not reset yet.
    pub fn wait_for(&self, route: &str, now: f64) -> Option<Duration> {
        let bucket = self.buckets.get(route)?;
        if bucket.remaining > 0 || bucket.reset_at <= now {
            return None;
        }
        wait_from_secs(bucket.reset_at - now)
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Prefer `X-RateLimit-Reset-After` (relative) over `X-RateLimit-Reset`
/// (absolute) so local clock drift does not matter.
fn parse_bucket(headers: &HeaderMap, now: f64) -> Option<Bucket> {
    let remaining = header_f64(headers, "x-ratelimit-remaining")?;
    let reset_at = header_f64(headers, "x-ratelimit-reset-after")
        .map(|after| now + after)
        .or_else(|| header_f64(headers, "x-ratelimit-reset"))
        .filter(|at| at.is_finite())?;
    Some(Bucket {
        remaining: remaining.max(0.0) as u32,
        reset_at,
    })
}

/// `Retry-After` header in seconds.
pub fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    header_f64(headers, "retry-after").and_then(wait_from_secs)
}
