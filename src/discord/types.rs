use serde::{Deserialize, Serialize};

/// Discord rejects message content longer than this.
pub const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageRequest<'a> {
    pub content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
}

/// Body of a 429 response.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitedResponse {
    #[serde(default)]
    pub message: String,
    pub retry_after: f64,
    #[serde(default)]
    pub global: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}
