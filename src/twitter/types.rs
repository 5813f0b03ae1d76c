use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `created_at` format used by the v1.1 API: "Wed Oct 10 20:19:24 +0000 2018".
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id_str: String,
    pub created_at: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    pub user: User,
    #[serde(default)]
    pub retweeted_status: Option<serde_json::Value>,
}

impl Status {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_str(&self.created_at, CREATED_AT_FORMAT)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn body(&self) -> &str {
        self.full_text
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub screen_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let json = r#"{
            "id_str": "1050118621198921728",
            "created_at": "Wed Oct 10 20:19:24 +0000 2018",
            "text": "To make room for more expression",
            "user": { "screen_name": "TwitterAPI", "name": "Twitter API" },
            "retweeted_status": null
        }"#;
        let status: Status = serde_json::from_str(json).unwrap();
        assert_eq!(status.id_str, "1050118621198921728");
        assert_eq!(status.body(), "To make room for more expression");
        assert!(status.retweeted_status.is_none());
        let at = status.created_at_utc().unwrap();
        assert_eq!(at.to_rfc3339(), "2018-10-10T20:19:24+00:00");
    }

    #[test]
    fn test_full_text_preferred() {
        let json = r#"{
            "id_str": "1",
            "created_at": "Thu Jan 01 00:00:00 +0000 2015",
            "text": "short",
            "full_text": "the long version",
            "user": { "screen_name": "a" },
            "retweeted_status": { "id_str": "0" }
        }"#;
        let status: Status = serde_json::from_str(json).unwrap();
        assert_eq!(status.body(), "the long version");
        assert!(status.retweeted_status.is_some());
    }

    #[test]
    fn test_bad_created_at() {
        let json = r#"{"id_str":"1","created_at":"yesterday","user":{"screen_name":"a"}}"#;
        let status: Status = serde_json::from_str(json).unwrap();
        assert!(status.created_at_utc().is_none());
    }
}
