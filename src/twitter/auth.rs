use base64::Engine as _;
use rand::distributions::Alphanumeric;
use rand::Rng;
use ring::hmac;
use std::time::{SystemTime, UNIX_EPOCH};

/// OAuth 1.0a user-context signer for the Twitter v1.1 API.
pub struct TwitterAuth {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
}

impl TwitterAuth {
    pub fn new(
        consumer_key: String,
        consumer_secret: String,
        access_token: String,
        access_token_secret: String,
    ) -> Self {
        Self {
            consumer_key,
            consumer_secret,
            access_token,
            access_token_secret,
        }
    }

    pub fn timestamp_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }

    fn nonce() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    /// Build the `Authorization` header value for a request.
    /// `params` are the query (and form body) parameters, unencoded.
    pub fn header(&self, method: &str, url: &str, params: &[(&str, String)]) -> String {
        self.header_with(method, url, params, &Self::nonce(), Self::timestamp_secs())
    }

    pub(crate) fn header_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, String)],
        nonce: &str,
        timestamp: u64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let mut oauth: Vec<(&str, String)> = vec![
            ("oauth_consumer_key", self.consumer_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", "HMAC-SHA1".to_string()),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.access_token.clone()),
            ("oauth_version", "1.0".to_string()),
        ];

        let mut all: Vec<(&str, String)> = oauth.clone();
        all.extend(params.iter().cloned());
        let base = signature_base_string(method, url, &all);
        let signature = self.sign(&base);
        oauth.push(("oauth_signature", signature));
        oauth.sort_by(|a, b| a.0.cmp(b.0));

        let fields = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {}", fields)
    }

    fn sign(&self, base: &str) -> String {
        let signing_key = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(&self.access_token_secret)
        );
        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
        let tag = hmac::sign(&key, base.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(tag.as_ref())
    }
}

/// `METHOD&url&sorted-params`, each part percent-encoded.
fn signature_base_string(method: &str, url: &str, params: &[(&str, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

/// RFC 3986 encoding as OAuth 1.0a wants it: everything except
/// `A-Za-z0-9-._~`, hex in upper case.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> TwitterAuth {
        TwitterAuth::new(
            "ckey".to_string(),
            "csecret".to_string(),
            "atoken".to_string(),
            "asecret".to_string(),
        )
    }

    #[test]
    fn test_percent_encode_reserved() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(percent_encode("!*"), "%21%2A");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_base_string_sorts_and_encodes() {
        let base = signature_base_string(
            "get",
            "https://api.twitter.com/1.1/lists/statuses.json",
            &[("list_id", "7".to_string()), ("count", "20".to_string())],
        );
        assert_eq!(
            base,
            "GET&https%3A%2F%2Fapi.twitter.com%2F1.1%2Flists%2Fstatuses.json&count%3D20%26list_id%3D7"
        );
    }

    #[test]
    fn test_header_is_deterministic_for_fixed_nonce() {
        let url = "https://api.twitter.com/1.1/lists/statuses.json";
        let params = [("list_id", "7".to_string())];
        let a = auth().header_with("GET", url, &params, "abc", 1_700_000_000);
        let b = auth().header_with("GET", url, &params, "abc", 1_700_000_000);
        assert_eq!(a, b);
        assert!(a.starts_with("OAuth oauth_consumer_key=\"ckey\""));
        assert!(a.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(a.contains("oauth_timestamp=\"1700000000\""));
        assert!(a.contains("oauth_signature=\""));
    }

    #[test]
    fn test_signature_depends_on_params() {
        let url = "https://api.twitter.com/1.1/lists/statuses.json";
        let a = auth().header_with("GET", url, &[("list_id", "7".to_string())], "n", 1);
        let b = auth().header_with("GET", url, &[("list_id", "8".to_string())], "n", 1);
        assert_ne!(a, b);
    }
}
