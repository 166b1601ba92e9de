//! API request/response types

use serde::{Deserialize, Serialize};

/// Greeting returned by `GET /`
pub const GREETING: &str = "Why hello there";

/// Prefix of every failed lyrics body
pub const ERROR_PREFIX: &str = "Error getting lyrics: ";

/// JSON envelope for every response
///
/// The application status lives in `STATUS`; the HTTP status is always 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsResponse {
    /// Application status code (200 or 400)
    #[serde(rename = "STATUS")]
    pub status: u16,
    /// Generated text, sentinel, greeting, or error message
    #[serde(rename = "BODY")]
    pub body: String,
}

impl LyricsResponse {
    /// Successful response
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Failed response; `message` is prefixed with [`ERROR_PREFIX`]
    #[must_use]
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            status: 400,
            body: format!("{ERROR_PREFIX}{message}"),
        }
    }
}

/// The two raw fields of a `seed=<sentence>&length=<length>` path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsQuery {
    /// Seed sentence, possibly empty
    pub seed: String,
    /// Unparsed length
    pub length: String,
}

impl LyricsQuery {
    /// Split a decoded path segment
    ///
    /// The sentence runs up to the last `&length=`, so seeds may themselves
    /// contain `&length=`. Returns `None` for any other shape.
    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        let rest = segment.strip_prefix("seed=")?;
        let split = rest.rfind("&length=")?;
        Some(Self {
            seed: rest[..split].to_string(),
            length: rest[split + "&length=".len()..].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_field_names() {
        let json = serde_json::to_string(&LyricsResponse::ok("hi")).expect("test");
        assert_eq!(json, r#"{"STATUS":200,"BODY":"hi"}"#);
    }

    #[test]
    fn test_error_body_prefix() {
        let resp = LyricsResponse::error("boom");
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body, "Error getting lyrics: boom");
    }

    #[test]
    fn test_parse_query() {
        let q = LyricsQuery::parse("seed=你好&length=20").expect("test");
        assert_eq!(q.seed, "你好");
        assert_eq!(q.length, "20");
    }

    #[test]
    fn test_parse_query_empty_fields() {
        let q = LyricsQuery::parse("seed=&length=").expect("test");
        assert_eq!(q.seed, "");
        assert_eq!(q.length, "");
    }

    #[test]
    fn test_parse_query_last_length_wins() {
        let q = LyricsQuery::parse("seed=a&length=1&length=2").expect("test");
        assert_eq!(q.seed, "a&length=1");
        assert_eq!(q.length, "2");
    }

    #[test]
    fn test_parse_query_rejects_other_shapes() {
        assert!(LyricsQuery::parse("favicon.ico").is_none());
        assert!(LyricsQuery::parse("seed=abc").is_none());
        assert!(LyricsQuery::parse("length=5&seed=a").is_none());
    }
}
