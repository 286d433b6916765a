//! Request/response value types exchanged with the host.
//!
//! Plain data: the agent only inspects the URL and method of a request and
//! the status of a response. Partitions store responses by value.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Other(m) => m,
        }
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }
}

impl From<String> for Method {
    fn from(s: String) -> Self {
        Method::from(s.as_str())
    }
}

impl From<Method> for String {
    fn from(m: Method) -> Self {
        m.as_str().to_string()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request from a controlled page.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| CacheError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            method,
            url,
            headers: Vec::new(),
        })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::Get, url)
    }

    pub fn from_url(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Cache identity of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Identity under which a response is stored in a partition.
///
/// Two requests share an entry when they have the same method and the same
/// URL once the fragment is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.clone(),
            url: url.into(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Stored as base64 text so binary assets stay compact on disk.
    #[serde(default, with = "body_base64")]
    pub body: Vec<u8>,
    /// Final URL after redirects, when known.
    #[serde(default)]
    pub url: Option<String>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let status_text = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string();
        Self {
            status,
            status_text,
            headers: Vec::new(),
            body: body.into(),
            url: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Status in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}

/// A response as stored in a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key: RequestKey,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(key: RequestKey, response: Response) -> Self {
        Self {
            key,
            response,
            stored_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!(Method::from("get"), Method::Get);
        assert_eq!(Method::from("POST"), Method::Post);
        assert_eq!(Method::from("purge"), Method::Other("PURGE".to_string()));
        assert_eq!(Method::Other("PURGE".to_string()).to_string(), "PURGE");
    }

    #[test]
    fn test_request_key_drops_fragment() {
        let a = Request::get("https://menu.example/index.html#top").unwrap();
        let b = Request::get("https://menu.example/index.html").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().url, "https://menu.example/index.html");
    }

    #[test]
    fn test_request_key_keeps_query() {
        let a = Request::get("https://placehold.co/80x80?text=H").unwrap();
        let b = Request::get("https://placehold.co/80x80?text=P").unwrap();
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_request_rejects_relative_url() {
        let err = Request::get("/index.html").unwrap_err();
        assert!(matches!(err, CacheError::InvalidUrl { .. }));
    }

    #[test]
    fn test_response_status_helpers() {
        let ok = Response::new(200, "{}");
        assert!(ok.is_ok());
        assert_eq!(ok.status_text, "OK");

        let created = Response::new(204, Vec::new());
        assert!(created.is_ok());

        let missing = Response::new(404, "nope");
        assert!(!missing.is_ok());
        assert_eq!(missing.status_text, "Not Found");
    }

    #[test]
    fn test_binary_body_is_stored_as_base64_text() {
        let png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];
        let json = serde_json::to_value(Response::new(200, png.clone())).unwrap();
        assert_eq!(json["body"], "iVBORw0KGgoA/w==");

        let back: Response = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, png);
    }

    #[test]
    fn test_body_rejects_invalid_base64() {
        let json = r#"{"status":200,"status_text":"OK","body":"not base64!"}"#;
        assert!(serde_json::from_str::<Response>(json).is_err());
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let resp = Response::new(200, "{}").with_header("Content-Type", "application/json");
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn test_cached_response_persists_as_json() {
        let req = Request::get("https://menu.example/menu-data.json").unwrap();
        let cached = CachedResponse::new(req.key(), Response::new(200, r#"{"items":[]}"#));
        let json = serde_json::to_string(&cached).unwrap();
        assert!(json.contains("\"GET\""));
        assert!(json.contains(r#""body":"eyJpdGVtcyI6W119""#));
        let back: CachedResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, cached.key);
        assert_eq!(back.response, cached.response);
    }
}
