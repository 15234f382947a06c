/// HTTP transport seam.
///
/// The protocol client only needs `(method, url, headers, query, body) ->
/// (status, body)`. Cookie persistence and the no-redirect rule are the
/// implementation's job; see [`ReqwestTransport`].

pub mod memory;
pub mod reqwest_transport;

pub use memory::ScriptedTransport;
pub use reqwest_transport::{ReqwestTransport, TransportConfig};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Desktop browser agent the server expects
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/53.0.2785.116 Safari/537.36";

/// Statuses the protocol treats as a delivered response
pub const ACCEPTED_STATUSES: [u16; 3] = [200, 301, 302];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// One outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn queries<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.query.extend(pairs);
        self
    }

    /// Attach a JSON body and the matching content type
    pub fn json_body(mut self, body: &serde_json::Value) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self.header("Content-Type", "application/json; charset=UTF-8"))
    }

    /// Value of a query parameter, if set
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A response as the transport delivered it
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        ACCEPTED_STATUSES.contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes requests for exactly one protocol client.
///
/// Implementations must keep cookies across calls on the same instance and
/// must hand back 3xx responses instead of following them.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://login.weixin.qq.com/jslogin")
            .query("appid", "wx782c26e4c19acffb")
            .query("_", 1_475_280_000_000u64);

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query_value("appid"), Some("wx782c26e4c19acffb"));
        assert_eq!(request.query_value("_"), Some("1475280000000"));
        assert_eq!(request.query_value("missing"), None);
        assert!(request.body.is_none());
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = HttpRequest::post("https://wx2.qq.com/x")
            .json_body(&json!({"BaseRequest": {"Sid": "s"}}))
            .unwrap();

        assert_eq!(request.method, Method::Post);
        assert!(request
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v.starts_with("application/json")));
        let body: serde_json::Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["BaseRequest"]["Sid"], "s");
    }

    #[test]
    fn test_accepted_statuses() {
        assert!(HttpResponse::new(200, "ok").is_accepted());
        assert!(HttpResponse::new(301, "").is_accepted());
        assert!(HttpResponse::new(302, "").is_accepted());
        assert!(!HttpResponse::new(304, "").is_accepted());
        assert!(!HttpResponse::new(500, "").is_accepted());
    }

    #[test]
    fn test_lossy_text() {
        let response = HttpResponse::new(200, vec![b'o', b'k', 0xFF]);
        assert!(response.text().starts_with("ok"));
    }
}
