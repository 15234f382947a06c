/// [`reqwest`]-backed transport with a private cookie jar

use super::{HttpRequest, HttpResponse, HttpTransport, Method, DEFAULT_USER_AGENT};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::debug;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub user_agent: String,
    /// Upper bound for any single request, long polls included
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// One reqwest client, one cookie store, no automatic redirects
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("{} {}", request.method, request.url);

        let mut builder = match request.method {
            Method::Get => self.http_client.get(&request.url),
            Method::Post => self.http_client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        debug!("{} -> {} ({} bytes)", request.url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());

        let config = TransportConfig {
            user_agent: "test-agent".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(ReqwestTransport::with_config(config).is_ok());
    }

    /// Serve one canned response per connection and hand back the raw requests
    async fn serve(listener: TcpListener, responses: Vec<&'static str>) -> Vec<String> {
        let mut requests = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            requests.push(String::from_utf8_lossy(&raw).to_lowercase());
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
        requests
    }

    #[tokio::test]
    async fn test_redirects_are_returned_and_cookies_kept() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(serve(
            listener,
            vec![
                "HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\n\
                 Set-Cookie: wxuin=2000001; Path=/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
            ],
        ));

        let transport = ReqwestTransport::new().unwrap();

        let first = transport
            .execute(HttpRequest::get(format!("{}/login", base)))
            .await
            .unwrap();
        assert_eq!(first.status, 302);
        assert!(first.is_accepted());

        let second = transport
            .execute(HttpRequest::get(format!("{}/synccheck", base)).query("r", 1))
            .await
            .unwrap();
        assert_eq!(second.status, 200);
        assert_eq!(second.text(), "ok");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("get /login "));
        assert!(!requests[0].contains("cookie:"));
        assert!(requests[1].starts_with("get /synccheck?r=1 "));
        assert!(requests[1].contains("cookie: wxuin=2000001"));
    }

    #[tokio::test]
    async fn test_cookies_are_not_shared_between_transports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(serve(
            listener,
            vec![
                "HTTP/1.1 200 OK\r\nSet-Cookie: wxsid=abc; Path=/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            ],
        ));

        let first = ReqwestTransport::new().unwrap();
        let second = ReqwestTransport::new().unwrap();
        first.execute(HttpRequest::get(format!("{}/a", base))).await.unwrap();
        second.execute(HttpRequest::get(format!("{}/b", base))).await.unwrap();

        let requests = server.await.unwrap();
        assert!(!requests[1].contains("cookie:"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = ReqwestTransport::with_config(TransportConfig {
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let result = transport
            .execute(HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .await;
        assert!(result.is_err());
    }
}
