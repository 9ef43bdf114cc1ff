use serde_json::{Map, Value};
use std::error::Error as _;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::HttpMethod;

const USER_AGENT: &str = concat!("steadyload/", env!("CARGO_PKG_VERSION"));

/// What came back from a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    /// Human-readable description of what was actually sent.
    pub request: String,
}

/// Transport-level failure: nothing usable came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;

/// Trait for request transports
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    fn send<'a>(
        &'a self,
        url: &'a str,
        method: &'a HttpMethod,
        body: Option<&'a Map<String, Value>>,
    ) -> TransportFuture<'a>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport. With `timeout = None` the client default applies.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Method, URL and headers of a built request. Headers the connection adds on
/// the wire (`host`, `content-length`) are not listed.
fn describe_request(request: &reqwest::Request) -> String {
    let headers: Vec<String> = request
        .headers()
        .iter()
        .map(|(name, value)| format!("'{}': '{}'", name, value.to_str().unwrap_or("<binary>")))
        .collect();
    format!(
        "{} {} headers={{{}}}",
        request.method(),
        request.url(),
        headers.join(", ")
    )
}

fn describe_error(e: &reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection failed"
    } else if e.is_builder() {
        "invalid request"
    } else if e.is_decode() || e.is_body() {
        "response body error"
    } else {
        "request failed"
    };
    let mut message = format!("{kind}: {e}");
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(&format!(": {inner}"));
        source = inner.source();
    }
    message
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn send<'a>(
        &'a self,
        url: &'a str,
        method: &'a HttpMethod,
        body: Option<&'a Map<String, Value>>,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let builder = match method {
                HttpMethod::Get => self.client.get(url),
                HttpMethod::Post => {
                    let builder = self.client.post(url);
                    match body {
                        Some(body) => builder.json(body),
                        None => builder,
                    }
                }
                HttpMethod::Other(name) => {
                    return Err(TransportError::new(format!(
                        "Unsupported HTTP method: {name}"
                    )))
                }
            };

            // Set on the request itself so the description lists them.
            let builder = builder
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .header(reqwest::header::ACCEPT, "*/*");
            let request = builder.build().map_err(|e| TransportError::new(describe_error(&e)))?;
            let description = describe_request(&request);

            let response = self
                .client
                .execute(request)
                .await
                .map_err(|e| TransportError::new(describe_error(&e)))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::new(describe_error(&e)))?;

            Ok(TransportResponse {
                status,
                body,
                request: description,
            })
        })
    }
}

/// Mock transport for testing (always answers with a fixed response after a
/// configurable delay)
pub struct MockTransport {
    delay: Duration,
    status: u16,
    body: String,
}

impl MockTransport {
    pub fn new(delay: Duration, status: u16, body: impl Into<String>) -> Self {
        Self {
            delay,
            status,
            body: body.into(),
        }
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn send<'a>(
        &'a self,
        url: &'a str,
        method: &'a HttpMethod,
        _body: Option<&'a Map<String, Value>>,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            Ok(TransportResponse {
                status: self.status,
                body: self.body.clone(),
                request: format!("{method} {url}"),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_method_is_transport_error() {
        let transport = HttpTransport::new(None).unwrap();
        let method = HttpMethod::Other("PATCH".into());
        let err = transport
            .send("http://127.0.0.1:1/", &method, None)
            .await
            .unwrap_err();
        assert_eq!(err.message, "Unsupported HTTP method: PATCH");
    }

    #[tokio::test]
    async fn test_malformed_url_is_transport_error() {
        let transport = HttpTransport::new(None).unwrap();
        let result = transport.send("not a url", &HttpMethod::Get, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_transport() {
        let transport = MockTransport::new(Duration::from_millis(1), 204, "");
        let response = transport
            .send("http://a", &HttpMethod::Get, None)
            .await
            .unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.request, "GET http://a");
        assert_eq!(transport.name(), "mock");
    }
}
