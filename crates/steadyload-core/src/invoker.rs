use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::config::HttpMethod;
use crate::extract::{Extracted, JsonPaths};
use crate::transport::Transport;

/// Status of a finished attempt: an HTTP code, or the transport error marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptStatus {
    Http(u16),
    Error,
}

impl AttemptStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, AttemptStatus::Error)
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            AttemptStatus::Http(code) => Some(*code),
            AttemptStatus::Error => None,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Http(code) => write!(f, "{code}"),
            AttemptStatus::Error => f.write_str("Error"),
        }
    }
}

/// Terminal record of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    /// Issuance index within the run
    pub index: u64,
    pub url: String,
    pub method: HttpMethod,
    pub status: AttemptStatus,
    pub latency_secs: f64,
    pub request: String,
    pub request_body: String,
    pub response: String,
    pub extracted: Vec<Extracted>,
}

impl AttemptResult {
    /// Result for an attempt whose task died before producing one.
    pub fn lost(
        index: u64,
        url: &str,
        method: &HttpMethod,
        reason: impl Into<String>,
        paths: &JsonPaths,
    ) -> Self {
        Self {
            index,
            url: url.to_string(),
            method: method.clone(),
            status: AttemptStatus::Error,
            latency_secs: 0.0,
            request: url.to_string(),
            request_body: String::new(),
            response: reason.into(),
            extracted: paths.absent(),
        }
    }
}

/// Serialized form of a request body. Empty bodies are written as "".
pub fn serialize_body(body: Option<&Map<String, Value>>) -> String {
    match body {
        Some(body) if !body.is_empty() => serde_json::to_string(body).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Issues single requests and turns every outcome into an [`AttemptResult`].
#[derive(Clone)]
pub struct Invoker {
    transport: Arc<dyn Transport>,
    paths: Arc<JsonPaths>,
}

impl Invoker {
    pub fn new(transport: Arc<dyn Transport>, paths: Arc<JsonPaths>) -> Self {
        Self { transport, paths }
    }

    pub fn paths(&self) -> &JsonPaths {
        &self.paths
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Issue one request. Never fails: transport errors become an
    /// `AttemptStatus::Error` result.
    pub async fn invoke(
        &self,
        index: u64,
        url: &str,
        method: &HttpMethod,
        body: Option<&Map<String, Value>>,
    ) -> AttemptResult {
        let request_body = serialize_body(body);

        let start = Instant::now();
        let outcome = self.transport.send(url, method, body).await;
        let latency_secs = start.elapsed().as_secs_f64();

        match outcome {
            Ok(response) => AttemptResult {
                index,
                url: url.to_string(),
                method: method.clone(),
                status: AttemptStatus::Http(response.status),
                latency_secs,
                request: response.request,
                request_body,
                extracted: self.paths.extract_text(&response.body),
                response: response.body,
            },
            Err(e) => {
                debug!(index, url, error = %e, "attempt failed");
                AttemptResult {
                    index,
                    url: url.to_string(),
                    method: method.clone(),
                    status: AttemptStatus::Error,
                    latency_secs,
                    request: url.to_string(),
                    request_body,
                    response: e.message,
                    extracted: self.paths.absent(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, TransportError, TransportFuture};
    use serde_json::json;
    use std::time::Duration;

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn send<'a>(
            &'a self,
            _url: &'a str,
            _method: &'a HttpMethod,
            _body: Option<&'a Map<String, Value>>,
        ) -> TransportFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                Err(TransportError::new("connection refused"))
            })
        }
    }

    fn paths(raw: &[&str]) -> Arc<JsonPaths> {
        let owned: Vec<String> = raw.iter().map(|s| s.to_string()).collect();
        Arc::new(JsonPaths::compile(&owned).unwrap())
    }

    #[tokio::test]
    async fn test_success_extracts_values() {
        let transport = Arc::new(MockTransport::new(
            Duration::ZERO,
            200,
            r#"{"data": {"id": 12}}"#,
        ));
        let invoker = Invoker::new(transport, paths(&["$.data.id", "$.missing"]));
        let body = json!({"name": "x"}).as_object().cloned().unwrap();

        let result = invoker
            .invoke(0, "http://a", &HttpMethod::Post, Some(&body))
            .await;
        assert_eq!(result.status, AttemptStatus::Http(200));
        assert_eq!(result.request_body, r#"{"name":"x"}"#);
        assert_eq!(result.extracted[0].value, Some(json!(12)));
        assert_eq!(result.extracted[1].value, None);
        assert!(result.latency_secs >= 0.0);
    }

    #[tokio::test]
    async fn test_not_json_keeps_status() {
        let transport = Arc::new(MockTransport::new(Duration::ZERO, 200, "not json"));
        let invoker = Invoker::new(transport, paths(&["$.a", "$.b"]));

        let result = invoker.invoke(0, "http://a", &HttpMethod::Get, None).await;
        assert_eq!(result.status, AttemptStatus::Http(200));
        assert_eq!(result.response, "not json");
        assert!(result.extracted.iter().all(|e| e.value.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_recorded() {
        let invoker = Invoker::new(Arc::new(FailingTransport), paths(&["$.a"]));

        let result = invoker.invoke(3, "http://down", &HttpMethod::Get, None).await;
        assert_eq!(result.index, 3);
        assert_eq!(result.status, AttemptStatus::Error);
        assert_eq!(result.status.to_string(), "Error");
        assert_eq!(result.response, "connection refused");
        assert_eq!(result.request, "http://down");
        assert!(result.latency_secs >= 0.25, "latency: {}", result.latency_secs);
        assert_eq!(result.extracted.len(), 1);
        assert!(result.extracted[0].value.is_none());
    }

    #[test]
    fn test_serialize_body() {
        assert_eq!(serialize_body(None), "");
        assert_eq!(serialize_body(Some(&Map::new())), "");
    }
}
