//! HTTP dispatch with per-attempt timeouts and retry

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use http::Method;
use serde_json::Value;

use crate::error::BridgeError;
use crate::retry::{self, RetryPolicy};

/// Decoded text chunks of a streaming response body
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BridgeError>> + Send>>;

/// Longest upstream body excerpt kept in an error message
const ERROR_EXCERPT_LEN: usize = 512;

/// A fully prepared upstream request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Headers in insertion order; later entries win
    pub headers: Vec<(String, String)>,
    /// JSON body; `Null` sends none
    pub body: Value,
    /// Per-attempt timeout
    pub timeout: Duration,
}

/// Raw response to a non-streaming request
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Response to a streaming request, body not yet consumed
pub struct StreamingResponse {
    pub status: u16,
    pub body: TextStream,
}

/// Wire transport underneath the client
///
/// Implementations only move bytes: they report transport faults and
/// timeouts, and leave status handling to [`HttpClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<TransportResponse, BridgeError>;

    async fn send_streaming(&self, request: &HttpRequest) -> Result<StreamingResponse, BridgeError>;
}

/// [`Transport`] backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn builder(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if !request.body.is_null() {
            builder = builder.json(&request.body);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder
    }
}

fn transport_error(error: &reqwest::Error, timeout: Duration) -> BridgeError {
    if error.is_timeout() {
        BridgeError::Timeout(timeout)
    } else {
        BridgeError::Network(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<TransportResponse, BridgeError> {
        let exchange = async {
            let response = self.builder(request).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(TransportResponse { status, body })
        };

        match tokio::time::timeout(request.timeout, exchange).await {
            Ok(result) => result.map_err(|e| transport_error(&e, request.timeout)),
            Err(_) => Err(BridgeError::Timeout(request.timeout)),
        }
    }

    async fn send_streaming(&self, request: &HttpRequest) -> Result<StreamingResponse, BridgeError> {
        let response = match tokio::time::timeout(request.timeout, self.builder(request).send()).await {
            Ok(result) => result.map_err(|e| transport_error(&e, request.timeout))?,
            Err(_) => return Err(BridgeError::Timeout(request.timeout)),
        };

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .scan(Vec::<u8>::new(), |pending, chunk| {
                let item = match chunk {
                    Ok(bytes) => {
                        pending.extend_from_slice(&bytes);
                        Ok(take_utf8_prefix(pending))
                    }
                    Err(e) => Err(BridgeError::Network(e.to_string())),
                };
                futures_util::future::ready(Some(item))
            })
            .filter(|item| futures_util::future::ready(!matches!(item, Ok(text) if text.is_empty())));

        Ok(StreamingResponse {
            status,
            body: Box::pin(body),
        })
    }
}

/// Decode the longest valid UTF-8 prefix, keeping an incomplete trailing
/// sequence for the next chunk
fn take_utf8_prefix(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_owned();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

/// JSON-over-HTTP client with timeout, error typing and retry
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send a request and decode the JSON body, retrying transient failures
    pub async fn request(&self, request: &HttpRequest) -> Result<Value, BridgeError> {
        retry::with_backoff(&self.policy, |attempt| self.attempt(request, attempt)).await
    }

    async fn attempt(&self, request: &HttpRequest, attempt: u32) -> Result<Value, BridgeError> {
        tracing::debug!(url = %request.url, attempt = attempt + 1, "sending upstream request");

        let response = self.transport.send(request).await?;
        if !is_success(response.status) {
            return Err(api_error(response.status, &response.body));
        }

        serde_json::from_str(&response.body)
            .map_err(|e| BridgeError::Bridge(format!("upstream returned invalid JSON: {e}")))
    }

    /// Open a streaming request; the body is yielded as decoded text chunks
    ///
    /// Only the initial exchange is typed like [`Self::request`]; there is
    /// no retry once bytes may have reached the caller.
    pub async fn request_stream(&self, request: &HttpRequest) -> Result<TextStream, BridgeError> {
        tracing::debug!(url = %request.url, "opening upstream stream");

        let response = self.transport.send_streaming(request).await?;
        if is_success(response.status) {
            return Ok(response.body);
        }

        let mut body = String::new();
        let mut chunks = response.body;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => body.push_str(&text),
                Err(_) => break,
            }
        }
        Err(api_error(response.status, &body))
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Build a typed API error from a non-success response
pub fn api_error(status: u16, body: &str) -> BridgeError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(extract_error_message)
        .unwrap_or_else(|| excerpt(body, status));

    BridgeError::Api {
        status,
        message,
        body: parsed,
    }
}

/// Find the human-readable message in the common error body shapes
fn extract_error_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.pointer("/message"),
        body.pointer("/response/error/message"),
        body.get("error").filter(|e| e.is_string()),
        body.pointer("/0/error/message"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_owned))
}

fn excerpt(body: &str, status: u16) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }
    match trimmed.char_indices().nth(ERROR_EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Transport replaying canned responses and recording call times
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, BridgeError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<TransportResponse, BridgeError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &HttpRequest) -> Result<TransportResponse, BridgeError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(TransportResponse {
                    status: 503,
                    body: r#"{"error":{"message":"unavailable"}}"#.to_owned(),
                })
            })
        }

        async fn send_streaming(&self, _request: &HttpRequest) -> Result<StreamingResponse, BridgeError> {
            unimplemented!("not used by these tests")
        }
    }

    fn request(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::POST,
            url: url.to_owned(),
            headers: vec![("authorization".to_owned(), "Bearer sk-test".to_owned())],
            body: json!({"model": "gpt-4o"}),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_503_backs_off_then_fails() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = HttpClient::new(transport.clone(), RetryPolicy::new(3));

        let error = client.request(&request("http://upstream")).await.unwrap_err();

        assert!(matches!(error, BridgeError::Api { status: 503, .. }));
        let calls = transport.call_times();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<u128> = calls.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![1000, 2000, 4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn three_503s_then_success_uses_every_retry() {
        let unavailable = || {
            Ok(TransportResponse {
                status: 503,
                body: r#"{"error":{"message":"unavailable"}}"#.to_owned(),
            })
        };
        let transport = ScriptedTransport::new(vec![
            unavailable(),
            unavailable(),
            unavailable(),
            Ok(TransportResponse {
                status: 200,
                body: r#"{"ok":true}"#.to_owned(),
            }),
        ]);
        let client = HttpClient::new(transport.clone(), RetryPolicy::new(3));

        let value = client.request(&request("http://upstream")).await.unwrap();

        assert_eq!(value, json!({"ok": true}));
        let calls = transport.call_times();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<u128> = calls.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![1000, 2000, 4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(TransportResponse {
            status: 400,
            body: r#"{"error":{"message":"bad model"}}"#.to_owned(),
        })]);
        let client = HttpClient::new(transport.clone(), RetryPolicy::new(3));

        let error = client.request(&request("http://upstream")).await.unwrap_err();

        match error {
            BridgeError::Api { status, message, .. } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad model");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(BridgeError::Network("connection reset".to_owned())),
            Ok(TransportResponse {
                status: 200,
                body: r#"{"ok":true}"#.to_owned(),
            }),
        ]);
        let client = HttpClient::new(transport.clone(), RetryPolicy::new(3));

        let value = client.request(&request("http://upstream")).await.unwrap();

        assert_eq!(value, json!({"ok": true}));
        assert_eq!(transport.call_times().len(), 2);
    }

    #[tokio::test]
    async fn reqwest_transport_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chatcmpl-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(Arc::new(ReqwestTransport::new()), RetryPolicy::new(0));
        let value = client
            .request(&request(&format!("{}/v1/chat/completions", server.uri())))
            .await
            .unwrap();

        assert_eq!(value["id"], "chatcmpl-1");
    }

    #[tokio::test]
    async fn timeout_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpClient::new(Arc::new(ReqwestTransport::new()), RetryPolicy::new(0));
        let mut req = request(&server.uri());
        req.timeout = Duration::from_millis(50);

        let error = client.request(&req).await.unwrap_err();
        assert!(matches!(error, BridgeError::Timeout(_)));
    }

    #[tokio::test]
    async fn stream_error_status_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let client = HttpClient::new(Arc::new(ReqwestTransport::new()), RetryPolicy::new(3));
        let Err(error) = client.request_stream(&request(&server.uri())).await else {
            panic!("expected an error");
        };

        match error {
            BridgeError::Api { status, message, body } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid x-api-key");
                assert_eq!(body.unwrap()["error"]["type"], "authentication_error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_yields_text_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: {\"x\":1}\n\ndata: [DONE]\n\n"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(Arc::new(ReqwestTransport::new()), RetryPolicy::new(0));
        let mut stream = client.request_stream(&request(&server.uri())).await.unwrap();

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap());
        }
        assert_eq!(text, "data: {\"x\":1}\n\ndata: [DONE]\n\n");
    }

    #[test]
    fn split_multibyte_sequence_is_held_back() {
        let bytes = "héllo".as_bytes();
        let mut pending = bytes[..2].to_vec();
        assert_eq!(take_utf8_prefix(&mut pending), "h");
        assert_eq!(pending.len(), 1);
        pending.extend_from_slice(&bytes[2..]);
        assert_eq!(take_utf8_prefix(&mut pending), "éllo");
        assert!(pending.is_empty());
    }

    #[test]
    fn error_message_falls_back_to_body_excerpt() {
        let error = api_error(502, "<html>bad gateway</html>");
        assert!(matches!(error, BridgeError::Api { ref message, body: None, .. } if message == "<html>bad gateway</html>"));
    }
}
