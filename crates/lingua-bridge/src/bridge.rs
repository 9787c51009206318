//! Orchestration of a bridged call
//!
//! A [`Bridge`] pairs the inbound side of one adapter with the outbound side
//! of another. It holds only read-only configuration, so one instance serves
//! any number of concurrent calls.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use http::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::adapter::Adapter;
use crate::error::{AdapterError, BridgeError};
use crate::hooks::{BridgeHooks, NoopHooks};
use crate::http::{HttpClient, HttpRequest, ReqwestTransport, TextStream, Transport};
use crate::ir::{ErrorIr, LlmRequest, LlmResponse, StreamEvent};
use crate::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};
use crate::sse::{DONE_SENTINEL, SseLineParser, data_payload};
use crate::stream::{SseFrame, StreamAggregator, StreamEventBuilder, StreamParser, without_done};

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Frames produced by a streamed call, in upstream order
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, BridgeError>> + Send>>;

/// Function choosing the upstream model for a requested one
pub type ModelMapper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Upstream connection settings
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub api_key: SecretString,
    /// Overrides the adapter's base URL
    pub base_url: Option<String>,
    /// Overrides the adapter's completion path (streaming included)
    pub chat_path: Option<String>,
    /// Overrides the adapter's model listing path
    pub models_path: Option<String>,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Extra headers; applied last, so they win over adapter defaults
    pub headers: Vec<(String, String)>,
    pub auth_header_name: Option<String>,
    pub auth_header_prefix: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(String::new()),
            base_url: None,
            chat_path: None,
            models_path: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            headers: Vec::new(),
            auth_header_name: None,
            auth_header_prefix: None,
        }
    }
}

impl BridgeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            ..Self::default()
        }
    }
}

/// Advisory comparison of two adapters' capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityReport {
    /// Features the inbound side accepts that the outbound side cannot carry
    pub issues: Vec<String>,
    /// Features that degrade but still work
    pub warnings: Vec<String>,
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Translating client between two wire formats
#[derive(Clone)]
pub struct Bridge {
    inbound: Arc<dyn Adapter>,
    outbound: Arc<dyn Adapter>,
    config: Arc<BridgeConfig>,
    client: HttpClient,
    hooks: Arc<dyn BridgeHooks>,
    target_model: Option<String>,
    model_mapper: Option<ModelMapper>,
    model_mapping: Option<Arc<HashMap<String, String>>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("inbound", &self.inbound.info().name)
            .field("outbound", &self.outbound.info().name)
            .field("target_model", &self.target_model)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Bridge`]
pub struct BridgeBuilder {
    inbound: Arc<dyn Adapter>,
    outbound: Arc<dyn Adapter>,
    config: BridgeConfig,
    hooks: Arc<dyn BridgeHooks>,
    transport: Option<Arc<dyn Transport>>,
    target_model: Option<String>,
    model_mapper: Option<ModelMapper>,
    model_mapping: Option<HashMap<String, String>>,
}

impl BridgeBuilder {
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn BridgeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Send every request to this model
    #[must_use]
    pub fn target_model(mut self, model: impl Into<String>) -> Self {
        self.target_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn model_mapper(mut self, mapper: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.model_mapper = Some(Arc::new(mapper));
        self
    }

    /// Rename models by table; unknown models pass through
    #[must_use]
    pub fn model_mapping(mut self, mapping: HashMap<String, String>) -> Self {
        self.model_mapping = Some(mapping);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Bridge {
        let transport = self.transport.unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        Bridge {
            inbound: self.inbound,
            outbound: self.outbound,
            client: HttpClient::new(transport, RetryPolicy::new(self.config.max_retries)),
            config: Arc::new(self.config),
            hooks: self.hooks,
            target_model: self.target_model,
            model_mapper: self.model_mapper,
            model_mapping: self.model_mapping.map(Arc::new),
        }
    }
}

impl Bridge {
    pub fn builder(inbound: Arc<dyn Adapter>, outbound: Arc<dyn Adapter>, config: BridgeConfig) -> BridgeBuilder {
        BridgeBuilder {
            inbound,
            outbound,
            config,
            hooks: Arc::new(NoopHooks),
            transport: None,
            target_model: None,
            model_mapper: None,
            model_mapping: None,
        }
    }

    pub fn inbound(&self) -> &Arc<dyn Adapter> {
        &self.inbound
    }

    pub fn outbound(&self) -> &Arc<dyn Adapter> {
        &self.outbound
    }

    /// Bridge a non-streaming call: inbound wire request in, inbound wire
    /// response out
    pub async fn chat(&self, wire: Value) -> Result<Value, BridgeError> {
        let request = self.inbound.parse_request(wire)?;
        let result = match self.complete(request).await {
            Ok(response) => self.render(&response),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.report_error(e).await;
        }
        result
    }

    /// Bridge a streaming call, yielding frames in the inbound format
    ///
    /// Failures before the upstream stream opens are returned directly; later
    /// failures end the stream with an error item.
    pub async fn chat_stream(&self, wire: Value) -> Result<FrameStream, BridgeError> {
        let request = self.inbound.parse_request(wire)?;
        let body = match self.open_stream(request).await {
            Ok(body) => body,
            Err(e) => {
                self.report_error(&e).await;
                return Err(e);
            }
        };

        let state = FrameState {
            events: EventState::new(self.clone(), body),
            builder: self.inbound.create_stream_builder(),
            pending: VecDeque::new(),
        };
        Ok(Box::pin(futures_util::stream::unfold(state, FrameState::next)))
    }

    /// Bridge a call through an upstream stream but answer in one piece
    ///
    /// For upstreams that only stream, such as the Codex backend.
    pub async fn chat_aggregated(&self, wire: Value) -> Result<Value, BridgeError> {
        let request = self.inbound.parse_request(wire)?;
        let result = match self.collect(request).await {
            Ok(response) => self.render(&response),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.report_error(e).await;
        }
        result
    }

    /// Send an IR request upstream without streaming
    pub async fn complete(&self, mut request: LlmRequest) -> Result<LlmResponse, BridgeError> {
        let http = self.prepare(&mut request, false).await?;
        tracing::debug!(provider = %self.outbound.info().name, url = %http.url, "dispatching request");

        let wire = self.client.request(&http).await?;
        let response = self.outbound.parse_response(wire).map_err(|e| match e {
            AdapterError::Unsupported { .. } => {
                BridgeError::Bridge("outbound adapter does not support response parsing".to_owned())
            }
            other => other.into(),
        })?;

        self.hooks.on_response(&response).await.map_err(BridgeError::Hook)?;
        Ok(response)
    }

    /// Send an IR request upstream as a stream and fold the events into a
    /// single response
    pub async fn collect(&self, request: LlmRequest) -> Result<LlmResponse, BridgeError> {
        let body = self.open_stream(request).await?;
        let mut events = EventState::new(self.clone(), body);
        let mut aggregator = StreamAggregator::new();

        while let Some(batch) = events.next_batch().await {
            for event in batch? {
                aggregator.push(&event);
            }
        }

        if let Some(failure) = aggregator.failure() {
            return Err(BridgeError::Stream {
                message: failure.message.clone(),
                code: failure.code.clone(),
            });
        }

        let response = aggregator.into_response();
        if response.has_no_output() && response.usage.is_none() {
            return Err(BridgeError::EmptyResponse);
        }

        self.hooks.on_response(&response).await.map_err(BridgeError::Hook)?;
        Ok(response)
    }

    /// Fetch the outbound provider's model listing as it sends it
    pub async fn list_models(&self) -> Result<Value, BridgeError> {
        let request = HttpRequest {
            method: Method::GET,
            url: self.models_url(),
            headers: self.headers(false),
            body: Value::Null,
            timeout: self.config.timeout,
        };
        self.client.request(&request).await
    }

    /// Compare the two adapters; never consulted by the call path
    pub fn check_compatibility(&self) -> CompatibilityReport {
        let inbound = self.inbound.capabilities();
        let outbound = self.outbound.capabilities();
        let outbound_name = self.outbound.info().name;
        let mut report = CompatibilityReport::default();

        if inbound.tools && !outbound.tools {
            report.issues.push(format!("{outbound_name} does not support tool calling"));
        }
        if inbound.vision && !outbound.vision {
            report.warnings.push(format!("{outbound_name} does not accept images"));
        }
        if inbound.streaming && !outbound.streaming {
            report.warnings.push(format!("{outbound_name} does not stream"));
        }
        if inbound.reasoning && !outbound.reasoning {
            report.warnings.push(format!("{outbound_name} does not expose reasoning"));
        }
        report
    }

    fn render(&self, response: &LlmResponse) -> Result<Value, BridgeError> {
        match self.inbound.build_response(response) {
            Ok(wire) => Ok(wire),
            Err(AdapterError::Unsupported { .. }) => {
                Ok(serde_json::to_value(response).map_err(AdapterError::serialize("ir response"))?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_stream(&self, mut request: LlmRequest) -> Result<TextStream, BridgeError> {
        let http = self.prepare(&mut request, true).await?;
        tracing::debug!(provider = %self.outbound.info().name, url = %http.url, "opening stream");
        self.client.request_stream(&http).await
    }

    fn map_model(&self, model: Option<String>) -> Option<String> {
        if let Some(target) = &self.target_model {
            return Some(target.clone());
        }
        let model = model?;
        if let Some(mapper) = &self.model_mapper {
            return Some(mapper(&model));
        }
        if let Some(mapping) = &self.model_mapping {
            return Some(mapping.get(&model).cloned().unwrap_or(model));
        }
        Some(model)
    }

    /// Reject requests the outbound provider cannot serve
    fn check_capabilities(&self, request: &LlmRequest) -> Result<(), BridgeError> {
        let capabilities = self.outbound.capabilities();
        let name = self.outbound.info().name;

        if request.has_tools() && !capabilities.tools {
            return Err(BridgeError::Validation(format!("{name} does not support tool calling")));
        }
        if request.has_images() && !capabilities.vision {
            return Err(BridgeError::Validation(format!("{name} does not accept image input")));
        }
        if request.thinking_enabled() && !capabilities.reasoning {
            return Err(BridgeError::Validation(format!("{name} does not support reasoning")));
        }
        Ok(())
    }

    /// Map, observe, validate and lower a request into an HTTP call
    async fn prepare(&self, request: &mut LlmRequest, stream: bool) -> Result<HttpRequest, BridgeError> {
        request.model = self.map_model(request.model.take());
        request.stream = stream;

        self.hooks.on_request(request).await.map_err(BridgeError::Hook)?;
        self.inbound.validate_request(request).map_err(BridgeError::Validation)?;
        self.check_capabilities(request)?;

        let body = self.outbound.build_request(request)?;
        Ok(HttpRequest {
            method: Method::POST,
            url: self.url(request.model.as_deref(), stream),
            headers: self.headers(stream),
            body,
            timeout: self.config.timeout,
        })
    }

    fn url(&self, model: Option<&str>, stream: bool) -> String {
        let endpoint = self.outbound.info().endpoint;
        let base = self.config.base_url.as_deref().unwrap_or(endpoint.base_url);
        let path = match (&self.config.chat_path, stream) {
            (Some(path), _) => path.as_str(),
            (None, true) => endpoint.stream_path.unwrap_or(endpoint.chat_path),
            (None, false) => endpoint.chat_path,
        };
        let path = path.replace("{model}", model.unwrap_or_default());
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn models_url(&self) -> String {
        let endpoint = self.outbound.info().endpoint;
        let base = self.config.base_url.as_deref().unwrap_or(endpoint.base_url);
        let path = self.config.models_path.as_deref().unwrap_or(endpoint.models_path);
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn headers(&self, stream: bool) -> Vec<(String, String)> {
        let endpoint = self.outbound.info().endpoint;
        let mut headers: Vec<(String, String)> = endpoint
            .headers
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();

        let api_key = self.config.api_key.expose_secret();
        if !api_key.is_empty() {
            let name = self.config.auth_header_name.as_deref().unwrap_or(endpoint.auth.header);
            let prefix = self.config.auth_header_prefix.as_deref().unwrap_or(endpoint.auth.prefix);
            headers.push((name.to_owned(), format!("{prefix}{api_key}")));
        }
        if stream {
            headers.push(("accept".to_owned(), "text/event-stream".to_owned()));
        }
        headers.extend(self.config.headers.iter().cloned());
        headers
    }

    /// Tell the hooks about a failure; their own failures are only logged
    async fn report_error(&self, error: &BridgeError) {
        let ir = match error {
            BridgeError::Api {
                status,
                body: Some(body),
                ..
            } => self.outbound.parse_error(body, Some(*status)),
            other => ErrorIr::from(other),
        };
        if let Err(e) = self.hooks.on_error(&ir).await {
            tracing::warn!(error = %e, "on_error hook failed");
        }
    }
}

/// Upstream body to IR events: line reassembly, JSON decoding, parsing
struct EventState {
    bridge: Bridge,
    body: TextStream,
    lines: SseLineParser,
    parser: Box<dyn StreamParser>,
    finished: bool,
}

impl EventState {
    fn new(bridge: Bridge, body: TextStream) -> Self {
        let parser = bridge.outbound.create_stream_parser();
        Self {
            bridge,
            body,
            lines: SseLineParser::new(),
            parser,
            finished: false,
        }
    }

    /// Events decoded from the next body chunk; `None` once exhausted
    ///
    /// Every event has been passed to `on_stream_event`.
    async fn next_batch(&mut self) -> Option<Result<Vec<StreamEvent>, BridgeError>> {
        if self.finished {
            return None;
        }

        let events = match self.body.next().await {
            Some(Ok(text)) => {
                let lines = self.lines.process_chunk(&text);
                self.decode(&lines)
            }
            Some(Err(e)) => {
                self.finished = true;
                return Some(Err(e));
            }
            None => {
                self.finished = true;
                let lines = self.lines.flush();
                let mut events = self.decode(&lines);
                events.extend(self.parser.finish());
                events
            }
        };

        for event in &events {
            if let Err(e) = self.bridge.hooks.on_stream_event(event).await {
                self.finished = true;
                return Some(Err(BridgeError::Hook(e)));
            }
        }
        Some(Ok(events))
    }

    fn decode(&mut self, lines: &[String]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in lines {
            let Some(payload) = data_payload(line).map(str::trim) else {
                continue;
            };
            if payload.is_empty() || payload == DONE_SENTINEL {
                continue;
            }
            let chunk: Value = match serde_json::from_str(payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable SSE payload");
                    continue;
                }
            };
            match self.parser.parse(&chunk) {
                Ok(parsed) => events.extend(parsed),
                Err(e) => tracing::debug!(error = %e, "skipping unrecognized stream chunk"),
            }
        }
        events
    }
}

/// IR events to inbound-format frames
struct FrameState {
    events: EventState,
    builder: Box<dyn StreamEventBuilder>,
    pending: VecDeque<SseFrame>,
}

impl FrameState {
    async fn next(mut self) -> Option<(Result<SseFrame, BridgeError>, Self)> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some((Ok(frame), self));
            }

            match self.events.next_batch().await {
                Some(Ok(events)) => {
                    for event in &events {
                        self.pending.extend(without_done(self.builder.process(event)));
                    }
                    if self.events.finished {
                        self.pending.extend(without_done(self.builder.finalize()));
                    }
                }
                Some(Err(e)) => {
                    self.events.bridge.report_error(&e).await;
                    return Some((Err(e), self));
                }
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use indoc::indoc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::{StreamingResponse, TransportResponse};
    use crate::registry::Provider;

    /// Transport that counts calls and fails them all
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, _request: &HttpRequest) -> Result<TransportResponse, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BridgeError::Network("unreachable".to_owned()))
        }

        async fn send_streaming(&self, _request: &HttpRequest) -> Result<StreamingResponse, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BridgeError::Network("unreachable".to_owned()))
        }
    }

    /// Transport replaying one SSE body in fixed chunks
    struct ChunkedTransport {
        chunks: Vec<String>,
    }

    #[async_trait]
    impl Transport for ChunkedTransport {
        async fn send(&self, _request: &HttpRequest) -> Result<TransportResponse, BridgeError> {
            unimplemented!("streaming only")
        }

        async fn send_streaming(&self, _request: &HttpRequest) -> Result<StreamingResponse, BridgeError> {
            let chunks: Vec<Result<String, BridgeError>> = self.chunks.iter().cloned().map(Ok).collect();
            Ok(StreamingResponse {
                status: 200,
                body: Box::pin(futures_util::stream::iter(chunks)),
            })
        }
    }

    #[derive(Default)]
    struct RecordingHooks {
        errors: Mutex<Vec<ErrorIr>>,
        events: AtomicUsize,
    }

    #[async_trait]
    impl BridgeHooks for RecordingHooks {
        async fn on_stream_event(&self, _event: &StreamEvent) -> anyhow::Result<()> {
            self.events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_error(&self, error: &ErrorIr) -> anyhow::Result<()> {
            self.errors.lock().unwrap().push(error.clone());
            Ok(())
        }
    }

    fn bridge(inbound: Provider, outbound: Provider) -> BridgeBuilder {
        Bridge::builder(inbound.adapter(), outbound.adapter(), BridgeConfig::new("sk-test"))
    }

    #[test]
    fn model_mapping_priority() {
        let mapping = HashMap::from([("gpt-4o".to_owned(), "claude-sonnet-4-5".to_owned())]);

        let all = bridge(Provider::OpenAi, Provider::Anthropic)
            .target_model("claude-opus-4-1")
            .model_mapper(|m| format!("mapped-{m}"))
            .model_mapping(mapping.clone())
            .build();
        assert_eq!(all.map_model(Some("gpt-4o".to_owned())).as_deref(), Some("claude-opus-4-1"));

        let mapper = bridge(Provider::OpenAi, Provider::Anthropic)
            .model_mapper(|m| format!("mapped-{m}"))
            .model_mapping(mapping.clone())
            .build();
        assert_eq!(mapper.map_model(Some("gpt-4o".to_owned())).as_deref(), Some("mapped-gpt-4o"));

        let table = bridge(Provider::OpenAi, Provider::Anthropic).model_mapping(mapping).build();
        assert_eq!(table.map_model(Some("gpt-4o".to_owned())).as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(table.map_model(Some("o3".to_owned())).as_deref(), Some("o3"));

        let plain = bridge(Provider::OpenAi, Provider::Anthropic).build();
        assert_eq!(plain.map_model(Some("gpt-4o".to_owned())).as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn capability_gate_blocks_before_dispatch() {
        let transport = Arc::new(CountingTransport::default());
        let hooks = Arc::new(RecordingHooks::default());
        let bridge = bridge(Provider::OpenAi, Provider::DeepSeek)
            .transport(transport.clone())
            .hooks(hooks.clone())
            .build();

        let error = bridge
            .chat(json!({
                "model": "deepseek-chat",
                "messages": [{"role": "user", "content": [
                    {"type": "text", "text": "what is this?"},
                    {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
                ]}]
            }))
            .await
            .unwrap_err();

        assert!(matches!(error, BridgeError::Validation(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.errors.lock().unwrap()[0].error_type, crate::ir::ErrorType::Validation);
    }

    #[tokio::test]
    async fn inbound_parse_errors_skip_error_hook() {
        let hooks = Arc::new(RecordingHooks::default());
        let bridge = bridge(Provider::Anthropic, Provider::OpenAi).hooks(hooks.clone()).build();

        let error = bridge.chat(json!({"messages": "not a list"})).await.unwrap_err();

        assert!(matches!(error, BridgeError::Adapter(_)));
        assert!(hooks.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn openai_caller_reaches_anthropic_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-haiku-4-5-20251001",
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "content": [{"type": "text", "text": "Hello"}],
                "model": "claude-haiku-4-5-20251001",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 5, "output_tokens": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = BridgeConfig {
            base_url: Some(format!("{}/v1", server.uri())),
            ..BridgeConfig::new("sk-test")
        };
        let bridge = Bridge::builder(Provider::OpenAi.adapter(), Provider::Anthropic.adapter(), config)
            .model_mapping(HashMap::from([("gpt-4".to_owned(), "claude-haiku-4-5-20251001".to_owned())]))
            .build();

        let response = bridge
            .chat(json!({"model": "gpt-4", "messages": [{"role": "user", "content": "Hi"}]}))
            .await
            .unwrap();

        assert_eq!(response["object"], "chat.completion");
        assert_eq!(response["choices"][0]["message"]["content"], "Hello");
        assert_eq!(response["choices"][0]["finish_reason"], "stop");
        assert_eq!(response["usage"]["prompt_tokens"], 5);
        assert_eq!(response["usage"]["completion_tokens"], 3);
    }

    #[tokio::test]
    async fn list_models_uses_configured_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/catalog"))
            .and(header("x-api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"type": "model", "id": "claude-haiku-4-5-20251001"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = BridgeConfig {
            base_url: Some(format!("{}/v1", server.uri())),
            models_path: Some("/catalog".to_owned()),
            ..BridgeConfig::new("sk-test")
        };
        let bridge = Bridge::builder(Provider::OpenAi.adapter(), Provider::Anthropic.adapter(), config).build();

        let listing = bridge.list_models().await.unwrap();

        assert_eq!(listing["data"][0]["id"], "claude-haiku-4-5-20251001");
    }

    #[tokio::test]
    async fn upstream_error_is_described_by_outbound_adapter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let hooks = Arc::new(RecordingHooks::default());
        let config = BridgeConfig {
            base_url: Some(server.uri()),
            ..BridgeConfig::new("sk-bad")
        };
        let bridge = Bridge::builder(Provider::OpenAi.adapter(), Provider::Anthropic.adapter(), config)
            .hooks(hooks.clone())
            .build();

        let error = bridge
            .chat(json!({"model": "claude", "messages": [{"role": "user", "content": "Hi"}]}))
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(401));
        let reported = hooks.errors.lock().unwrap();
        assert_eq!(reported[0].code.as_deref(), Some("authentication_error"));
        assert_eq!(reported[0].error_type, crate::ir::ErrorType::Authentication);
    }

    #[tokio::test]
    async fn anthropic_stream_reframed_for_openai_caller() {
        let body = indoc! {r#"
            event: message_start
            data: {"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[],"model":"claude","usage":{"input_tokens":5,"output_tokens":0}}}

            event: content_block_start
            data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}

            event: content_block_delta
            data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}

            event: content_block_delta
            data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}

            event: content_block_stop
            data: {"type":"content_block_stop","index":0}

            event: message_delta
            data: {"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":2}}

            event: message_stop
            data: {"type":"message_stop"}

        "#};
        // Split mid-line to exercise reassembly
        let (head, tail) = body.split_at(body.len() / 2);

        let hooks = Arc::new(RecordingHooks::default());
        let bridge = bridge(Provider::OpenAi, Provider::Anthropic)
            .transport(Arc::new(ChunkedTransport {
                chunks: vec![head.to_owned(), tail.to_owned()],
            }))
            .hooks(hooks.clone())
            .build();

        let frames: Vec<SseFrame> = bridge
            .chat_stream(json!({"model": "claude", "stream": true, "messages": [{"role": "user", "content": "Hi"}]}))
            .await
            .unwrap()
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert!(frames.iter().all(|f| !f.is_done()));
        let text: String = frames
            .iter()
            .filter_map(|f| f.data["choices"][0]["delta"]["content"].as_str())
            .collect();
        assert_eq!(text, "Hello");
        let last = frames.last().unwrap();
        assert_eq!(last.data["choices"][0]["finish_reason"], "stop");
        assert!(hooks.events.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn aggregated_call_folds_stream() {
        let bridge = bridge(Provider::OpenAi, Provider::OpenAi)
            .transport(Arc::new(ChunkedTransport {
                chunks: vec![
                    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"4\"},\"finish_reason\":null}]}\n\n".to_owned(),
                    "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":1,\"model\":\"gpt\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n".to_owned(),
                ],
            }))
            .build();

        let response = bridge
            .chat_aggregated(json!({"model": "gpt", "messages": [{"role": "user", "content": "2+2"}]}))
            .await
            .unwrap();

        assert_eq!(response["choices"][0]["message"]["content"], "4");
        assert_eq!(response["choices"][0]["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn empty_stream_is_an_empty_response() {
        let bridge = bridge(Provider::OpenAi, Provider::OpenAi)
            .transport(Arc::new(ChunkedTransport {
                chunks: vec!["data: [DONE]\n\n".to_owned()],
            }))
            .build();

        let error = bridge
            .chat_aggregated(json!({"model": "gpt", "messages": [{"role": "user", "content": "hi"}]}))
            .await
            .unwrap_err();
        assert!(matches!(error, BridgeError::EmptyResponse));
    }

    #[tokio::test]
    async fn zero_output_with_usage_is_a_valid_completion() {
        let bridge = bridge(Provider::OpenAi, Provider::OpenAi)
            .transport(Arc::new(ChunkedTransport {
                chunks: vec![
                    "data: {\"id\":\"c1\",\"model\":\"gpt\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n".to_owned(),
                    "data: {\"id\":\"c1\",\"model\":\"gpt\",\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":0,\"total_tokens\":4}}\n\n".to_owned(),
                    "data: [DONE]\n\n".to_owned(),
                ],
            }))
            .build();

        let response = bridge
            .chat_aggregated(json!({"model": "gpt", "messages": [{"role": "user", "content": "hi"}]}))
            .await
            .unwrap();
        assert_eq!(response["usage"]["prompt_tokens"], 4);
        assert_eq!(response["usage"]["completion_tokens"], 0);
    }

    #[test]
    fn url_substitutes_model_and_prefers_stream_path() {
        let bridge = bridge(Provider::OpenAi, Provider::Gemini).build();
        assert_eq!(
            bridge.url(Some("gemini-2.5-pro"), true),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
        );

        let overridden = Bridge::builder(
            Provider::OpenAi.adapter(),
            Provider::Gemini.adapter(),
            BridgeConfig {
                base_url: Some("http://proxy/".to_owned()),
                chat_path: Some("/custom".to_owned()),
                ..BridgeConfig::default()
            },
        )
        .build();
        assert_eq!(overridden.url(Some("m"), true), "http://proxy/custom");
        assert!(overridden.headers(false).is_empty());
    }

    #[test]
    fn compatibility_is_advisory() {
        let report = bridge(Provider::OpenAi, Provider::DeepSeek).build().check_compatibility();
        assert!(report.is_compatible());
        assert_eq!(report.warnings.len(), 1);
    }
}
