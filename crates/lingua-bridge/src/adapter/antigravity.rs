//! Antigravity: Gemini requests inside the Cloud Code `v1internal` envelope

use serde_json::{Value, json};

use super::{Adapter, AdapterEndpoint, AdapterInfo, AuthScheme, GeminiAdapter};
use crate::convert::gemini::GeminiStreamParser;
use crate::error::AdapterError;
use crate::ir::{ErrorIr, LlmRequest, LlmResponse, StreamEvent};
use crate::stream::{GeminiStreamBuilder, SseFrame, StreamEventBuilder, StreamParser};

const ENDPOINT: AdapterEndpoint = AdapterEndpoint {
    base_url: "https://cloudcode-pa.googleapis.com",
    chat_path: "/v1internal:generateContent",
    stream_path: Some("/v1internal:streamGenerateContent?alt=sse"),
    models_path: "/v1internal:fetchAvailableModels",
    auth: AuthScheme::BEARER,
    headers: &[],
};

/// Take the payload out of a `{response: ...}` wrapper, if present
fn unwrap_response(wire: Value) -> Value {
    match wire {
        Value::Object(mut map) if map.contains_key("response") => map.remove("response").unwrap_or_default(),
        other => other,
    }
}

/// Adapter for the Antigravity backend
///
/// Everything inside the envelope is plain Gemini, so conversion is
/// delegated to [`GeminiAdapter`].
#[derive(Debug, Clone, Default)]
pub struct AntigravityAdapter {
    gemini: GeminiAdapter,
    project: Option<String>,
}

impl AntigravityAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter that sends requests on behalf of a Cloud Code project
    pub fn with_project(project: impl Into<String>) -> Self {
        Self {
            gemini: GeminiAdapter::new(),
            project: Some(project.into()),
        }
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }
}

impl Adapter for AntigravityAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "antigravity",
            endpoint: ENDPOINT,
            ..self.gemini.info()
        }
    }

    fn parse_request(&self, mut wire: Value) -> Result<LlmRequest, AdapterError> {
        let raw = wire.clone();
        let envelope = wire.as_object_mut();
        let model = envelope.as_ref().and_then(|map| map.get("model")).cloned();
        let inner = envelope.and_then(|map| map.remove("request"));

        let mut body = inner.unwrap_or(wire);
        if let (Some(model), Value::Object(map)) = (model, &mut body) {
            map.entry("model").or_insert(model);
        }

        let mut ir = self.gemini.parse_request(body)?;
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn parse_response(&self, wire: Value) -> Result<LlmResponse, AdapterError> {
        let raw = wire.clone();
        let mut ir = self.gemini.parse_response(unwrap_response(wire))?;
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn create_stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(EnvelopeStreamParser::default())
    }

    fn parse_error(&self, wire: &Value, status: Option<u16>) -> ErrorIr {
        self.gemini.parse_error(wire, status)
    }

    fn build_request(&self, request: &LlmRequest) -> Result<Value, AdapterError> {
        let inner = self.gemini.build_request(request)?;
        Ok(json!({
            "project": self.project.clone().unwrap_or_default(),
            "requestId": format!("agent-{}", uuid::Uuid::new_v4()),
            "request": inner,
            "model": request.model.clone().unwrap_or_default(),
            "userAgent": "antigravity",
            "requestType": "agent",
        }))
    }

    fn build_response(&self, response: &LlmResponse) -> Result<Value, AdapterError> {
        Ok(json!({"response": self.gemini.build_response(response)?}))
    }

    fn create_stream_builder(&self) -> Box<dyn StreamEventBuilder> {
        Box::new(EnvelopeStreamBuilder::default())
    }

    fn validate_request(&self, request: &LlmRequest) -> Result<(), String> {
        self.gemini.validate_request(request)
    }
}

/// Gemini chunk parsing behind the `response` wrapper
#[derive(Debug, Default)]
struct EnvelopeStreamParser {
    inner: GeminiStreamParser,
}

impl StreamParser for EnvelopeStreamParser {
    fn parse(&mut self, chunk: &Value) -> Result<Vec<StreamEvent>, AdapterError> {
        match chunk.get("response") {
            Some(inner) => self.inner.parse(inner),
            None => self.inner.parse(chunk),
        }
    }
}

/// Gemini frames wrapped as `{response: ...}`; error frames stay bare
#[derive(Debug, Default)]
struct EnvelopeStreamBuilder {
    inner: GeminiStreamBuilder,
}

impl EnvelopeStreamBuilder {
    fn wrap(frames: Vec<SseFrame>) -> Vec<SseFrame> {
        frames
            .into_iter()
            .map(|frame| {
                if frame.data.get("error").is_some() {
                    frame
                } else {
                    SseFrame::data(&json!({"response": frame.data}))
                }
            })
            .collect()
    }
}

impl StreamEventBuilder for EnvelopeStreamBuilder {
    fn process(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        Self::wrap(self.inner.process(event))
    }

    fn finalize(&mut self) -> Vec<SseFrame> {
        Self::wrap(self.inner.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Message, StreamEventKind};

    #[test]
    fn request_is_enveloped() {
        let adapter = AntigravityAdapter::with_project("proj-42");
        let ir = LlmRequest {
            model: Some("gemini-3-pro".to_owned()),
            messages: vec![Message::user("hi")],
            ..LlmRequest::default()
        };

        let wire = adapter.build_request(&ir).unwrap();

        assert_eq!(wire["project"], "proj-42");
        assert_eq!(wire["model"], "gemini-3-pro");
        assert_eq!(wire["userAgent"], "antigravity");
        assert_eq!(wire["requestType"], "agent");
        assert!(wire["requestId"].as_str().unwrap().starts_with("agent-"));
        assert_eq!(wire["request"]["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn envelope_request_parses() {
        let ir = AntigravityAdapter::new()
            .parse_request(json!({
                "project": "p",
                "model": "gemini-3-pro",
                "request": {"contents": [{"role": "user", "parts": [{"text": "hi"}]}]}
            }))
            .unwrap();
        assert_eq!(ir.model.as_deref(), Some("gemini-3-pro"));
        assert_eq!(ir.messages, vec![Message::user("hi")]);
    }

    #[test]
    fn envelope_request_round_trip() {
        let adapter = AntigravityAdapter::with_project("proj-42");
        let ir = adapter
            .parse_request(json!({
                "project": "proj-42",
                "model": "gemini-3-pro",
                "request": {
                    "systemInstruction": {"parts": [{"text": "Be brief."}]},
                    "contents": [
                        {"role": "user", "parts": [{"text": "look it up"}]},
                        {"role": "model", "parts": [{"functionCall": {"name": "lookup", "args": {"q": "rust"}}}]},
                        {"role": "user", "parts": [{"functionResponse": {"name": "lookup", "response": {"result": "found"}}}]}
                    ],
                    "tools": [{"functionDeclarations": [{"name": "lookup", "parameters": {"type": "object"}}]}],
                    "generationConfig": {"temperature": 0.2, "maxOutputTokens": 64}
                }
            }))
            .unwrap();

        let again = adapter.parse_request(adapter.build_request(&ir).unwrap()).unwrap();

        assert_eq!(again.model.as_deref(), Some("gemini-3-pro"));
        assert_eq!(again.system.as_deref(), Some("Be brief."));
        assert_eq!(again.messages, ir.messages);
        assert_eq!(again.messages[2].tool_call_id.as_deref(), Some("call_lookup_0"));
        assert_eq!(again.tools, ir.tools);
        assert_eq!(again.generation, ir.generation);
        assert_eq!(again.generation.max_tokens, Some(64));
    }

    #[test]
    fn responses_and_chunks_are_unwrapped() {
        let adapter = AntigravityAdapter::new();
        let body = json!({"response": {
            "candidates": [{"content": {"role": "model", "parts": [{"text": "ok"}]}, "finishReason": "STOP"}],
            "responseId": "r-9"
        }});

        let ir = adapter.parse_response(body.clone()).unwrap();
        assert_eq!(ir.id, "r-9");
        assert_eq!(ir.first_message().unwrap().content.as_text(), "ok");

        let events = adapter.create_stream_parser().parse(&body).unwrap();
        assert_eq!(events[0].kind, StreamEventKind::Start);
        assert!(matches!(&events[1].kind, StreamEventKind::Content { delta, .. } if delta == "ok"));
    }

    #[test]
    fn stream_frames_are_wrapped() {
        let mut builder = AntigravityAdapter::new().create_stream_builder();
        let frames = builder.process(&StreamEvent::content("x"));
        assert_eq!(frames[0].data["response"]["candidates"][0]["content"]["parts"][0]["text"], "x");
    }
}
