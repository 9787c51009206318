//! Provider adapters
//!
//! Each adapter converts one wire format to and from the IR. The bridge
//! pairs the inbound side of one adapter with the outbound side of another.

pub mod anthropic;
pub mod antigravity;
pub mod gemini;
pub mod openai;
pub mod responses;

use serde_json::Value;

use crate::error::AdapterError;
use crate::ir::{ErrorIr, LlmRequest, LlmResponse, StreamEvent, StreamEventKind};
use crate::stream::{StreamEventBuilder, StreamParser};

pub use anthropic::AnthropicAdapter;
pub use antigravity::AntigravityAdapter;
pub use gemini::GeminiAdapter;
pub use openai::{Dialect, OpenAiAdapter};
pub use responses::{ResponsesAdapter, ResponsesFlavor};

/// Static feature flags of a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct AdapterCapabilities {
    pub streaming: bool,
    pub tools: bool,
    pub vision: bool,
    pub multimodal: bool,
    pub system_prompt: bool,
    pub tool_choice: bool,
    pub reasoning: bool,
    pub web_search: bool,
    pub json_mode: bool,
    pub logprobs: bool,
    pub seed: bool,
}

/// How the API key is presented upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthScheme {
    /// Header carrying the key
    pub header: &'static str,
    /// Prefix placed before the key
    pub prefix: &'static str,
}

impl AuthScheme {
    pub const BEARER: Self = Self {
        header: "authorization",
        prefix: "Bearer ",
    };
}

/// Default upstream location of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterEndpoint {
    pub base_url: &'static str,
    /// Path for completions; may contain a `{model}` placeholder
    pub chat_path: &'static str,
    /// Path for streaming completions when it differs from `chat_path`
    pub stream_path: Option<&'static str>,
    pub models_path: &'static str,
    pub auth: AuthScheme,
    /// Headers sent with every request
    pub headers: &'static [(&'static str, &'static str)],
}

/// Identity and static description of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub capabilities: AdapterCapabilities,
    pub endpoint: AdapterEndpoint,
}

/// Conversion between one provider wire format and the IR
pub trait Adapter: Send + Sync {
    fn info(&self) -> AdapterInfo;

    fn capabilities(&self) -> AdapterCapabilities {
        self.info().capabilities
    }

    /// Lift an inbound wire request into the IR
    fn parse_request(&self, wire: Value) -> Result<LlmRequest, AdapterError>;

    /// Lift a provider response into the IR
    fn parse_response(&self, _wire: Value) -> Result<LlmResponse, AdapterError> {
        Err(AdapterError::Unsupported {
            adapter: self.info().name,
            operation: "response parsing",
        })
    }

    /// Convert a single stream chunk without cross-chunk state
    ///
    /// A chunk carrying a finish reason yields `End` right away, and `Start`
    /// only appears for the provider's own stream-opening event. An empty
    /// vector means the chunk carried nothing of interest.
    fn parse_stream(&self, chunk: &Value) -> Result<Vec<StreamEvent>, AdapterError> {
        let mut parser = self.create_stream_parser();
        let mut events = parser.parse(chunk)?;
        events.extend(parser.finish());
        if !self.opens_stream(chunk) {
            events.retain(|event| event.kind != StreamEventKind::Start);
        }
        Ok(events)
    }

    /// Whether a chunk is the event that opens a stream in this format
    fn opens_stream(&self, _chunk: &Value) -> bool {
        false
    }

    /// Per-stream parser that keeps state across chunks
    fn create_stream_parser(&self) -> Box<dyn StreamParser>;

    /// Describe an error body returned by the provider
    fn parse_error(&self, wire: &Value, status: Option<u16>) -> ErrorIr;

    /// Lower the IR into an outbound wire request
    fn build_request(&self, request: &LlmRequest) -> Result<Value, AdapterError>;

    /// Lower an IR response into this format for an inbound caller
    fn build_response(&self, _response: &LlmResponse) -> Result<Value, AdapterError> {
        Err(AdapterError::Unsupported {
            adapter: self.info().name,
            operation: "response building",
        })
    }

    /// Per-stream builder turning IR events into this format's SSE frames
    fn create_stream_builder(&self) -> Box<dyn StreamEventBuilder>;

    /// Reject requests this format cannot express
    fn validate_request(&self, _request: &LlmRequest) -> Result<(), String> {
        Ok(())
    }
}

/// Shared check: a request needs at least one message
pub(crate) fn require_messages(request: &LlmRequest) -> Result<(), String> {
    if request.messages.is_empty() {
        return Err("messages must not be empty".to_owned());
    }
    Ok(())
}

/// Parse a wire value into a protocol type
pub(crate) fn from_wire<T: serde::de::DeserializeOwned>(format: &'static str, wire: Value) -> Result<T, AdapterError> {
    serde_json::from_value(wire).map_err(AdapterError::deserialize(format))
}

/// Serialize a protocol type into a wire value
pub(crate) fn to_wire<T: serde::Serialize>(format: &'static str, value: &T) -> Result<Value, AdapterError> {
    serde_json::to_value(value).map_err(AdapterError::serialize(format))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ir::FinishReason;
    use crate::registry::Provider;

    fn kinds(provider: Provider, chunk: &Value) -> Vec<StreamEventKind> {
        provider
            .adapter()
            .parse_stream(chunk)
            .unwrap()
            .into_iter()
            .map(|event| event.kind)
            .collect()
    }

    fn text(delta: &str) -> StreamEventKind {
        StreamEventKind::Content {
            delta: delta.to_owned(),
            index: 0,
        }
    }

    fn is_stop(kind: &StreamEventKind) -> bool {
        matches!(
            kind,
            StreamEventKind::End {
                finish_reason: Some(FinishReason::Stop),
                ..
            }
        )
    }

    #[test]
    fn openai_chunks_convert_alone() {
        let content = kinds(Provider::OpenAi, &json!({"choices": [{"delta": {"content": "Hi"}}]}));
        assert_eq!(content, vec![text("Hi")]);

        let finish = kinds(Provider::OpenAi, &json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}));
        assert_eq!(
            finish,
            vec![StreamEventKind::End {
                finish_reason: Some(FinishReason::Stop),
                usage: None,
            }]
        );
    }

    #[test]
    fn anthropic_chunks_convert_alone() {
        let content = kinds(
            Provider::Anthropic,
            &json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
        );
        assert_eq!(content, vec![text("Hi")]);

        let finish = kinds(
            Provider::Anthropic,
            &json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 3}}),
        );
        assert_eq!(finish.len(), 1);
        assert!(is_stop(&finish[0]));

        let start = kinds(
            Provider::Anthropic,
            &json!({"type": "message_start", "message": {"id": "msg_1", "type": "message", "role": "assistant",
                    "model": "claude-sonnet-4", "content": [], "usage": {"input_tokens": 5, "output_tokens": 0}}}),
        );
        assert_eq!(start, vec![StreamEventKind::Start]);
    }

    #[test]
    fn responses_chunks_convert_alone() {
        let content = kinds(
            Provider::OpenAiResponses,
            &json!({"type": "response.output_text.delta", "delta": "Hi"}),
        );
        assert_eq!(content, vec![text("Hi")]);

        let finish = kinds(
            Provider::OpenAiResponses,
            &json!({"type": "response.completed",
                    "response": {"id": "resp_1", "model": "gpt-5", "status": "completed", "output": []}}),
        );
        assert_eq!(finish.len(), 1);
        assert!(is_stop(&finish[0]));

        let start = kinds(
            Provider::OpenAiResponses,
            &json!({"type": "response.created", "response": {"id": "resp_1", "model": "gpt-5"}}),
        );
        assert_eq!(start, vec![StreamEventKind::Start]);
    }

    #[test]
    fn gemini_chunks_convert_alone() {
        let content = json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hi"}]}}]});
        let finish = json!({"candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "STOP"}]});

        for provider in [Provider::Gemini, Provider::Antigravity] {
            let wrap = |chunk: &Value| {
                if provider == Provider::Antigravity {
                    json!({"response": chunk})
                } else {
                    chunk.clone()
                }
            };
            assert_eq!(kinds(provider, &wrap(&content)), vec![text("Hi")]);

            let end = kinds(provider, &wrap(&finish));
            assert_eq!(end.len(), 1, "{provider}");
            assert!(is_stop(&end[0]));
        }
    }
}
