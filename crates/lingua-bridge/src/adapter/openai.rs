//! `OpenAI` chat completions and compatible dialects

use serde_json::Value;

use super::{
    Adapter, AdapterCapabilities, AdapterEndpoint, AdapterInfo, AuthScheme, from_wire, require_messages, to_wire,
};
use crate::convert::openai as convert;
use crate::error::AdapterError;
use crate::ir::{ErrorIr, LlmRequest, LlmResponse};
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse};
use crate::stream::{OpenAiStreamBuilder, StreamEventBuilder, StreamParser};

/// Providers speaking the chat completion format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    OpenAi,
    DeepSeek,
    MiniMax,
    Zhipu,
}

/// Where a dialect keeps reasoning text on a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningField {
    None,
    /// `reasoning_content: "..."`
    Content,
    /// `reasoning_details: [{type: "thinking", text}]`
    Details,
}

impl Dialect {
    /// Provider tag used for extensions and adapter names
    pub const fn tag(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::MiniMax => "minimax",
            Self::Zhipu => "zhipu",
        }
    }

    /// Field used when sending conversation history upstream
    pub const fn request_reasoning(self) -> ReasoningField {
        match self {
            Self::OpenAi => ReasoningField::None,
            Self::DeepSeek | Self::Zhipu => ReasoningField::Content,
            Self::MiniMax => ReasoningField::Details,
        }
    }

    /// Field used when answering a caller in this dialect
    pub const fn response_reasoning(self) -> ReasoningField {
        match self {
            Self::OpenAi | Self::DeepSeek | Self::Zhipu => ReasoningField::Content,
            Self::MiniMax => ReasoningField::Details,
        }
    }

    /// `DeepSeek` reasoner models reject reasoning history and system prompts
    pub fn strips_reasoning(self, model: Option<&str>) -> bool {
        self == Self::DeepSeek && model.is_some_and(|m| m.contains("reasoner"))
    }

    const fn endpoint(self) -> AdapterEndpoint {
        let base_url = match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::MiniMax => "https://api.minimax.io/v1",
            Self::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
        };
        AdapterEndpoint {
            base_url,
            chat_path: "/chat/completions",
            stream_path: None,
            models_path: "/models",
            auth: AuthScheme::BEARER,
            headers: &[],
        }
    }

    const fn capabilities(self) -> AdapterCapabilities {
        let base = AdapterCapabilities {
            streaming: true,
            tools: true,
            vision: true,
            multimodal: true,
            system_prompt: true,
            tool_choice: true,
            reasoning: true,
            web_search: false,
            json_mode: true,
            logprobs: false,
            seed: false,
        };
        match self {
            Self::OpenAi => AdapterCapabilities {
                logprobs: true,
                seed: true,
                ..base
            },
            Self::DeepSeek => AdapterCapabilities {
                vision: false,
                multimodal: false,
                logprobs: true,
                ..base
            },
            Self::MiniMax => AdapterCapabilities {
                vision: false,
                multimodal: false,
                json_mode: false,
                ..base
            },
            Self::Zhipu => AdapterCapabilities {
                web_search: true,
                ..base
            },
        }
    }
}

/// Adapter for the chat completion format in a given dialect
#[derive(Debug, Clone, Copy)]
pub struct OpenAiAdapter {
    dialect: Dialect,
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new(Dialect::OpenAi)
    }
}

impl OpenAiAdapter {
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }
}

impl Adapter for OpenAiAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.dialect.tag(),
            version: "1.0.0",
            capabilities: self.dialect.capabilities(),
            endpoint: self.dialect.endpoint(),
        }
    }

    fn parse_request(&self, wire: Value) -> Result<LlmRequest, AdapterError> {
        let raw = wire.clone();
        let req: OpenAiRequest = from_wire("chat completion request", wire)?;
        let mut ir = convert::request_to_ir(req, self.dialect);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn parse_response(&self, wire: Value) -> Result<LlmResponse, AdapterError> {
        let raw = wire.clone();
        let resp: OpenAiResponse = from_wire("chat completion response", wire)?;
        let mut ir = convert::response_to_ir(resp);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn create_stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(convert::OpenAiStreamParser::new())
    }

    fn parse_error(&self, wire: &Value, status: Option<u16>) -> ErrorIr {
        convert::parse_error_body(wire, status)
    }

    fn build_request(&self, request: &LlmRequest) -> Result<Value, AdapterError> {
        to_wire("chat completion request", &convert::ir_to_request(request, self.dialect))
    }

    fn build_response(&self, response: &LlmResponse) -> Result<Value, AdapterError> {
        to_wire("chat completion response", &convert::ir_to_response(response, self.dialect))
    }

    fn create_stream_builder(&self) -> Box<dyn StreamEventBuilder> {
        Box::new(OpenAiStreamBuilder::new(self.dialect))
    }

    fn validate_request(&self, request: &LlmRequest) -> Result<(), String> {
        require_messages(request)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ir::{FinishReason, Role};

    #[test]
    fn parse_response_lifts_reasoning_and_usage() {
        let adapter = OpenAiAdapter::new(Dialect::DeepSeek);
        let ir = adapter
            .parse_response(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1_700_000_000,
                "model": "deepseek-reasoner",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "4", "reasoning_content": "2+2=4"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12, "prompt_cache_hit_tokens": 3}
            }))
            .unwrap();

        let message = ir.first_message().unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.reasoning_content.as_deref(), Some("2+2=4"));
        assert_eq!(ir.choices[0].finish_reason, Some(FinishReason::Stop));
        let usage = ir.usage.unwrap();
        assert_eq!(usage.total_tokens, 12);
        assert_eq!(usage.details.unwrap().cached_tokens, Some(3));
        assert!(ir.raw.is_some());
    }

    #[test]
    fn response_round_trip() {
        let adapter = OpenAiAdapter::default();
        let wire = json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_9", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":1}"}}
                ]},
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        });

        let ir = adapter.parse_response(wire.clone()).unwrap();
        let rebuilt = adapter.build_response(&ir).unwrap();

        assert_eq!(rebuilt["choices"], wire["choices"]);
        assert_eq!(rebuilt["usage"], wire["usage"]);
        assert_eq!(rebuilt["id"], "chatcmpl-2");
    }

    #[test]
    fn error_body_is_classified() {
        let adapter = OpenAiAdapter::default();
        let error = adapter.parse_error(
            &json!({"error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}}),
            None,
        );
        assert_eq!(error.error_type, crate::ir::ErrorType::RateLimit);
        assert_eq!(error.message, "Rate limit reached");
    }

    #[test]
    fn empty_messages_fail_validation() {
        let adapter = OpenAiAdapter::default();
        assert!(adapter.validate_request(&LlmRequest::default()).is_err());
    }
}
