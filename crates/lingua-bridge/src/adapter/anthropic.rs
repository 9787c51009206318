//! Anthropic Messages API

use serde_json::Value;

use super::{
    Adapter, AdapterCapabilities, AdapterEndpoint, AdapterInfo, AuthScheme, from_wire, require_messages, to_wire,
};
use crate::convert::anthropic as convert;
use crate::error::AdapterError;
use crate::ir::{ErrorIr, LlmRequest, LlmResponse, Role};
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::stream::{AnthropicStreamBuilder, StreamEventBuilder, StreamParser};

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const ENDPOINT: AdapterEndpoint = AdapterEndpoint {
    base_url: "https://api.anthropic.com/v1",
    chat_path: "/messages",
    stream_path: None,
    models_path: "/models",
    auth: AuthScheme {
        header: "x-api-key",
        prefix: "",
    },
    headers: &[("anthropic-version", ANTHROPIC_VERSION)],
};

const CAPABILITIES: AdapterCapabilities = AdapterCapabilities {
    streaming: true,
    tools: true,
    vision: true,
    multimodal: true,
    system_prompt: true,
    tool_choice: true,
    reasoning: true,
    web_search: true,
    json_mode: false,
    logprobs: false,
    seed: false,
};

/// Adapter for the Messages API
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    pub const fn new() -> Self {
        Self
    }
}

impl Adapter for AnthropicAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: convert::TAG,
            version: "1.0.0",
            capabilities: CAPABILITIES,
            endpoint: ENDPOINT,
        }
    }

    fn parse_request(&self, wire: Value) -> Result<LlmRequest, AdapterError> {
        let raw = wire.clone();
        let req: AnthropicRequest = from_wire("messages request", wire)?;
        let mut ir = convert::request_to_ir(req);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn parse_response(&self, wire: Value) -> Result<LlmResponse, AdapterError> {
        let raw = wire.clone();
        let resp: AnthropicResponse = from_wire("messages response", wire)?;
        let mut ir = convert::response_to_ir(resp);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn create_stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(convert::AnthropicStreamParser::new())
    }

    fn opens_stream(&self, chunk: &Value) -> bool {
        chunk.get("type").and_then(Value::as_str) == Some("message_start")
    }

    fn parse_error(&self, wire: &Value, status: Option<u16>) -> ErrorIr {
        convert::parse_error_body(wire, status)
    }

    fn build_request(&self, request: &LlmRequest) -> Result<Value, AdapterError> {
        to_wire("messages request", &convert::ir_to_request(request))
    }

    fn build_response(&self, response: &LlmResponse) -> Result<Value, AdapterError> {
        to_wire("messages response", &convert::ir_to_response(response))
    }

    fn create_stream_builder(&self) -> Box<dyn StreamEventBuilder> {
        Box::new(AnthropicStreamBuilder::new())
    }

    fn validate_request(&self, request: &LlmRequest) -> Result<(), String> {
        require_messages(request)?;
        if request.messages.iter().all(|m| m.role == Role::System) {
            return Err("at least one non-system message is required".to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ir::{Message, ThinkingConfig};

    #[test]
    fn build_request_fills_required_fields() {
        let adapter = AnthropicAdapter::new();
        let mut ir = LlmRequest {
            model: Some("claude-sonnet-4-5".to_owned()),
            system: Some("Be brief.".to_owned()),
            messages: vec![Message::user("hi")],
            ..LlmRequest::default()
        };
        ir.generation.thinking = Some(ThinkingConfig::enabled());

        let wire = adapter.build_request(&ir).unwrap();

        assert_eq!(wire["system"], "Be brief.");
        assert_eq!(wire["messages"][0], json!({"role": "user", "content": "hi"}));
        assert_eq!(wire["thinking"]["type"], "enabled");
        assert_eq!(wire["thinking"]["budget_tokens"], 1024);
        assert!(wire["max_tokens"].as_u64().unwrap() > 1024);
    }

    #[test]
    fn unknown_fields_survive_in_extensions() {
        let adapter = AnthropicAdapter::new();
        let ir = adapter
            .parse_request(json!({
                "model": "claude",
                "max_tokens": 10,
                "messages": [{"role": "user", "content": "hi"}],
                "service_tier": "auto"
            }))
            .unwrap();

        assert_eq!(ir.extensions.field("anthropic", "service_tier"), Some(&json!("auto")));
        let wire = adapter.build_request(&ir).unwrap();
        assert_eq!(wire["service_tier"], "auto");
    }

    #[test]
    fn system_only_request_is_rejected() {
        let adapter = AnthropicAdapter::new();
        let ir = LlmRequest {
            messages: vec![Message::text(Role::System, "only rules")],
            ..LlmRequest::default()
        };
        assert!(adapter.validate_request(&ir).is_err());
    }

    #[test]
    fn endpoint_uses_api_key_header() {
        let endpoint = AnthropicAdapter::new().info().endpoint;
        assert_eq!(endpoint.auth.header, "x-api-key");
        assert_eq!(endpoint.headers, &[("anthropic-version", "2023-06-01")]);
    }
}
