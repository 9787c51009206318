//! Google Gemini `generateContent` API

use serde_json::Value;

use super::{
    Adapter, AdapterCapabilities, AdapterEndpoint, AdapterInfo, AuthScheme, from_wire, require_messages, to_wire,
};
use crate::convert::gemini as convert;
use crate::error::AdapterError;
use crate::ir::{ErrorIr, LlmRequest, LlmResponse};
use crate::protocol::gemini::{GeminiRequest, GeminiResponse};
use crate::stream::{GeminiStreamBuilder, StreamEventBuilder, StreamParser};

const ENDPOINT: AdapterEndpoint = AdapterEndpoint {
    base_url: "https://generativelanguage.googleapis.com/v1beta",
    chat_path: "/models/{model}:generateContent",
    stream_path: Some("/models/{model}:streamGenerateContent?alt=sse"),
    models_path: "/models",
    auth: AuthScheme {
        header: "x-goog-api-key",
        prefix: "",
    },
    headers: &[],
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
    json_mode: true,
    logprobs: false,
    seed: true,
};

/// Adapter for the Gemini API
///
/// The model lives in the URL, so inbound requests only carry one when the
/// caller put it in the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    pub const fn new() -> Self {
        Self
    }
}

impl Adapter for GeminiAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: convert::TAG,
            version: "1.0.0",
            capabilities: CAPABILITIES,
            endpoint: ENDPOINT,
        }
    }

    fn parse_request(&self, mut wire: Value) -> Result<LlmRequest, AdapterError> {
        let raw = wire.clone();
        let model = wire
            .as_object_mut()
            .and_then(|map| map.remove("model"))
            .and_then(|m| m.as_str().map(str::to_owned));
        let req: GeminiRequest = from_wire("gemini request", wire)?;
        let mut ir = convert::request_to_ir(req, model);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn parse_response(&self, wire: Value) -> Result<LlmResponse, AdapterError> {
        let raw = wire.clone();
        let resp: GeminiResponse = from_wire("gemini response", wire)?;
        let mut ir = convert::response_to_ir(resp);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn create_stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(convert::GeminiStreamParser::new())
    }

    fn parse_error(&self, wire: &Value, status: Option<u16>) -> ErrorIr {
        convert::parse_error_body(wire, status)
    }

    fn build_request(&self, request: &LlmRequest) -> Result<Value, AdapterError> {
        to_wire("gemini request", &convert::ir_to_request(request))
    }

    fn build_response(&self, response: &LlmResponse) -> Result<Value, AdapterError> {
        to_wire("gemini response", &convert::ir_to_response(response))
    }

    fn create_stream_builder(&self) -> Box<dyn StreamEventBuilder> {
        Box::new(GeminiStreamBuilder::new())
    }

    fn validate_request(&self, request: &LlmRequest) -> Result<(), String> {
        require_messages(request)
    }
}
