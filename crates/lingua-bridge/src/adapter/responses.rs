//! `OpenAI` Responses API and the `ChatGPT` Codex backend

use serde_json::Value;

use super::{
    Adapter, AdapterCapabilities, AdapterEndpoint, AdapterInfo, AuthScheme, from_wire, require_messages, to_wire,
};
use crate::convert::responses as convert;
use crate::error::AdapterError;
use crate::ir::{ErrorIr, LlmRequest, LlmResponse};
use crate::protocol::responses::{ResponsesRequest, ResponsesResponse};
use crate::stream::{ResponsesStreamBuilder, StreamEventBuilder, StreamParser};

/// Which Responses deployment an adapter talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponsesFlavor {
    /// Public Responses API
    #[default]
    Standard,
    /// `ChatGPT` Codex backend: always streams, never stores, ignores
    /// sampling parameters and requires `instructions`
    Codex,
}

impl ResponsesFlavor {
    const fn name(self) -> &'static str {
        match self {
            Self::Standard => "openai_responses",
            Self::Codex => "codex",
        }
    }

    const fn endpoint(self) -> AdapterEndpoint {
        match self {
            Self::Standard => AdapterEndpoint {
                base_url: "https://api.openai.com/v1",
                chat_path: "/responses",
                stream_path: None,
                models_path: "/models",
                auth: AuthScheme::BEARER,
                headers: &[],
            },
            Self::Codex => AdapterEndpoint {
                base_url: "https://chatgpt.com/backend-api/codex",
                chat_path: "/responses",
                stream_path: None,
                models_path: "/models",
                auth: AuthScheme::BEARER,
                headers: &[("openai-beta", "responses=experimental"), ("originator", "codex_cli_rs")],
            },
        }
    }
}

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
    seed: false,
};

/// Adapter for the Responses format
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsesAdapter {
    flavor: ResponsesFlavor,
}

impl ResponsesAdapter {
    pub const fn new(flavor: ResponsesFlavor) -> Self {
        Self { flavor }
    }

    pub const fn codex() -> Self {
        Self::new(ResponsesFlavor::Codex)
    }

    pub const fn flavor(&self) -> ResponsesFlavor {
        self.flavor
    }
}

impl Adapter for ResponsesAdapter {
    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.flavor.name(),
            version: "1.0.0",
            capabilities: CAPABILITIES,
            endpoint: self.flavor.endpoint(),
        }
    }

    fn parse_request(&self, wire: Value) -> Result<LlmRequest, AdapterError> {
        let raw = wire.clone();
        let req: ResponsesRequest = from_wire("responses request", wire)?;
        let mut ir = convert::request_to_ir(req);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn parse_response(&self, wire: Value) -> Result<LlmResponse, AdapterError> {
        let raw = wire.clone();
        let resp: ResponsesResponse = from_wire("responses response", wire)?;
        let mut ir = convert::response_to_ir(resp);
        ir.raw = Some(raw);
        Ok(ir)
    }

    fn create_stream_parser(&self) -> Box<dyn StreamParser> {
        Box::new(convert::ResponsesStreamParser::new())
    }

    fn opens_stream(&self, chunk: &Value) -> bool {
        matches!(
            chunk.get("type").and_then(Value::as_str),
            Some("response.created" | "response.in_progress")
        )
    }

    fn parse_error(&self, wire: &Value, status: Option<u16>) -> ErrorIr {
        convert::parse_error_body(wire, status)
    }

    fn build_request(&self, request: &LlmRequest) -> Result<Value, AdapterError> {
        to_wire("responses request", &convert::ir_to_request(request, self.flavor))
    }

    fn build_response(&self, response: &LlmResponse) -> Result<Value, AdapterError> {
        to_wire("responses response", &convert::ir_to_response(response))
    }

    fn create_stream_builder(&self) -> Box<dyn StreamEventBuilder> {
        Box::new(ResponsesStreamBuilder::new())
    }

    fn validate_request(&self, request: &LlmRequest) -> Result<(), String> {
        require_messages(request)
    }
}
