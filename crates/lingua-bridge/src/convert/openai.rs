//! Conversion between the IR and the `OpenAI` chat completion family
//!
//! One set of conversions serves every `OpenAI`-compatible dialect; the
//! [`Dialect`] decides where reasoning text lives and which quirks apply.

use serde_json::{Map, Value, json};

use crate::adapter::openai::{Dialect, ReasoningField};
use crate::error::AdapterError;
use crate::ir::{
    Choice, Content, ContentPart, Extensions, FinishReason, GenerationConfig, ImageSource, LlmRequest, LlmResponse,
    Message, ResponseFormat, Role, StreamEvent, ThinkingConfig, Tool, ToolCall, ToolCallDelta, ToolChoice, Usage,
    UsageDetails, unix_now,
};
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiCompletionTokensDetails, OpenAiContent, OpenAiContentPart,
    OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage, OpenAiPromptTokensDetails, OpenAiRequest,
    OpenAiResponse, OpenAiStop, OpenAiStreamChunk, OpenAiStreamOptions, OpenAiThinking, OpenAiTool, OpenAiToolCall,
    OpenAiUsage, ReasoningDetail,
};
use crate::stream::StreamParser;

// -- Inbound: OpenAI wire format -> IR --

/// Lift a chat completion request into the IR
pub fn request_to_ir(req: OpenAiRequest, dialect: Dialect) -> LlmRequest {
    let mut ir = LlmRequest {
        model: req.model,
        stream: req.stream.unwrap_or(false),
        tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
        tool_choice: req.tool_choice.as_ref().and_then(parse_tool_choice),
        generation: GenerationConfig {
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_tokens.or(req.max_completion_tokens),
            stop_sequences: req.stop.map(OpenAiStop::into_vec),
            response_format: req.response_format.as_ref().and_then(parse_response_format),
            thinking: parse_thinking(req.thinking.as_ref(), req.reasoning_effort),
            frequency_penalty: req.frequency_penalty,
            presence_penalty: req.presence_penalty,
            seed: req.seed,
            top_k: None,
        },
        ..LlmRequest::default()
    };

    for msg in req.messages {
        match msg.role.as_str() {
            "system" | "developer" => ir.push_system(&msg.content.map(content_text).unwrap_or_default()),
            _ => ir.messages.push(message_to_ir(msg)),
        }
    }

    if let Some(metadata) = req.metadata {
        ir.metadata = metadata;
    }
    if let Some(user) = req.user {
        ir.metadata.insert("user".to_owned(), Value::String(user));
    }
    ir.extensions.insert_fields(dialect.tag(), req.extra);
    ir
}

fn message_to_ir(msg: OpenAiMessage) -> Message {
    let role = match msg.role.as_str() {
        "assistant" => Role::Assistant,
        "tool" | "function" => Role::Tool,
        _ => Role::User,
    };

    let content = match msg.content {
        Some(OpenAiContent::Text(text)) => Content::Text(text),
        Some(OpenAiContent::Parts(parts)) => Content::Parts(parts.into_iter().map(Into::into).collect()),
        None => Content::default(),
    };

    Message {
        role,
        content,
        name: msg.name,
        tool_call_id: msg.tool_call_id,
        tool_calls: msg
            .tool_calls
            .map(|calls| calls.into_iter().map(Into::into).collect())
            .filter(|calls: &Vec<ToolCall>| !calls.is_empty()),
        reasoning_content: reasoning_text(msg.reasoning_content, msg.reasoning_details),
    }
}

/// Join reasoning from whichever field the provider used
fn reasoning_text(content: Option<String>, details: Option<Vec<ReasoningDetail>>) -> Option<String> {
    content.filter(|text| !text.is_empty()).or_else(|| {
        let details = details?;
        let joined = details
            .into_iter()
            .map(|d| d.text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        (!joined.is_empty()).then_some(joined)
    })
}

fn content_text(content: OpenAiContent) -> String {
    match content {
        OpenAiContent::Text(text) => text,
        OpenAiContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                OpenAiContentPart::Text { text } => Some(text),
                OpenAiContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

impl From<OpenAiContentPart> for ContentPart {
    fn from(part: OpenAiContentPart) -> Self {
        match part {
            OpenAiContentPart::Text { text } => Self::Text { text },
            OpenAiContentPart::ImageUrl { image_url } => Self::Image {
                source: ImageSource::from_url(&image_url.url),
            },
        }
    }
}

impl From<OpenAiTool> for Tool {
    fn from(tool: OpenAiTool) -> Self {
        Self::function(tool.function.name, tool.function.description, tool.function.parameters)
    }
}

impl From<OpenAiToolCall> for ToolCall {
    fn from(call: OpenAiToolCall) -> Self {
        Self::function(call.id, call.function.name, call.function.arguments)
    }
}

/// Parse a tool choice value: a mode string or a function selector
pub fn parse_tool_choice(value: &Value) -> Option<ToolChoice> {
    match value {
        Value::String(mode) => match mode.as_str() {
            "auto" => Some(ToolChoice::Auto),
            "none" => Some(ToolChoice::None),
            "required" | "any" => Some(ToolChoice::Required),
            _ => None,
        },
        Value::Object(obj) => obj
            .get("function")
            .and_then(|f| f.get("name"))
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str)
            .map(|name| ToolChoice::Function { name: name.to_owned() }),
        _ => None,
    }
}

/// Parse `response_format`
pub fn parse_response_format(value: &Value) -> Option<ResponseFormat> {
    match value.get("type")?.as_str()? {
        "text" => Some(ResponseFormat::Text),
        "json_object" => Some(ResponseFormat::JsonObject),
        "json_schema" => {
            let spec = value.get("json_schema").unwrap_or(value);
            Some(ResponseFormat::JsonSchema {
                name: spec.get("name").and_then(Value::as_str).unwrap_or("response").to_owned(),
                schema: spec.get("schema").cloned(),
                strict: spec.get("strict").and_then(Value::as_bool),
            })
        }
        _ => None,
    }
}

fn parse_thinking(switch: Option<&OpenAiThinking>, effort: Option<String>) -> Option<ThinkingConfig> {
    let enabled_by_switch = switch.map(|t| t.thinking_type == "enabled");
    if enabled_by_switch.is_none() && effort.is_none() {
        return None;
    }
    Some(ThinkingConfig {
        enabled: enabled_by_switch.unwrap_or_else(|| effort.as_deref() != Some("none")),
        budget_tokens: None,
        effort,
    })
}

/// Lift a chat completion response into the IR
pub fn response_to_ir(resp: OpenAiResponse) -> LlmResponse {
    LlmResponse {
        id: resp.id,
        model: resp.model,
        choices: resp.choices.into_iter().map(Into::into).collect(),
        usage: resp.usage.map(Into::into),
        created: (resp.created > 0).then_some(resp.created),
        system_fingerprint: resp.system_fingerprint,
        extensions: Extensions::default(),
        raw: None,
    }
}

impl From<OpenAiChoice> for Choice {
    fn from(choice: OpenAiChoice) -> Self {
        let message = choice.message;
        Self {
            index: choice.index,
            message: Message {
                role: Role::Assistant,
                content: Content::Text(message.content.unwrap_or_default()),
                name: None,
                tool_call_id: None,
                tool_calls: message
                    .tool_calls
                    .map(|calls| calls.into_iter().map(Into::into).collect())
                    .filter(|calls: &Vec<ToolCall>| !calls.is_empty()),
                reasoning_content: reasoning_text(message.reasoning_content, message.reasoning_details),
            },
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_openai),
            logprobs: choice.logprobs,
        }
    }
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        let details = UsageDetails {
            reasoning_tokens: usage.completion_tokens_details.and_then(|d| d.reasoning_tokens),
            cached_tokens: usage
                .prompt_tokens_details
                .and_then(|d| d.cached_tokens)
                .or(usage.prompt_cache_hit_tokens),
            ..UsageDetails::default()
        };
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: if usage.total_tokens > 0 {
                usage.total_tokens
            } else {
                usage.prompt_tokens.saturating_add(usage.completion_tokens)
            },
            details: None,
        }
        .with_details(details)
    }
}

// -- Outbound: IR -> OpenAI wire format --

/// Lower the IR into a chat completion request
pub fn ir_to_request(ir: &LlmRequest, dialect: Dialect) -> OpenAiRequest {
    let strip_reasoning = dialect.strips_reasoning(ir.model.as_deref());
    let mut messages = Vec::with_capacity(ir.messages.len() + 1);

    if !strip_reasoning && let Some(system) = ir.system.as_deref().filter(|s| !s.is_empty()) {
        messages.push(OpenAiMessage {
            role: "system".to_owned(),
            content: Some(OpenAiContent::Text(system.to_owned())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            reasoning_content: None,
            reasoning_details: None,
        });
    }

    for msg in &ir.messages {
        if msg.role == Role::System && strip_reasoning {
            continue;
        }
        let reasoning = if strip_reasoning {
            None
        } else {
            msg.reasoning_content.as_deref()
        };
        messages.push(message_to_wire(msg, dialect.request_reasoning(), reasoning));
    }

    let thinking = ir.generation.thinking.as_ref();
    let mut req = OpenAiRequest {
        model: ir.model.clone(),
        messages,
        temperature: ir.generation.temperature,
        top_p: ir.generation.top_p,
        max_tokens: ir.generation.max_tokens,
        stop: ir.generation.stop_sequences.clone().map(OpenAiStop::Many),
        frequency_penalty: ir.generation.frequency_penalty,
        presence_penalty: ir.generation.presence_penalty,
        seed: ir.generation.seed,
        stream: ir.stream.then_some(true),
        stream_options: ir.stream.then_some(OpenAiStreamOptions { include_usage: true }),
        tools: ir
            .tools
            .as_ref()
            .filter(|tools| !tools.is_empty())
            .map(|tools| tools.iter().map(Into::into).collect()),
        tool_choice: ir.tool_choice.as_ref().map(tool_choice_value),
        response_format: ir.generation.response_format.as_ref().map(response_format_value),
        reasoning_effort: None,
        thinking: None,
        user: None,
        metadata: None,
        max_completion_tokens: None,
        extra: ir.extensions.fields(dialect.tag()),
    };

    match dialect {
        Dialect::OpenAi => {
            req.reasoning_effort = thinking.filter(|t| t.enabled).and_then(|t| t.effort.clone());
            req.user = ir.metadata.get("user").and_then(Value::as_str).map(str::to_owned);
        }
        Dialect::Zhipu => {
            req.thinking = thinking.map(|t| OpenAiThinking {
                thinking_type: if t.enabled { "enabled" } else { "disabled" }.to_owned(),
            });
        }
        Dialect::DeepSeek | Dialect::MiniMax => {}
    }

    req
}

fn message_to_wire(msg: &Message, field: ReasoningField, reasoning: Option<&str>) -> OpenAiMessage {
    let tool_calls: Option<Vec<OpenAiToolCall>> = msg
        .tool_calls
        .as_ref()
        .filter(|calls| !calls.is_empty())
        .map(|calls| calls.iter().map(Into::into).collect());

    let content = match &msg.content {
        Content::Text(text) if text.is_empty() && tool_calls.is_some() => None,
        Content::Text(text) => Some(OpenAiContent::Text(text.clone())),
        Content::Parts(parts) => Some(OpenAiContent::Parts(parts.iter().map(Into::into).collect())),
    };

    let (reasoning_content, reasoning_details) = reasoning_fields(field, reasoning);

    OpenAiMessage {
        role: msg.role.as_str().to_owned(),
        content,
        name: msg.name.clone(),
        tool_calls,
        tool_call_id: msg.tool_call_id.clone(),
        reasoning_content,
        reasoning_details,
    }
}

/// Place reasoning text in the dialect's field
fn reasoning_fields(field: ReasoningField, reasoning: Option<&str>) -> (Option<String>, Option<Vec<ReasoningDetail>>) {
    let Some(text) = reasoning.filter(|text| !text.is_empty()) else {
        return (None, None);
    };
    match field {
        ReasoningField::None => (None, None),
        ReasoningField::Content => (Some(text.to_owned()), None),
        ReasoningField::Details => (
            None,
            Some(vec![ReasoningDetail {
                detail_type: "thinking".to_owned(),
                text: text.to_owned(),
            }]),
        ),
    }
}

impl From<&ContentPart> for OpenAiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => Self::Text { text: text.clone() },
            ContentPart::Image { source } => Self::ImageUrl {
                image_url: OpenAiImageUrl {
                    url: source.to_url(),
                    detail: None,
                },
            },
        }
    }
}

impl From<&Tool> for OpenAiTool {
    fn from(tool: &Tool) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function: OpenAiFunction {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                parameters: tool.function.parameters.clone(),
            },
        }
    }
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            tool_type: "function".to_owned(),
            function: OpenAiFunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            },
        }
    }
}

/// Render a tool choice in the `OpenAI` shape
pub fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".to_owned()),
        ToolChoice::None => Value::String("none".to_owned()),
        ToolChoice::Required => Value::String("required".to_owned()),
        ToolChoice::Function { name } => json!({"type": "function", "function": {"name": name}}),
    }
}

/// Render a response format in the `OpenAI` shape
pub fn response_format_value(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({"type": "text"}),
        ResponseFormat::JsonObject => json!({"type": "json_object"}),
        ResponseFormat::JsonSchema { name, schema, strict } => {
            let mut spec = Map::new();
            spec.insert("name".to_owned(), Value::String(name.clone()));
            if let Some(schema) = schema {
                spec.insert("schema".to_owned(), schema.clone());
            }
            if let Some(strict) = strict {
                spec.insert("strict".to_owned(), Value::Bool(*strict));
            }
            json!({"type": "json_schema", "json_schema": spec})
        }
    }
}

/// Lower an IR response into a chat completion body
pub fn ir_to_response(ir: &LlmResponse, dialect: Dialect) -> OpenAiResponse {
    OpenAiResponse {
        id: ir.id.clone(),
        object: "chat.completion".to_owned(),
        created: ir.created.unwrap_or_else(unix_now),
        model: ir.model.clone(),
        choices: ir
            .choices
            .iter()
            .map(|choice| {
                let message = &choice.message;
                let tool_calls: Option<Vec<OpenAiToolCall>> = message
                    .tool_calls
                    .as_ref()
                    .filter(|calls| !calls.is_empty())
                    .map(|calls| calls.iter().map(Into::into).collect());
                let text = message.content.as_text();
                let (reasoning_content, reasoning_details) =
                    reasoning_fields(dialect.response_reasoning(), message.reasoning_content.as_deref());
                OpenAiChoice {
                    index: choice.index,
                    message: OpenAiChoiceMessage {
                        role: "assistant".to_owned(),
                        content: if text.is_empty() && tool_calls.is_some() { None } else { Some(text) },
                        tool_calls,
                        reasoning_content,
                        reasoning_details,
                    },
                    finish_reason: Some(choice.finish_reason.unwrap_or(FinishReason::Stop).as_openai().to_owned()),
                    logprobs: choice.logprobs.clone(),
                }
            })
            .collect(),
        usage: ir.usage.as_ref().map(Into::into),
        system_fingerprint: ir.system_fingerprint.clone(),
    }
}

impl From<&Usage> for OpenAiUsage {
    fn from(usage: &Usage) -> Self {
        let details = usage.details_or_default();
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            prompt_tokens_details: details
                .cached_tokens
                .or(details.cache_read_tokens)
                .map(|cached| OpenAiPromptTokensDetails {
                    cached_tokens: Some(cached),
                }),
            completion_tokens_details: details.reasoning_tokens.map(|reasoning| OpenAiCompletionTokensDetails {
                reasoning_tokens: Some(reasoning),
            }),
            prompt_cache_hit_tokens: None,
        }
    }
}

// -- Streaming: OpenAI chunks -> IR events --

/// Per-stream state for chat completion chunks
///
/// `finish_reason` and usage may arrive in separate chunks; `End` is
/// emitted once both are known, or at `finish()` when usage never came.
#[derive(Debug, Default)]
pub struct OpenAiStreamParser {
    started: bool,
    ended: bool,
    pending_finish: Option<FinishReason>,
    pending_usage: Option<Usage>,
}

impl OpenAiStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn maybe_end(&mut self, events: &mut Vec<StreamEvent>) {
        if !self.ended && self.pending_finish.is_some() && self.pending_usage.is_some() {
            self.ended = true;
            events.push(StreamEvent::end(self.pending_finish, self.pending_usage.take()));
        }
    }
}

impl StreamParser for OpenAiStreamParser {
    fn parse(&mut self, chunk: &Value) -> Result<Vec<StreamEvent>, AdapterError> {
        if let Some(error) = chunk.get("error") {
            let message = error.get("message").and_then(Value::as_str).unwrap_or("upstream stream error");
            let code = error.get("code").or_else(|| error.get("type")).map(value_to_code);
            return Ok(vec![StreamEvent::error(message, code)]);
        }

        let chunk: OpenAiStreamChunk =
            serde_json::from_value(chunk.clone()).map_err(AdapterError::deserialize("openai stream chunk"))?;
        let id = (!chunk.id.is_empty()).then(|| chunk.id.clone());
        let model = (!chunk.model.is_empty()).then(|| chunk.model.clone());
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            events.push(StreamEvent::start(id.clone(), model.clone()));
        }

        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(reasoning) = reasoning_text(delta.reasoning_content, delta.reasoning_details) {
                events.push(StreamEvent::reasoning(reasoning));
            }
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::content(content));
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = call
                    .function
                    .map_or((None, None), |f| (f.name, f.arguments.filter(|a| !a.is_empty())));
                if call.id.is_none() && name.is_none() && arguments.is_none() {
                    continue;
                }
                events.push(StreamEvent::tool_call(ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }));
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.pending_finish = Some(FinishReason::from_openai(reason));
            }
        }

        if let Some(usage) = chunk.usage {
            self.pending_usage = Some(usage.into());
        }
        self.maybe_end(&mut events);

        Ok(events
            .into_iter()
            .map(|event| event.with_identity(id.clone(), model.clone()))
            .collect())
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.ended || self.pending_finish.is_none() {
            return Vec::new();
        }
        self.ended = true;
        vec![StreamEvent::end(self.pending_finish, self.pending_usage.take())]
    }
}

/// Error codes arrive as strings or numbers depending on the provider
pub fn value_to_code(value: &Value) -> String {
    match value {
        Value::String(code) => code.clone(),
        other => other.to_string(),
    }
}

/// Parse an `OpenAI`-family error body
pub fn parse_error_body(wire: &Value, status: Option<u16>) -> crate::ir::ErrorIr {
    let error = wire.get("error").unwrap_or(wire);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .unwrap_or("unknown upstream error");
    let code = error
        .get("code")
        .filter(|c| !c.is_null())
        .or_else(|| error.get("type"))
        .map(value_to_code);
    crate::ir::ErrorIr::from_upstream(message, code, status, wire)
}
