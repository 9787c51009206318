//! Conversion between the IR and the Gemini `generateContent` format

use std::collections::{HashMap, VecDeque};

use serde_json::{Map, Value, json};

use crate::error::AdapterError;
use crate::ir::{
    Choice, Content, ContentPart, ErrorIr, Extensions, FinishReason, GenerationConfig, ImageSource, LlmRequest,
    LlmResponse, Message, ResponseFormat, Role, StreamEvent, ThinkingConfig, Tool, ToolCall, ToolCallDelta,
    ToolChoice, Usage, UsageDetails, unix_now,
};
use crate::protocol::gemini::{
    GeminiCandidate, GeminiContent, GeminiFileData, GeminiFunctionCall, GeminiFunctionCallingConfig,
    GeminiFunctionDeclaration, GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData, GeminiPart,
    GeminiRequest, GeminiResponse, GeminiThinkingConfig, GeminiTool, GeminiToolConfig, GeminiUsageMetadata,
};
use crate::stream::StreamParser;

/// Provider tag for extensions
pub const TAG: &str = "gemini";

/// Extension key holding non-function tools (`googleSearch` and friends)
pub const BUILTIN_TOOLS: &str = "builtin_tools";

/// Schema keywords Gemini rejects
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "additionalProperties", "$id", "$ref", "$defs", "definitions"];

/// Tool call ids for calls that arrive without one
///
/// Gemini pairs function responses with calls by name, in order. Each call
/// gets `call_{name}_{n}`, and a response takes the oldest unanswered id
/// issued for its name.
#[derive(Debug, Default)]
pub struct CallIds {
    issued: HashMap<String, u32>,
    pending: HashMap<String, VecDeque<String>>,
}

impl CallIds {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, name: &str) -> String {
        let count = self.issued.entry(name.to_owned()).or_default();
        let id = format!("call_{name}_{count}");
        *count += 1;
        id
    }

    /// Id for a function call, keeping one the provider sent
    pub fn call(&mut self, name: &str, id: Option<String>) -> String {
        let id = id.unwrap_or_else(|| self.next(name));
        self.pending.entry(name.to_owned()).or_default().push_back(id.clone());
        id
    }

    /// Id of the call a function response answers
    pub fn response(&mut self, name: &str, id: Option<String>) -> String {
        let queue = self.pending.entry(name.to_owned()).or_default();
        if let Some(id) = id {
            queue.retain(|pending| *pending != id);
            return id;
        }
        match queue.pop_front() {
            Some(id) => id,
            None => self.next(name),
        }
    }
}

// -- Inbound: Gemini wire format -> IR --

/// Lift a `generateContent` request into the IR
pub fn request_to_ir(req: GeminiRequest, model: Option<String>) -> LlmRequest {
    let mut extra = req.extra;
    let mut tools = Vec::new();
    let mut builtin = Vec::new();

    for tool in req.tools.unwrap_or_default() {
        for decl in tool.function_declarations.unwrap_or_default() {
            tools.push(Tool::function(decl.name, decl.description, decl.parameters));
        }
        if !tool.extra.is_empty() {
            builtin.push(Value::Object(tool.extra));
        }
    }
    if !builtin.is_empty() {
        extra.insert(BUILTIN_TOOLS.to_owned(), Value::Array(builtin));
    }

    let config = req.generation_config.unwrap_or_default();
    let mut ir = LlmRequest {
        model,
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice: req.tool_config.as_ref().and_then(tool_choice_to_ir),
        generation: GenerationConfig {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_tokens: config.max_output_tokens,
            stop_sequences: config.stop_sequences,
            response_format: match config.response_mime_type.as_deref() {
                Some("application/json") => Some(match config.response_schema {
                    Some(schema) => ResponseFormat::JsonSchema {
                        name: "response".to_owned(),
                        schema: Some(schema),
                        strict: None,
                    },
                    None => ResponseFormat::JsonObject,
                }),
                _ => None,
            },
            thinking: config.thinking_config.map(|t| ThinkingConfig {
                enabled: t.include_thoughts.unwrap_or(false) || t.thinking_budget.is_some_and(|b| b != 0),
                budget_tokens: t.thinking_budget.and_then(|b| u32::try_from(b).ok()),
                effort: None,
            }),
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
            seed: config.seed,
        },
        ..LlmRequest::default()
    };

    if let Some(system) = req.system_instruction {
        ir.push_system(&parts_text(&system.parts));
    }

    let mut ids = CallIds::new();
    for content in req.contents {
        ir.messages.extend(lift_content(content, &mut ids));
    }

    ir.extensions.insert_fields(TAG, extra);
    ir
}

fn parts_text(parts: &[GeminiPart]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_thought())
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a function response payload as tool message text
fn response_text(response: &Value) -> String {
    match response.get("result").or_else(|| response.get("content")) {
        Some(Value::String(text)) => text.clone(),
        _ => response.to_string(),
    }
}

/// Lift one content object into one or more IR messages
fn lift_content(content: GeminiContent, ids: &mut CallIds) -> Vec<Message> {
    let role = match content.role.as_deref() {
        Some("model") => Role::Assistant,
        _ => Role::User,
    };

    let mut lifted = Vec::new();
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut reasoning = Vec::new();

    for part in content.parts {
        if let Some(call) = part.function_call {
            let id = ids.call(&call.name, call.id);
            tool_calls.push(ToolCall::function(id, call.name, call.args.to_string()));
        } else if let Some(response) = part.function_response {
            let id = ids.response(&response.name, response.id);
            lifted.push(Message::tool_result(id, response_text(&response.response)));
        } else if let Some(data) = part.inline_data {
            parts.push(ContentPart::Image {
                source: ImageSource::Base64 {
                    media_type: data.mime_type,
                    data: data.data,
                },
            });
        } else if let Some(file) = part.file_data {
            parts.push(ContentPart::Image {
                source: ImageSource::Url { url: file.file_uri },
            });
        } else if let Some(text) = part.text {
            if part.thought == Some(true) {
                reasoning.push(text);
            } else {
                parts.push(ContentPart::Text { text });
            }
        }
    }

    if !parts.is_empty() || !tool_calls.is_empty() || !reasoning.is_empty() {
        lifted.push(Message {
            role,
            content: Content::from_parts(parts),
            name: None,
            tool_call_id: None,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            reasoning_content: (!reasoning.is_empty()).then(|| reasoning.join("\n")),
        });
    }

    lifted
}

fn tool_choice_to_ir(config: &GeminiToolConfig) -> Option<ToolChoice> {
    let calling = &config.function_calling_config;
    match calling.mode.as_str() {
        "AUTO" => Some(ToolChoice::Auto),
        "NONE" => Some(ToolChoice::None),
        "ANY" => match calling.allowed_function_names.as_deref() {
            Some([name]) => Some(ToolChoice::Function { name: name.clone() }),
            _ => Some(ToolChoice::Required),
        },
        _ => None,
    }
}

/// Map a Gemini finish reason onto the IR
pub fn finish_reason_to_ir(reason: &str, has_tool_calls: bool) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::ContentFilter
        }
        _ if has_tool_calls => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Map an IR finish reason onto Gemini's
pub const fn finish_reason_to_wire(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop | FinishReason::ToolCalls => "STOP",
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::ContentFilter => "SAFETY",
    }
}

/// Usage metadata in the IR; reasoning tokens count as completion tokens
pub fn usage_to_ir(usage: &GeminiUsageMetadata) -> Usage {
    let thoughts = usage.thoughts_token_count.unwrap_or(0);
    let mut ir = Usage::new(usage.prompt_token_count, usage.candidates_token_count.saturating_add(thoughts))
        .with_details(UsageDetails {
            reasoning_tokens: usage.thoughts_token_count,
            cached_tokens: usage.cached_content_token_count,
            ..UsageDetails::default()
        });
    if usage.total_token_count > 0 {
        ir.total_tokens = usage.total_token_count;
    }
    ir
}

/// Lift a `generateContent` response into the IR
pub fn response_to_ir(resp: GeminiResponse) -> LlmResponse {
    #[allow(clippy::cast_possible_truncation)]
    let choices = resp
        .candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| candidate_to_choice(candidate, i as u32))
        .collect();

    LlmResponse {
        id: resp
            .response_id
            .unwrap_or_else(|| format!("gemini-{}", uuid::Uuid::new_v4().simple())),
        model: resp.model_version.unwrap_or_default(),
        choices,
        usage: resp.usage_metadata.as_ref().map(usage_to_ir),
        created: Some(unix_now()),
        system_fingerprint: None,
        extensions: Extensions::default(),
        raw: None,
    }
}

fn candidate_to_choice(candidate: GeminiCandidate, default_index: u32) -> Choice {
    let mut text = String::new();
    let mut reasoning = Vec::new();
    let mut tool_calls = Vec::new();
    let mut ids = CallIds::new();

    for part in candidate.content.parts {
        if let Some(call) = part.function_call {
            let id = ids.call(&call.name, call.id);
            tool_calls.push(ToolCall::function(id, call.name, call.args.to_string()));
        } else if let Some(chunk) = part.text {
            if part.thought == Some(true) {
                reasoning.push(chunk);
            } else {
                text.push_str(&chunk);
            }
        }
    }

    let finish_reason = candidate
        .finish_reason
        .as_deref()
        .map(|reason| finish_reason_to_ir(reason, !tool_calls.is_empty()));

    Choice {
        index: candidate.index.unwrap_or(default_index),
        message: Message {
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            reasoning_content: (!reasoning.is_empty()).then(|| reasoning.join("\n")),
            ..Message::assistant(text)
        },
        finish_reason,
        logprobs: None,
    }
}

// -- Outbound: IR -> Gemini wire format --

/// Strip schema keywords Gemini rejects, recursively
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), sanitize_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

/// Function response payload for tool message text
fn response_value(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({"result": text}),
    }
}

/// Lower the IR into a `generateContent` request
pub fn ir_to_request(ir: &LlmRequest) -> GeminiRequest {
    let mut system = ir.system.clone().unwrap_or_default();
    let mut contents: Vec<GeminiContent> = Vec::new();
    // Function responses are matched by name, so remember each call's name
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for msg in &ir.messages {
        match msg.role {
            Role::System => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&msg.content.as_text());
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().unwrap_or_default();
                let part = GeminiPart {
                    function_response: Some(GeminiFunctionResponse {
                        id: None,
                        name: call_names.get(id).copied().unwrap_or(id).to_owned(),
                        response: response_value(&msg.content.as_text()),
                    }),
                    ..GeminiPart::default()
                };
                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(GeminiContent {
                        role: Some("user".to_owned()),
                        parts: vec![part],
                    }),
                }
            }
            Role::User | Role::Assistant => {
                for call in msg.tool_calls() {
                    call_names.insert(&call.id, &call.function.name);
                }
                contents.push(message_to_wire(msg));
            }
        }
    }

    let mut extra = ir.extensions.fields(TAG);
    let builtin = extra.remove(BUILTIN_TOOLS);

    let mut tools = Vec::new();
    if let Some(ir_tools) = ir.tools.as_ref().filter(|t| !t.is_empty()) {
        tools.push(GeminiTool {
            function_declarations: Some(
                ir_tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.as_ref().map(sanitize_schema),
                    })
                    .collect(),
            ),
            extra: Map::new(),
        });
    }
    if let Some(Value::Array(builtin)) = builtin {
        tools.extend(builtin.into_iter().filter_map(|v| match v {
            Value::Object(extra) => Some(GeminiTool {
                function_declarations: None,
                extra,
            }),
            _ => None,
        }));
    }

    let generation = &ir.generation;
    let (response_mime_type, response_schema) = match &generation.response_format {
        Some(ResponseFormat::JsonObject) => (Some("application/json".to_owned()), None),
        Some(ResponseFormat::JsonSchema { schema, .. }) => {
            (Some("application/json".to_owned()), schema.as_ref().map(sanitize_schema))
        }
        Some(ResponseFormat::Text) | None => (None, None),
    };

    let generation_config = GeminiGenerationConfig {
        temperature: generation.temperature,
        top_p: generation.top_p,
        top_k: generation.top_k,
        max_output_tokens: generation.max_tokens,
        stop_sequences: generation.stop_sequences.clone(),
        candidate_count: None,
        response_mime_type,
        response_schema,
        thinking_config: generation.thinking.as_ref().map(|t| {
            if t.enabled {
                GeminiThinkingConfig {
                    include_thoughts: Some(true),
                    thinking_budget: t.budget_tokens.map(i64::from),
                }
            } else {
                GeminiThinkingConfig {
                    include_thoughts: None,
                    thinking_budget: Some(0),
                }
            }
        }),
        frequency_penalty: generation.frequency_penalty,
        presence_penalty: generation.presence_penalty,
        seed: generation.seed,
    };

    GeminiRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(system)],
        }),
        generation_config: Some(generation_config),
        tools: (!tools.is_empty()).then_some(tools),
        tool_config: ir.tool_choice.as_ref().map(tool_choice_to_wire),
        extra,
    }
}

fn message_to_wire(msg: &Message) -> GeminiContent {
    let role = if msg.role == Role::Assistant { "model" } else { "user" };

    let mut parts: Vec<GeminiPart> = msg
        .content
        .parts()
        .into_iter()
        .filter(|part| !matches!(part, ContentPart::Text { text } if text.is_empty()))
        .map(|part| match part {
            ContentPart::Text { text } => GeminiPart::text(text),
            ContentPart::Image {
                source: ImageSource::Base64 { media_type, data },
            } => GeminiPart {
                inline_data: Some(GeminiInlineData {
                    mime_type: media_type,
                    data,
                }),
                ..GeminiPart::default()
            },
            ContentPart::Image {
                source: ImageSource::Url { url },
            } => GeminiPart {
                file_data: Some(GeminiFileData {
                    mime_type: None,
                    file_uri: url,
                }),
                ..GeminiPart::default()
            },
        })
        .collect();

    for call in msg.tool_calls() {
        parts.push(GeminiPart {
            function_call: Some(GeminiFunctionCall {
                id: None,
                name: call.function.name.clone(),
                args: call.arguments_value(),
            }),
            ..GeminiPart::default()
        });
    }

    if parts.is_empty() {
        parts.push(GeminiPart::text(""));
    }

    GeminiContent {
        role: Some(role.to_owned()),
        parts,
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> GeminiToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Function { name } => ("ANY", Some(vec![name.clone()])),
    };
    GeminiToolConfig {
        function_calling_config: GeminiFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names,
        },
    }
}

/// IR usage as usage metadata
pub fn usage_to_wire(usage: &Usage) -> GeminiUsageMetadata {
    let details = usage.details_or_default();
    let thoughts = details.reasoning_tokens;
    GeminiUsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: usage.completion_tokens.saturating_sub(thoughts.unwrap_or(0)),
        total_token_count: usage.total_tokens,
        thoughts_token_count: thoughts,
        cached_content_token_count: details.cached_tokens.or(details.cache_read_tokens),
    }
}

/// Lower an IR response into a `generateContent` body
pub fn ir_to_response(ir: &LlmResponse) -> GeminiResponse {
    let candidates = ir
        .choices
        .iter()
        .map(|choice| {
            let message = &choice.message;
            let mut parts = Vec::new();
            if let Some(reasoning) = message.reasoning_content.as_deref().filter(|r| !r.is_empty()) {
                parts.push(GeminiPart::thought(reasoning));
            }
            let text = message.content.as_text();
            if !text.is_empty() {
                parts.push(GeminiPart::text(text));
            }
            for call in message.tool_calls() {
                parts.push(GeminiPart {
                    function_call: Some(GeminiFunctionCall {
                        id: None,
                        name: call.function.name.clone(),
                        args: call.arguments_value(),
                    }),
                    ..GeminiPart::default()
                });
            }
            GeminiCandidate {
                content: GeminiContent {
                    role: Some("model".to_owned()),
                    parts,
                },
                finish_reason: Some(
                    finish_reason_to_wire(choice.finish_reason.unwrap_or(FinishReason::Stop)).to_owned(),
                ),
                index: Some(choice.index),
            }
        })
        .collect();

    GeminiResponse {
        candidates,
        usage_metadata: ir.usage.as_ref().map(usage_to_wire),
        model_version: Some(ir.model.clone()).filter(|m| !m.is_empty()),
        response_id: Some(ir.id.clone()),
    }
}

/// Parse a Gemini error body (`{error: {code, message, status}}`)
pub fn parse_error_body(wire: &Value, status: Option<u16>) -> ErrorIr {
    let error = wire.get("error").unwrap_or(wire);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown upstream error");
    let code = error.get("status").and_then(Value::as_str).map(str::to_owned);
    let status = status.or_else(|| {
        error
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
    });
    ErrorIr::from_upstream(message, code, status, wire)
}

// -- Streaming: Gemini chunks -> IR events --

/// Per-stream state for Gemini SSE chunks
///
/// Gemini sends each function call whole, so every call gets a fresh index.
#[derive(Debug, Default)]
pub struct GeminiStreamParser {
    started: bool,
    ended: bool,
    id: Option<String>,
    model: Option<String>,
    next_tool_index: u32,
    ids: CallIds,
}

impl GeminiStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one decoded chunk
    pub fn convert(&mut self, chunk: GeminiResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            self.id = chunk.response_id.clone();
            self.model = chunk.model_version.clone();
            events.push(StreamEvent::start(self.id.clone(), self.model.clone()));
        }

        let mut finish = None;
        for candidate in chunk.candidates.into_iter().take(1) {
            for part in candidate.content.parts {
                if let Some(call) = part.function_call {
                    let index = self.next_tool_index;
                    self.next_tool_index += 1;
                    events.push(StreamEvent::tool_call(ToolCallDelta {
                        index,
                        id: Some(self.ids.call(&call.name, call.id)),
                        name: Some(call.name),
                        arguments: Some(call.args.to_string()),
                    }));
                } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    if part.thought == Some(true) {
                        events.push(StreamEvent::reasoning(text));
                    } else {
                        events.push(StreamEvent::content(text));
                    }
                }
            }
            finish = candidate.finish_reason;
        }

        if let Some(reason) = finish
            && !self.ended
        {
            self.ended = true;
            events.push(StreamEvent::end(
                Some(finish_reason_to_ir(&reason, self.next_tool_index > 0)),
                chunk.usage_metadata.as_ref().map(usage_to_ir),
            ));
        }

        events
            .into_iter()
            .map(|e| {
                if e.id.is_some() {
                    e
                } else {
                    e.with_identity(self.id.clone(), self.model.clone())
                }
            })
            .collect()
    }
}

impl StreamParser for GeminiStreamParser {
    fn parse(&mut self, chunk: &Value) -> Result<Vec<StreamEvent>, AdapterError> {
        if chunk.get("error").is_some() {
            let parsed = parse_error_body(chunk, None);
            return Ok(vec![StreamEvent::error(parsed.message, parsed.code)]);
        }
        let chunk: GeminiResponse =
            serde_json::from_value(chunk.clone()).map_err(AdapterError::deserialize("gemini stream chunk"))?;
        Ok(self.convert(chunk))
    }
}
