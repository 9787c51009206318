//! Conversion between the IR and the `OpenAI` Responses format
//!
//! Serves both the public Responses API and the `ChatGPT` Codex backend; the
//! [`ResponsesFlavor`] selects the Codex restrictions.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value, json};

use super::openai::{parse_response_format, parse_tool_choice, response_format_value};
use crate::adapter::responses::ResponsesFlavor;
use crate::error::AdapterError;
use crate::ir::{
    Content, ContentPart, ErrorIr, FinishReason, GenerationConfig, ImageSource, LlmRequest, LlmResponse, Message,
    ResponseFormat, Role, StreamEvent, ThinkingConfig, Tool, ToolCall, ToolCallDelta, ToolChoice, Usage,
    UsageDetails,
};
use crate::protocol::responses::{
    ResponsesContentPart, ResponsesFunctionCall, ResponsesIncompleteDetails, ResponsesInput, ResponsesInputItem,
    ResponsesInputTokensDetails, ResponsesItem, ResponsesMessage, ResponsesMessageContent,
    ResponsesOutputTokensDetails, ResponsesReasoning, ResponsesReasoningItem, ResponsesRequest, ResponsesResponse,
    ResponsesStreamEvent, ResponsesSummaryText, ResponsesTextConfig, ResponsesTool, ResponsesUsage,
};
use crate::stream::StreamParser;

/// Provider tag for extensions
pub const TAG: &str = "responses";

/// Extension key holding non-function tools (`web_search` and friends)
pub const BUILTIN_TOOLS: &str = "builtin_tools";

// -- Inbound: Responses wire format -> IR --

/// Lift a Responses request into the IR
pub fn request_to_ir(req: ResponsesRequest) -> LlmRequest {
    let mut extra = req.extra;
    let mut tools = Vec::new();
    let mut builtin = Vec::new();

    for tool in req.tools.unwrap_or_default() {
        match tool {
            ResponsesTool {
                tool_type,
                name: Some(name),
                description,
                parameters,
                ..
            } if tool_type == "function" => tools.push(Tool::function(name, description, parameters)),
            other => {
                if let Ok(value) = serde_json::to_value(other) {
                    builtin.push(value);
                }
            }
        }
    }
    if !builtin.is_empty() {
        extra.insert(BUILTIN_TOOLS.to_owned(), Value::Array(builtin));
    }

    let response_format = req
        .text
        .as_ref()
        .and_then(|text| text.format.as_ref())
        .and_then(parse_response_format);

    let mut ir = LlmRequest {
        model: req.model,
        stream: req.stream.unwrap_or(false),
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice: req.tool_choice.as_ref().and_then(parse_tool_choice),
        generation: GenerationConfig {
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_output_tokens,
            response_format,
            thinking: req.reasoning.and_then(|r| {
                let effort = r.effort?;
                Some(ThinkingConfig {
                    enabled: effort != "none",
                    budget_tokens: None,
                    effort: Some(effort),
                })
            }),
            ..GenerationConfig::default()
        },
        metadata: req.metadata.unwrap_or_default(),
        ..LlmRequest::default()
    };

    if let Some(instructions) = req.instructions {
        ir.push_system(&instructions);
    }
    if let Some(user) = req.user {
        ir.metadata.insert("user".to_owned(), Value::String(user));
    }
    if let Some(store) = req.store {
        extra.insert("store".to_owned(), Value::Bool(store));
    }

    match req.input {
        ResponsesInput::Text(text) => ir.messages.push(Message::user(text)),
        ResponsesInput::Items(items) => lift_items(&mut ir, items),
    }

    ir.extensions.insert_fields(TAG, extra);
    ir
}

fn lift_items(ir: &mut LlmRequest, items: Vec<ResponsesInputItem>) {
    let mut pending_reasoning: Option<String> = None;

    for item in items {
        let item = match item {
            ResponsesInputItem::Typed(item) => item,
            ResponsesInputItem::Message(message) => ResponsesItem::Message(message),
        };

        match item {
            ResponsesItem::Message(message) => match message.role.as_str() {
                "system" | "developer" => ir.push_system(&content_text(&message.content)),
                role => {
                    let role = if role == "assistant" { Role::Assistant } else { Role::User };
                    let mut lifted = Message {
                        role,
                        content: content_to_ir(message.content),
                        name: None,
                        tool_call_id: None,
                        tool_calls: None,
                        reasoning_content: None,
                    };
                    if role == Role::Assistant {
                        lifted.reasoning_content = pending_reasoning.take();
                    }
                    ir.messages.push(lifted);
                }
            },
            ResponsesItem::FunctionCall(call) => {
                let tool_call = ToolCall::function(call.call_id, call.name, call.arguments);
                // Calls following assistant text belong to the same turn
                match ir.messages.last_mut() {
                    Some(last) if last.role == Role::Assistant => {
                        last.tool_calls.get_or_insert_with(Vec::new).push(tool_call);
                    }
                    _ => ir.messages.push(Message {
                        tool_calls: Some(vec![tool_call]),
                        reasoning_content: pending_reasoning.take(),
                        ..Message::assistant("")
                    }),
                }
            }
            ResponsesItem::FunctionCallOutput { call_id, output } => {
                ir.messages.push(Message::tool_result(call_id, output));
            }
            ResponsesItem::Reasoning(reasoning) => {
                let text = summary_text(&reasoning.summary);
                if !text.is_empty() {
                    pending_reasoning = Some(text);
                }
            }
            ResponsesItem::Unknown => {}
        }
    }
}

fn summary_text(summary: &[ResponsesSummaryText]) -> String {
    summary.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join("\n")
}

fn content_text(content: &ResponsesMessageContent) -> String {
    match content {
        ResponsesMessageContent::Text(text) => text.clone(),
        ResponsesMessageContent::Parts(parts) => parts.iter().filter_map(ResponsesContentPart::text).collect(),
    }
}

fn content_to_ir(content: ResponsesMessageContent) -> Content {
    match content {
        ResponsesMessageContent::Text(text) => Content::Text(text),
        ResponsesMessageContent::Parts(parts) => Content::from_parts(
            parts
                .into_iter()
                .filter_map(|part| match part {
                    ResponsesContentPart::InputText { text } | ResponsesContentPart::OutputText { text, .. } => {
                        Some(ContentPart::Text { text })
                    }
                    ResponsesContentPart::Refusal { refusal } => Some(ContentPart::Text { text: refusal }),
                    ResponsesContentPart::InputImage {
                        image_url: Some(url), ..
                    } => Some(ContentPart::Image {
                        source: ImageSource::from_url(&url),
                    }),
                    ResponsesContentPart::InputImage { .. } | ResponsesContentPart::Unknown => None,
                })
                .collect(),
        ),
    }
}

/// Finish reason of a terminal response
fn finish_reason_to_ir(resp: &ResponsesResponse, has_tool_calls: bool) -> FinishReason {
    match (resp.status.as_deref(), &resp.incomplete_details) {
        (Some("incomplete"), Some(details)) if details.reason == "content_filter" => FinishReason::ContentFilter,
        (Some("incomplete"), _) => FinishReason::Length,
        _ if has_tool_calls => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn usage_to_ir(usage: &ResponsesUsage) -> Usage {
    let mut ir = Usage::new(usage.input_tokens, usage.output_tokens).with_details(UsageDetails {
        reasoning_tokens: usage
            .output_tokens_details
            .as_ref()
            .map(|d| d.reasoning_tokens)
            .filter(|t| *t > 0),
        cached_tokens: usage
            .input_tokens_details
            .as_ref()
            .map(|d| d.cached_tokens)
            .filter(|t| *t > 0),
        ..UsageDetails::default()
    });
    if usage.total_tokens > 0 {
        ir.total_tokens = usage.total_tokens;
    }
    ir
}

/// Lift a Responses response into the IR
pub fn response_to_ir(resp: ResponsesResponse) -> LlmResponse {
    let mut text = String::new();
    let mut reasoning = Vec::new();
    let mut tool_calls = Vec::new();

    for item in &resp.output {
        match item {
            ResponsesItem::Message(message) => text.push_str(&content_text(&message.content)),
            ResponsesItem::Reasoning(item) => {
                let summary = summary_text(&item.summary);
                if !summary.is_empty() {
                    reasoning.push(summary);
                }
            }
            ResponsesItem::FunctionCall(call) => {
                tool_calls.push(ToolCall::function(&call.call_id, &call.name, &call.arguments));
            }
            ResponsesItem::FunctionCallOutput { .. } | ResponsesItem::Unknown => {}
        }
    }

    let finish_reason = finish_reason_to_ir(&resp, !tool_calls.is_empty());
    let message = Message {
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        reasoning_content: (!reasoning.is_empty()).then(|| reasoning.join("\n")),
        ..Message::assistant(text)
    };

    let mut ir = LlmResponse::single(resp.id, resp.model, message, Some(finish_reason));
    ir.usage = resp.usage.as_ref().map(usage_to_ir);
    ir.created = (resp.created_at > 0).then_some(resp.created_at);
    ir
}

// -- Outbound: IR -> Responses wire format --

/// Lower the IR into a Responses request
pub fn ir_to_request(ir: &LlmRequest, flavor: ResponsesFlavor) -> ResponsesRequest {
    let codex = flavor == ResponsesFlavor::Codex;
    let mut instructions = ir.system.clone().unwrap_or_default();
    let mut input = Vec::with_capacity(ir.messages.len());

    for msg in &ir.messages {
        match msg.role {
            Role::System => {
                if !instructions.is_empty() {
                    instructions.push_str("\n\n");
                }
                instructions.push_str(&msg.content.as_text());
            }
            Role::Tool => input.push(ResponsesInputItem::Typed(ResponsesItem::FunctionCallOutput {
                call_id: msg.tool_call_id.clone().unwrap_or_default(),
                output: msg.content.as_text(),
            })),
            Role::User | Role::Assistant => {
                let assistant = msg.role == Role::Assistant;
                let parts: Vec<ResponsesContentPart> = msg
                    .content
                    .parts()
                    .into_iter()
                    .filter(|part| !matches!(part, ContentPart::Text { text } if text.is_empty()))
                    .map(|part| match part {
                        ContentPart::Text { text } if assistant => ResponsesContentPart::OutputText {
                            text,
                            annotations: Vec::new(),
                        },
                        ContentPart::Text { text } => ResponsesContentPart::InputText { text },
                        ContentPart::Image { source } => ResponsesContentPart::InputImage {
                            image_url: Some(source.to_url()),
                            detail: None,
                        },
                    })
                    .collect();

                if !parts.is_empty() || !assistant {
                    input.push(ResponsesInputItem::Typed(ResponsesItem::Message(ResponsesMessage {
                        id: None,
                        role: msg.role.as_str().to_owned(),
                        content: ResponsesMessageContent::Parts(parts),
                        status: None,
                    })));
                }
                for call in msg.tool_calls() {
                    input.push(ResponsesInputItem::Typed(ResponsesItem::FunctionCall(ResponsesFunctionCall {
                        id: None,
                        call_id: call.id.clone(),
                        name: call.function.name.clone(),
                        arguments: call.function.arguments.clone(),
                        status: None,
                    })));
                }
            }
        }
    }

    let mut extra = ir.extensions.fields(TAG);
    let builtin = extra.remove(BUILTIN_TOOLS);
    let store = extra.remove("store").and_then(|v| v.as_bool());

    let mut tools: Vec<ResponsesTool> = ir
        .tools
        .iter()
        .flatten()
        .map(|tool| ResponsesTool {
            tool_type: "function".to_owned(),
            name: Some(tool.function.name.clone()),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.clone(),
            strict: None,
            extra: Map::new(),
        })
        .collect();
    if let Some(Value::Array(builtin)) = builtin {
        tools.extend(builtin.into_iter().filter_map(|v| serde_json::from_value(v).ok()));
    }

    let thinking = ir.generation.thinking.as_ref().filter(|t| t.enabled);

    ResponsesRequest {
        model: ir.model.clone(),
        input: ResponsesInput::Items(input),
        instructions: if codex || !instructions.is_empty() {
            Some(instructions)
        } else {
            None
        },
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice: ir.tool_choice.as_ref().map(tool_choice_value),
        temperature: ir.generation.temperature.filter(|_| !codex),
        top_p: ir.generation.top_p.filter(|_| !codex),
        max_output_tokens: ir.generation.max_tokens.filter(|_| !codex),
        stream: if codex { Some(true) } else { ir.stream.then_some(true) },
        store: if codex { Some(false) } else { store },
        reasoning: thinking.map(|t| ResponsesReasoning {
            effort: Some(t.effort.clone().unwrap_or_else(|| "medium".to_owned())),
            summary: Some("auto".to_owned()),
        }),
        text: ir.generation.response_format.as_ref().map(|format| ResponsesTextConfig {
            format: Some(text_format_value(format)),
            extra: Map::new(),
        }),
        metadata: if codex || ir.metadata.is_empty() {
            None
        } else {
            Some(ir.metadata.clone())
        },
        user: None,
        extra,
    }
}

/// Tool choice in the flat Responses shape
fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".to_owned()),
        ToolChoice::None => Value::String("none".to_owned()),
        ToolChoice::Required => Value::String("required".to_owned()),
        ToolChoice::Function { name } => json!({"type": "function", "name": name}),
    }
}

/// Response format in the flat `text.format` shape
fn text_format_value(format: &ResponseFormat) -> Value {
    let mut value = response_format_value(format);
    if let Some(spec) = value.get_mut("json_schema").map(Value::take)
        && let (Value::Object(target), Value::Object(spec)) = (&mut value, spec)
    {
        target.remove("json_schema");
        target.extend(spec);
    }
    value
}

/// Lower an IR response into a Responses body
pub fn ir_to_response(ir: &LlmResponse) -> ResponsesResponse {
    let choice = ir.choices.first();
    let mut output = Vec::new();

    if let Some(message) = choice.map(|c| &c.message) {
        if let Some(reasoning) = message.reasoning_content.as_deref().filter(|r| !r.is_empty()) {
            output.push(reasoning_item(reasoning));
        }
        let text = message.content.as_text();
        if !text.is_empty() {
            output.push(message_item(new_item_id("msg_"), text));
        }
        for call in message.tool_calls() {
            output.push(function_call_item(
                new_item_id("fc_"),
                &call.id,
                &call.function.name,
                &call.function.arguments,
            ));
        }
    }

    let finish = choice.and_then(|c| c.finish_reason).unwrap_or(FinishReason::Stop);
    let (status, incomplete_details) = terminal_status(finish);

    ResponsesResponse {
        id: ir.id.clone(),
        object: "response".to_owned(),
        created_at: ir.created.unwrap_or_else(crate::ir::unix_now),
        model: ir.model.clone(),
        status: Some(status.to_owned()),
        output,
        usage: ir.usage.as_ref().map(usage_to_wire),
        incomplete_details,
        error: None,
    }
}

/// Status and incomplete details for a finish reason
pub fn terminal_status(finish: FinishReason) -> (&'static str, Option<ResponsesIncompleteDetails>) {
    let reason = match finish {
        FinishReason::Stop | FinishReason::ToolCalls => return ("completed", None),
        FinishReason::Length => "max_output_tokens",
        FinishReason::ContentFilter => "content_filter",
    };
    (
        "incomplete",
        Some(ResponsesIncompleteDetails {
            reason: reason.to_owned(),
        }),
    )
}

/// Fresh output item id with `prefix`
pub fn new_item_id(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4().simple())
}

/// Completed assistant message item
pub fn message_item(id: String, text: String) -> ResponsesItem {
    ResponsesItem::Message(ResponsesMessage {
        id: Some(id),
        role: "assistant".to_owned(),
        content: ResponsesMessageContent::Parts(vec![ResponsesContentPart::OutputText {
            text,
            annotations: Vec::new(),
        }]),
        status: Some("completed".to_owned()),
    })
}

/// Completed function call item
pub fn function_call_item(id: String, call_id: &str, name: &str, arguments: &str) -> ResponsesItem {
    ResponsesItem::FunctionCall(ResponsesFunctionCall {
        id: Some(id),
        call_id: call_id.to_owned(),
        name: name.to_owned(),
        arguments: arguments.to_owned(),
        status: Some("completed".to_owned()),
    })
}

fn reasoning_item(text: &str) -> ResponsesItem {
    ResponsesItem::Reasoning(ResponsesReasoningItem {
        id: Some(new_item_id("rs_")),
        summary: vec![ResponsesSummaryText::new(text)],
        encrypted_content: None,
    })
}

/// IR usage in the Responses shape
pub fn usage_to_wire(usage: &Usage) -> ResponsesUsage {
    let details = usage.details_or_default();
    ResponsesUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        input_tokens_details: Some(ResponsesInputTokensDetails {
            cached_tokens: details.cached_tokens.or(details.cache_read_tokens).unwrap_or(0),
        }),
        output_tokens_details: Some(ResponsesOutputTokensDetails {
            reasoning_tokens: details.reasoning_tokens.unwrap_or(0),
        }),
    }
}

/// Parse a Responses error body
pub fn parse_error_body(wire: &Value, status: Option<u16>) -> ErrorIr {
    super::openai::parse_error_body(wire, status)
}

// -- Streaming: Responses events -> IR events --

/// Per-stream state for Responses SSE events
#[derive(Debug, Default)]
pub struct ResponsesStreamParser {
    started: bool,
    ended: bool,
    id: Option<String>,
    model: Option<String>,
    /// Function call item id to tool call index
    tool_items: HashMap<String, u32>,
    /// Items whose arguments arrived as deltas
    streamed_arguments: HashSet<String>,
    next_tool_index: u32,
}

impl ResponsesStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&mut self, response: &ResponsesResponse) -> Vec<StreamEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        self.id = Some(response.id.clone()).filter(|id| !id.is_empty());
        self.model = Some(response.model.clone()).filter(|m| !m.is_empty());
        vec![StreamEvent::start(self.id.clone(), self.model.clone())]
    }

    fn tool_index(&mut self, item_id: &str) -> u32 {
        if let Some(index) = self.tool_items.get(item_id) {
            return *index;
        }
        let index = self.next_tool_index;
        self.next_tool_index += 1;
        self.tool_items.insert(item_id.to_owned(), index);
        index
    }

    fn convert(&mut self, event: ResponsesStreamEvent) -> Vec<StreamEvent> {
        match event {
            ResponsesStreamEvent::Created { response } | ResponsesStreamEvent::InProgress { response } => {
                self.start(&response)
            }

            ResponsesStreamEvent::OutputItemAdded {
                item: ResponsesItem::FunctionCall(call),
                ..
            } => {
                let item_id = call.id.clone().unwrap_or_else(|| call.call_id.clone());
                let index = self.tool_index(&item_id);
                vec![StreamEvent::tool_call(ToolCallDelta {
                    index,
                    id: Some(call.call_id),
                    name: Some(call.name),
                    arguments: None,
                })]
            }

            ResponsesStreamEvent::OutputItemDone {
                item: ResponsesItem::FunctionCall(call),
                ..
            } => {
                let item_id = call.id.clone().unwrap_or_else(|| call.call_id.clone());
                let announced = self.tool_items.contains_key(&item_id);
                let index = self.tool_index(&item_id);
                let arguments = (!self.streamed_arguments.contains(&item_id) && !call.arguments.is_empty())
                    .then_some(call.arguments);
                if announced && arguments.is_none() {
                    return Vec::new();
                }
                vec![StreamEvent::tool_call(ToolCallDelta {
                    index,
                    id: (!announced).then_some(call.call_id),
                    name: (!announced).then_some(call.name),
                    arguments,
                })]
            }

            ResponsesStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } if !delta.is_empty() => {
                let index = self.tool_index(&item_id);
                self.streamed_arguments.insert(item_id);
                vec![StreamEvent::tool_call(ToolCallDelta {
                    index,
                    arguments: Some(delta),
                    ..ToolCallDelta::default()
                })]
            }

            ResponsesStreamEvent::OutputTextDelta { delta, .. } if !delta.is_empty() => {
                vec![StreamEvent::content(delta)]
            }

            ResponsesStreamEvent::ReasoningSummaryTextDelta { delta, .. }
            | ResponsesStreamEvent::ReasoningTextDelta { delta, .. }
                if !delta.is_empty() =>
            {
                vec![StreamEvent::reasoning(delta)]
            }

            ResponsesStreamEvent::Completed { response } | ResponsesStreamEvent::Incomplete { response } => {
                if self.ended {
                    return Vec::new();
                }
                self.ended = true;
                let mut events = self.start(&response);
                let finish = finish_reason_to_ir(&response, !self.tool_items.is_empty());
                events.push(StreamEvent::end(Some(finish), response.usage.as_ref().map(usage_to_ir)));
                events
            }

            ResponsesStreamEvent::Failed { response } => {
                let error = response.error.unwrap_or_else(|| crate::protocol::responses::ResponsesErrorDetail {
                    code: None,
                    message: "response failed".to_owned(),
                });
                vec![StreamEvent::error(error.message, error.code)]
            }

            ResponsesStreamEvent::Error { code, message, .. } => vec![StreamEvent::error(message, code)],

            _ => Vec::new(),
        }
    }
}

impl StreamParser for ResponsesStreamParser {
    fn parse(&mut self, chunk: &Value) -> Result<Vec<StreamEvent>, AdapterError> {
        let event: ResponsesStreamEvent =
            serde_json::from_value(chunk.clone()).map_err(AdapterError::deserialize("responses stream event"))?;
        let events = self.convert(event);
        Ok(events
            .into_iter()
            .map(|e| {
                if e.id.is_some() {
                    e
                } else {
                    e.with_identity(self.id.clone(), self.model.clone())
                }
            })
            .collect())
    }
}
