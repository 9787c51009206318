//! Conversion between the IR and the Anthropic Messages format

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::error::AdapterError;
use crate::ir::{
    Content, ContentPart, ErrorIr, FinishReason, GenerationConfig, ImageSource, LlmRequest, LlmResponse, Message,
    Role, StreamEvent, ThinkingConfig, Tool, ToolCall, ToolCallDelta, ToolChoice, Usage, UsageDetails,
};
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest,
    AnthropicResponse, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicSystem,
    AnthropicThinking, AnthropicTool, AnthropicToolChoice, AnthropicToolResultContent, AnthropicUsage,
};
use crate::stream::StreamParser;

/// Provider tag for extensions
pub const TAG: &str = "anthropic";

/// Default max tokens when not specified (Anthropic requires this field)
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Smallest thinking budget Anthropic accepts
pub const MIN_THINKING_BUDGET: u32 = 1024;

// -- Inbound: Anthropic wire format -> IR --

/// Lift a Messages request into the IR
pub fn request_to_ir(req: AnthropicRequest) -> LlmRequest {
    let mut ir = LlmRequest {
        model: req.model,
        stream: req.stream.unwrap_or(false),
        tools: req.tools.map(|tools| tools.into_iter().map(Into::into).collect()),
        tool_choice: req.tool_choice.as_ref().and_then(tool_choice_to_ir),
        generation: GenerationConfig {
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            max_tokens: Some(req.max_tokens),
            stop_sequences: req.stop_sequences,
            thinking: req.thinking.map(|t| ThinkingConfig {
                enabled: t.thinking_type == "enabled",
                budget_tokens: t.budget_tokens,
                effort: None,
            }),
            ..GenerationConfig::default()
        },
        metadata: req.metadata.unwrap_or_default(),
        ..LlmRequest::default()
    };

    if let Some(system) = req.system {
        ir.push_system(&system.into_text());
    }

    for msg in req.messages {
        ir.messages.extend(lift_message(msg));
    }

    ir.extensions.insert_fields(TAG, req.extra);
    ir
}

/// Lift one Anthropic message into one or more IR messages
///
/// `tool_result` blocks become separate tool messages placed before any
/// remaining user content; `tool_use` and `thinking` blocks attach to the
/// assistant message.
fn lift_message(msg: AnthropicMessage) -> Vec<Message> {
    let role = if msg.role == "assistant" { Role::Assistant } else { Role::User };

    let blocks = match msg.content {
        AnthropicContent::Text(text) => return vec![Message::text(role, text)],
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut lifted = Vec::new();
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut reasoning: Vec<String> = Vec::new();

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            AnthropicContentBlock::Image { source } => parts.push(ContentPart::Image {
                source: image_source_to_ir(source),
            }),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::function(id, name, input.to_string()));
            }
            AnthropicContentBlock::ToolResult {
                tool_use_id, content, ..
            } => {
                let text = content.map(AnthropicToolResultContent::into_text).unwrap_or_default();
                lifted.push(Message::tool_result(tool_use_id, text));
            }
            AnthropicContentBlock::Thinking { thinking, .. } => reasoning.push(thinking),
            AnthropicContentBlock::RedactedThinking { .. } => {}
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

fn image_source_to_ir(source: AnthropicImageSource) -> ImageSource {
    match (source.data, source.url) {
        (Some(data), _) => ImageSource::Base64 {
            media_type: source.media_type.unwrap_or_else(|| "image/png".to_owned()),
            data,
        },
        (None, Some(url)) => ImageSource::Url { url },
        (None, None) => ImageSource::Url { url: String::new() },
    }
}

impl From<AnthropicTool> for Tool {
    fn from(tool: AnthropicTool) -> Self {
        Self::function(tool.name, tool.description, Some(tool.input_schema))
    }
}

fn tool_choice_to_ir(choice: &AnthropicToolChoice) -> Option<ToolChoice> {
    match choice.choice_type.as_str() {
        "auto" => Some(ToolChoice::Auto),
        "any" => Some(ToolChoice::Required),
        "none" => Some(ToolChoice::None),
        "tool" => choice.name.clone().map(|name| ToolChoice::Function { name }),
        _ => None,
    }
}

/// Map a stop reason onto the IR
pub fn finish_reason_to_ir(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" | "model_context_window_exceeded" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Map an IR finish reason onto a stop reason
pub const fn finish_reason_to_wire(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
        FinishReason::ContentFilter => "refusal",
    }
}

/// Lift a Messages response into the IR
pub fn response_to_ir(resp: AnthropicResponse) -> LlmResponse {
    let mut text = String::new();
    let mut reasoning = Vec::new();
    let mut tool_calls = Vec::new();

    for block in resp.content {
        match block {
            AnthropicContentBlock::Text { text: chunk } => text.push_str(&chunk),
            AnthropicContentBlock::Thinking { thinking, .. } => reasoning.push(thinking),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::function(id, name, input.to_string()));
            }
            _ => {}
        }
    }

    let message = Message {
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        reasoning_content: (!reasoning.is_empty()).then(|| reasoning.join("\n")),
        ..Message::assistant(text)
    };

    let mut ir = LlmResponse::single(
        resp.id,
        resp.model,
        message,
        resp.stop_reason.as_deref().map(finish_reason_to_ir),
    );
    ir.usage = Some(usage_to_ir(&resp.usage));
    ir
}

fn usage_to_ir(usage: &AnthropicUsage) -> Usage {
    Usage::new(usage.input_tokens, usage.output_tokens).with_details(UsageDetails {
        cache_creation_tokens: usage.cache_creation_input_tokens,
        cache_read_tokens: usage.cache_read_input_tokens,
        ..UsageDetails::default()
    })
}

// -- Outbound: IR -> Anthropic wire format --

/// Lower the IR into a Messages request
pub fn ir_to_request(ir: &LlmRequest) -> AnthropicRequest {
    let mut system = ir.system.clone().unwrap_or_default();
    let mut messages: Vec<AnthropicMessage> = Vec::new();

    for msg in &ir.messages {
        match msg.role {
            Role::System => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&msg.content.as_text());
            }
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: Some(AnthropicToolResultContent::Text(msg.content.as_text())),
                    is_error: None,
                };
                // Consecutive results answer the same assistant turn
                match messages.last_mut() {
                    Some(AnthropicMessage {
                        role,
                        content: AnthropicContent::Blocks(blocks),
                    }) if role == "user"
                        && blocks.iter().all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. })) =>
                    {
                        blocks.push(block);
                    }
                    _ => messages.push(AnthropicMessage {
                        role: "user".to_owned(),
                        content: AnthropicContent::Blocks(vec![block]),
                    }),
                }
            }
            Role::User | Role::Assistant => messages.push(message_to_wire(msg)),
        }
    }

    let thinking = ir.generation.thinking.as_ref().map(|t| AnthropicThinking {
        thinking_type: if t.enabled { "enabled" } else { "disabled" }.to_owned(),
        budget_tokens: t
            .enabled
            .then(|| t.budget_tokens.unwrap_or(MIN_THINKING_BUDGET).max(MIN_THINKING_BUDGET)),
    });

    let mut max_tokens = ir.generation.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if let Some(budget) = thinking.as_ref().and_then(|t| t.budget_tokens)
        && max_tokens <= budget
    {
        max_tokens = budget.saturating_add(DEFAULT_MAX_TOKENS);
    }

    let metadata = ir
        .metadata
        .get("user_id")
        .or_else(|| ir.metadata.get("user"))
        .and_then(Value::as_str)
        .map(|user| {
            let mut map = Map::new();
            map.insert("user_id".to_owned(), Value::String(user.to_owned()));
            map
        });

    AnthropicRequest {
        model: ir.model.clone(),
        max_tokens,
        system: (!system.is_empty()).then_some(AnthropicSystem::Text(system)),
        messages,
        temperature: ir.generation.temperature,
        top_p: ir.generation.top_p,
        top_k: ir.generation.top_k,
        stop_sequences: ir.generation.stop_sequences.clone(),
        stream: ir.stream.then_some(true),
        tools: ir.tools.as_ref().filter(|tools| !tools.is_empty()).map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                })
                .collect()
        }),
        tool_choice: ir.tool_choice.as_ref().map(tool_choice_to_wire),
        thinking,
        metadata,
        extra: ir.extensions.fields(TAG),
    }
}

fn message_to_wire(msg: &Message) -> AnthropicMessage {
    let role = if msg.role == Role::Assistant { "assistant" } else { "user" };

    if msg.tool_calls().is_empty()
        && let Content::Text(text) = &msg.content
    {
        return AnthropicMessage {
            role: role.to_owned(),
            content: AnthropicContent::Text(text.clone()),
        };
    }

    let mut blocks: Vec<AnthropicContentBlock> = msg
        .content
        .parts()
        .into_iter()
        .filter(|part| !matches!(part, ContentPart::Text { text } if text.is_empty()))
        .map(|part| match part {
            ContentPart::Text { text } => AnthropicContentBlock::Text { text },
            ContentPart::Image { source } => AnthropicContentBlock::Image {
                source: image_source_to_wire(source),
            },
        })
        .collect();

    for call in msg.tool_calls() {
        blocks.push(AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: call.arguments_value(),
        });
    }

    AnthropicMessage {
        role: role.to_owned(),
        content: AnthropicContent::Blocks(blocks),
    }
}

fn image_source_to_wire(source: ImageSource) -> AnthropicImageSource {
    match source {
        ImageSource::Base64 { media_type, data } => AnthropicImageSource {
            source_type: "base64".to_owned(),
            media_type: Some(media_type),
            data: Some(data),
            url: None,
        },
        ImageSource::Url { url } => AnthropicImageSource {
            source_type: "url".to_owned(),
            media_type: None,
            data: None,
            url: Some(url),
        },
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto => ("auto", None),
        ToolChoice::None => ("none", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Function { name } => ("tool", Some(name.clone())),
    };
    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

/// Lower an IR response into a Messages response body
pub fn ir_to_response(ir: &LlmResponse) -> AnthropicResponse {
    let choice = ir.choices.first();
    let mut content = Vec::new();

    if let Some(choice) = choice {
        let message = &choice.message;
        if let Some(reasoning) = message.reasoning_content.as_deref().filter(|r| !r.is_empty()) {
            content.push(AnthropicContentBlock::Thinking {
                thinking: reasoning.to_owned(),
                signature: String::new(),
            });
        }
        let text = message.content.as_text();
        if !text.is_empty() {
            content.push(AnthropicContentBlock::Text { text });
        }
        for call in message.tool_calls() {
            content.push(AnthropicContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.function.name.clone(),
                input: call.arguments_value(),
            });
        }
    }

    let usage = ir.usage.clone().unwrap_or_default();
    let details = usage.details_or_default();

    AnthropicResponse {
        id: ir.id.clone(),
        response_type: "message".to_owned(),
        role: "assistant".to_owned(),
        content,
        model: ir.model.clone(),
        stop_reason: Some(
            finish_reason_to_wire(choice.and_then(|c| c.finish_reason).unwrap_or(FinishReason::Stop)).to_owned(),
        ),
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_creation_input_tokens: details.cache_creation_tokens,
            cache_read_input_tokens: details.cache_read_tokens.or(details.cached_tokens),
        },
    }
}

/// Parse an Anthropic error body
pub fn parse_error_body(wire: &Value, status: Option<u16>) -> ErrorIr {
    let error = wire.get("error").unwrap_or(wire);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown upstream error");
    let code = error.get("type").and_then(Value::as_str).map(str::to_owned);
    ErrorIr::from_upstream(message, code, status, wire)
}

// -- Streaming: Anthropic events -> IR events --

/// Per-stream state for Messages SSE events
///
/// Anthropic's content block index is shared across all block types, so tool
/// calls get their own sequential index.
#[derive(Debug, Default)]
pub struct AnthropicStreamParser {
    id: Option<String>,
    model: Option<String>,
    /// Content block index to tool call index
    tool_blocks: HashMap<u32, u32>,
    next_tool_index: u32,
    input_tokens: u32,
    cache_creation_tokens: Option<u32>,
    cache_read_tokens: Option<u32>,
}

impl AnthropicStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn convert(&mut self, event: AnthropicStreamEvent) -> Vec<StreamEvent> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.id = Some(message.id);
                self.model = Some(message.model).filter(|m| !m.is_empty());
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                    self.cache_creation_tokens = usage.cache_creation_input_tokens;
                    self.cache_read_tokens = usage.cache_read_input_tokens;
                }
                vec![StreamEvent::start(self.id.clone(), self.model.clone())]
            }

            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamContentBlock::Text { text } if !text.is_empty() => vec![StreamEvent::content(text)],
                AnthropicStreamContentBlock::Thinking { thinking } if !thinking.is_empty() => {
                    vec![StreamEvent::reasoning(thinking)]
                }
                AnthropicStreamContentBlock::ToolUse { id, name, .. } => {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_blocks.insert(index, tool_index);
                    vec![StreamEvent::tool_call(ToolCallDelta {
                        index: tool_index,
                        id: Some(id),
                        name: Some(name),
                        arguments: None,
                    })]
                }
                _ => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![StreamEvent::content(text)],
                AnthropicStreamDelta::ThinkingDelta { thinking } => vec![StreamEvent::reasoning(thinking)],
                AnthropicStreamDelta::InputJsonDelta { partial_json } if !partial_json.is_empty() => {
                    let tool_index = self.tool_blocks.get(&index).copied().unwrap_or(index);
                    vec![StreamEvent::tool_call(ToolCallDelta {
                        index: tool_index,
                        arguments: Some(partial_json),
                        ..ToolCallDelta::default()
                    })]
                }
                AnthropicStreamDelta::InputJsonDelta { .. } | AnthropicStreamDelta::SignatureDelta { .. } => {
                    Vec::new()
                }
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let usage = usage.map(|u| {
                    let input_tokens = if u.input_tokens > 0 { u.input_tokens } else { self.input_tokens };
                    Usage::new(input_tokens, u.output_tokens).with_details(UsageDetails {
                        cache_creation_tokens: u.cache_creation_input_tokens.or(self.cache_creation_tokens),
                        cache_read_tokens: u.cache_read_input_tokens.or(self.cache_read_tokens),
                        ..UsageDetails::default()
                    })
                });
                let finish = delta.stop_reason.as_deref().map(finish_reason_to_ir);
                vec![StreamEvent::end(finish, usage)]
            }

            AnthropicStreamEvent::Error { error } => vec![StreamEvent::error(error.message, Some(error.error_type))],

            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping => Vec::new(),
        }
    }
}

impl StreamParser for AnthropicStreamParser {
    fn parse(&mut self, chunk: &Value) -> Result<Vec<StreamEvent>, AdapterError> {
        let event: AnthropicStreamEvent =
            serde_json::from_value(chunk.clone()).map_err(AdapterError::deserialize("anthropic stream event"))?;
        let (id, model) = (self.id.clone(), self.model.clone());
        Ok(self
            .convert(event)
            .into_iter()
            .map(|e| {
                if e.id.is_some() {
                    e
                } else {
                    e.with_identity(id.clone(), model.clone())
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StreamEventKind;

    fn parse(wire: Value) -> LlmRequest {
        request_to_ir(serde_json::from_value(wire).unwrap())
    }

    #[test]
    fn tool_results_are_lifted_into_tool_messages() {
        let ir = parse(json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 256,
            "system": [{"type": "text", "text": "Be brief."}],
            "messages": [
                {"role": "user", "content": "weather in Paris and Rome?"},
                {"role": "assistant", "content": [
                    {"type": "thinking", "thinking": "two lookups", "signature": "sig"},
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Paris"}},
                    {"type": "tool_use", "id": "toolu_2", "name": "weather", "input": {"city": "Rome"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "sunny"},
                    {"type": "tool_result", "tool_use_id": "toolu_2", "content": [{"type": "text", "text": "rainy"}]},
                    {"type": "text", "text": "Summarize."}
                ]}
            ]
        }));

        assert_eq!(ir.system.as_deref(), Some("Be brief."));
        assert_eq!(ir.messages.len(), 5);

        let assistant = &ir.messages[1];
        assert_eq!(assistant.reasoning_content.as_deref(), Some("two lookups"));
        assert_eq!(assistant.tool_calls().len(), 2);
        assert_eq!(assistant.content, Content::Text("Checking.".to_owned()));

        assert_eq!(ir.messages[2].role, Role::Tool);
        assert_eq!(ir.messages[2].tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(ir.messages[3].content.as_text(), "rainy");
        assert_eq!(ir.messages[4].role, Role::User);
        assert_eq!(ir.messages[4].content.as_text(), "Summarize.");
    }

    #[test]
    fn consecutive_tool_results_share_one_user_message() {
        let ir = LlmRequest {
            messages: vec![
                Message::user("go"),
                Message {
                    tool_calls: Some(vec![
                        ToolCall::function("a", "f", "{}"),
                        ToolCall::function("b", "f", "{}"),
                    ]),
                    ..Message::assistant("")
                },
                Message::tool_result("a", "1"),
                Message::tool_result("b", "2"),
            ],
            ..LlmRequest::default()
        };

        let wire = serde_json::to_value(ir_to_request(&ir)).unwrap();
        let messages = wire["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "b");
        assert_eq!(wire["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn request_round_trip() {
        let wire = json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 512,
            "system": "Be brief.",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ],
            "tools": [{"name": "lookup", "input_schema": {"type": "object"}}],
            "tool_choice": {"type": "any"},
            "temperature": 0.5,
            "top_k": 40,
            "stop_sequences": ["###"]
        });

        let ir = parse(wire);
        let again = request_to_ir(ir_to_request(&ir));

        assert_eq!(again.model, ir.model);
        assert_eq!(again.system, ir.system);
        assert_eq!(again.messages, ir.messages);
        assert_eq!(again.tools, ir.tools);
        assert_eq!(again.tool_choice, Some(ToolChoice::Required));
        assert_eq!(again.generation, ir.generation);
    }

    #[test]
    fn stream_parser_indexes_tools_separately() {
        let mut parser = AnthropicStreamParser::new();
        let chunks = [
            json!({"type": "message_start", "message": {"id": "msg_1", "type": "message", "role": "assistant", "content": [], "model": "claude", "usage": {"input_tokens": 12, "output_tokens": 1}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "f", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"a\":1}"}}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 9}}),
            json!({"type": "message_stop"}),
        ];

        let events: Vec<StreamEvent> = chunks.iter().flat_map(|c| parser.parse(c).unwrap()).collect();

        assert_eq!(events.len(), 5);
        assert_eq!(events[0].kind, StreamEventKind::Start);
        assert!(matches!(&events[2].kind, StreamEventKind::ToolCall(d) if d.index == 0 && d.name.as_deref() == Some("f")));
        assert!(matches!(&events[3].kind, StreamEventKind::ToolCall(d) if d.index == 0 && d.arguments.is_some()));
        assert_eq!(
            events[4].kind,
            StreamEventKind::End {
                finish_reason: Some(FinishReason::ToolCalls),
                usage: Some(Usage::new(12, 9)),
            }
        );
        assert!(events.iter().all(|e| e.id.as_deref() == Some("msg_1")));
    }

    #[test]
    fn error_body_maps_type() {
        let error = parse_error_body(
            &json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
            None,
        );
        assert_eq!(error.error_type, crate::ir::ErrorType::Server);
        assert!(error.retryable);
        assert_eq!(error.code.as_deref(), Some("overloaded_error"));
    }

    #[test]
    fn response_keeps_thinking_and_cache_usage() {
        let ir = response_to_ir(
            serde_json::from_value(json!({
                "id": "msg_2",
                "type": "message",
                "role": "assistant",
                "model": "claude",
                "content": [
                    {"type": "thinking", "thinking": "hmm", "signature": "s"},
                    {"type": "text", "text": "Done"}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 3, "cache_read_input_tokens": 8}
            }))
            .unwrap(),
        );

        let message = ir.first_message().unwrap();
        assert_eq!(message.reasoning_content.as_deref(), Some("hmm"));
        assert_eq!(ir.usage.as_ref().and_then(|u| u.details.clone()).unwrap().cache_read_tokens, Some(8));

        let back = serde_json::to_value(ir_to_response(&ir)).unwrap();
        assert_eq!(back["content"][0]["type"], "thinking");
        assert_eq!(back["stop_reason"], "end_turn");
        assert_eq!(back["usage"]["cache_read_input_tokens"], 8);
    }

    #[test]
    fn tool_use_input_is_structured() {
        let call = ToolCall::function("t", "f", "{\"x\":2}");
        let msg = Message {
            tool_calls: Some(vec![call]),
            ..Message::assistant("")
        };
        let wire = serde_json::to_value(message_to_wire(&msg)).unwrap();
        assert_eq!(wire["content"][0]["input"], json!({"x": 2}));
    }
}
