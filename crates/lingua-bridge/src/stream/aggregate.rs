//! Fold a stream of IR events back into a complete response

use std::collections::BTreeMap;

use crate::ir::{
    Choice, Content, Extensions, FinishReason, LlmResponse, Message, Role, StreamEvent, StreamEventKind, ToolCall,
    Usage, unix_now,
};

/// Error reported inside the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub message: String,
    pub code: Option<String>,
}

/// Accumulates stream events into an [`LlmResponse`]
///
/// Tool call fragments are merged by index, so deltas may arrive in any
/// interleaving.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    id: Option<String>,
    model: Option<String>,
    text: String,
    reasoning: String,
    tool_calls: BTreeMap<u32, ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    ended: bool,
    failure: Option<StreamFailure>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &StreamEvent) {
        if self.id.is_none() {
            self.id.clone_from(&event.id);
        }
        if self.model.is_none() {
            self.model.clone_from(&event.model);
        }

        match &event.kind {
            StreamEventKind::Start => {}
            StreamEventKind::Content { delta, .. } => self.text.push_str(delta),
            StreamEventKind::Reasoning { delta, .. } => self.reasoning.push_str(delta),
            StreamEventKind::ToolCall(delta) => {
                let call = self
                    .tool_calls
                    .entry(delta.index)
                    .or_insert_with(|| ToolCall::function("", "", ""));
                if let Some(id) = &delta.id {
                    call.id.clone_from(id);
                }
                if let Some(name) = &delta.name {
                    call.function.name.push_str(name);
                }
                if let Some(arguments) = &delta.arguments {
                    call.function.arguments.push_str(arguments);
                }
            }
            StreamEventKind::End { finish_reason, usage } => {
                self.ended = true;
                if finish_reason.is_some() {
                    self.finish_reason = *finish_reason;
                }
                if usage.is_some() {
                    self.usage.clone_from(usage);
                }
            }
            StreamEventKind::Error { message, code } => {
                self.failure.get_or_insert_with(|| StreamFailure {
                    message: message.clone(),
                    code: code.clone(),
                });
            }
        }
    }

    /// Whether an `End` event was seen
    pub const fn is_complete(&self) -> bool {
        self.ended
    }

    /// First error the stream reported
    pub const fn failure(&self) -> Option<&StreamFailure> {
        self.failure.as_ref()
    }

    pub fn into_response(self) -> LlmResponse {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .enumerate()
            .map(|(i, mut call)| {
                if call.id.is_empty() {
                    call.id = format!("call_{i}");
                }
                call
            })
            .collect();

        let finish_reason = self.finish_reason.or_else(|| {
            self.ended.then(|| {
                if tool_calls.is_empty() {
                    FinishReason::Stop
                } else {
                    FinishReason::ToolCalls
                }
            })
        });

        let message = Message {
            role: Role::Assistant,
            content: Content::Text(self.text),
            name: None,
            tool_call_id: None,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            reasoning_content: (!self.reasoning.is_empty()).then_some(self.reasoning),
        };

        LlmResponse {
            id: self
                .id
                .unwrap_or_else(|| format!("resp_{}", uuid::Uuid::new_v4().simple())),
            model: self.model.unwrap_or_default(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason,
                logprobs: None,
            }],
            usage: self.usage,
            created: Some(unix_now()),
            system_fingerprint: None,
            extensions: Extensions::default(),
            raw: None,
        }
    }
}
