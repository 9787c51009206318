//! IR events to Gemini `streamGenerateContent` chunks

use serde_json::json;

use super::{BlockTracker, SseFrame, StreamEventBuilder};
use crate::convert::gemini::{finish_reason_to_wire, usage_to_wire};
use crate::ir::error::classify_code;
use crate::ir::{ErrorType, FinishReason, StreamEvent, StreamEventKind, ToolCallDelta, Usage, parse_arguments};
use crate::protocol::gemini::{GeminiCandidate, GeminiContent, GeminiFunctionCall, GeminiPart, GeminiResponse};

/// Function call being accumulated until it can be sent whole
#[derive(Debug)]
struct PendingCall {
    index: u32,
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Builds Gemini response chunks, one per SSE `data:` line
///
/// Text and thoughts go out as they arrive. Gemini has no argument deltas,
/// so a function call is held until its arguments are complete.
#[derive(Debug, Default)]
pub struct GeminiStreamBuilder {
    tracker: BlockTracker,
    pending: Option<PendingCall>,
}

impl GeminiStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn chunk(&mut self, parts: Vec<GeminiPart>, finish_reason: Option<String>, usage: Option<&Usage>) -> SseFrame {
        let response = GeminiResponse {
            candidates: vec![GeminiCandidate {
                content: GeminiContent {
                    role: Some("model".to_owned()),
                    parts,
                },
                finish_reason,
                index: Some(0),
            }],
            usage_metadata: usage.map(usage_to_wire),
            model_version: Some(self.tracker.model()),
            response_id: Some(self.tracker.message_id("gemini-")),
        };
        SseFrame::data(&response)
    }

    fn flush_call(&mut self) -> Option<SseFrame> {
        let call = self.pending.take()?;
        let part = GeminiPart {
            function_call: Some(GeminiFunctionCall {
                id: call.id,
                name: call.name,
                args: parse_arguments(&call.arguments),
            }),
            ..GeminiPart::default()
        };
        Some(self.chunk(vec![part], None, None))
    }

    fn tool_call(&mut self, frames: &mut Vec<SseFrame>, delta: &ToolCallDelta) {
        if self.pending.as_ref().is_some_and(|call| call.index != delta.index) {
            frames.extend(self.flush_call());
        }
        let call = self.pending.get_or_insert_with(|| PendingCall {
            index: delta.index,
            id: None,
            name: String::new(),
            arguments: String::new(),
        });
        if let Some(id) = &delta.id {
            call.id = Some(id.clone());
        }
        if let Some(name) = &delta.name {
            call.name.push_str(name);
        }
        if let Some(arguments) = &delta.arguments {
            call.arguments.push_str(arguments);
        }
    }
}

/// Google RPC status name for an error category
const fn rpc_status(error_type: ErrorType) -> (u16, &'static str) {
    match error_type {
        ErrorType::Validation => (400, "INVALID_ARGUMENT"),
        ErrorType::Authentication => (401, "UNAUTHENTICATED"),
        ErrorType::Permission => (403, "PERMISSION_DENIED"),
        ErrorType::NotFound => (404, "NOT_FOUND"),
        ErrorType::RateLimit => (429, "RESOURCE_EXHAUSTED"),
        ErrorType::Server | ErrorType::Network => (503, "UNAVAILABLE"),
        ErrorType::Api | ErrorType::Unknown => (500, "INTERNAL"),
    }
}

impl StreamEventBuilder for GeminiStreamBuilder {
    fn process(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        if let StreamEventKind::Error { message, code } = &event.kind {
            let (status_code, status) = rpc_status(code.as_deref().map_or(ErrorType::Unknown, classify_code));
            frames.push(SseFrame::data(&json!({
                "error": {"code": status_code, "message": message, "status": status}
            })));
            return frames;
        }

        if self.tracker.has_ended() {
            return frames;
        }
        self.tracker.start(event);

        match &event.kind {
            StreamEventKind::Start | StreamEventKind::Error { .. } => {}
            StreamEventKind::Content { delta, .. } | StreamEventKind::Reasoning { delta, .. } if delta.is_empty() => {}
            StreamEventKind::Content { delta, .. } => {
                frames.extend(self.flush_call());
                let frame = self.chunk(vec![GeminiPart::text(delta.clone())], None, None);
                frames.push(frame);
            }
            StreamEventKind::Reasoning { delta, .. } => {
                frames.extend(self.flush_call());
                let frame = self.chunk(vec![GeminiPart::thought(delta.clone())], None, None);
                frames.push(frame);
            }
            StreamEventKind::ToolCall(delta) => self.tool_call(&mut frames, delta),
            StreamEventKind::End { finish_reason, usage } => {
                frames.extend(self.flush_call());
                let reason = finish_reason_to_wire(finish_reason.unwrap_or(FinishReason::Stop)).to_owned();
                let frame = self.chunk(Vec::new(), Some(reason), usage.as_ref());
                frames.push(frame);
                self.tracker.mark_ended();
            }
        }

        frames
    }

    fn finalize(&mut self) -> Vec<SseFrame> {
        if self.tracker.has_ended() {
            return Vec::new();
        }
        self.flush_call().into_iter().collect()
    }
}
