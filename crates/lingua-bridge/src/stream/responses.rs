//! IR events to Responses API SSE events

use super::{Block, BlockKind, BlockTracker, SseFrame, StreamEventBuilder, Transition};
use crate::convert::responses::{
    function_call_item, message_item, new_item_id, terminal_status, usage_to_wire,
};
use crate::ir::{FinishReason, StreamEvent, StreamEventKind, ToolCallDelta, Usage, unix_now};
use crate::protocol::responses::{
    ResponsesContentPart, ResponsesFunctionCall, ResponsesItem, ResponsesMessage, ResponsesMessageContent,
    ResponsesReasoningItem, ResponsesResponse, ResponsesStreamEvent, ResponsesSummaryText,
};

/// Output item being streamed
#[derive(Debug, Default)]
struct OpenItem {
    id: String,
    text: String,
    call_id: String,
    name: String,
}

/// Builds `response.*` event sequences
///
/// Each content block maps to one output item; `output_index` is the block
/// index. Every event carries a monotonically increasing `sequence_number`.
#[derive(Debug)]
pub struct ResponsesStreamBuilder {
    tracker: BlockTracker,
    created_at: u64,
    sequence: u64,
    open: OpenItem,
    output: Vec<ResponsesItem>,
    usage: Option<Usage>,
}

impl Default for ResponsesStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsesStreamBuilder {
    pub fn new() -> Self {
        Self {
            tracker: BlockTracker::new(),
            created_at: unix_now(),
            sequence: 0,
            open: OpenItem::default(),
            output: Vec::new(),
            usage: None,
        }
    }

    fn emit(&mut self, event: &ResponsesStreamEvent) -> SseFrame {
        let mut frame = SseFrame::data(event);
        if let Some(map) = frame.data.as_object_mut() {
            map.insert("sequence_number".to_owned(), self.sequence.into());
        }
        self.sequence += 1;
        frame.event = frame.data.get("type").and_then(|t| t.as_str()).map(str::to_owned);
        frame
    }

    fn response(&mut self, status: &str) -> ResponsesResponse {
        ResponsesResponse {
            id: self.tracker.message_id("resp_"),
            object: "response".to_owned(),
            created_at: self.created_at,
            model: self.tracker.model(),
            status: Some(status.to_owned()),
            output: Vec::new(),
            usage: None,
            incomplete_details: None,
            error: None,
        }
    }

    fn apply(&mut self, frames: &mut Vec<SseFrame>, transition: Transition, call: Option<&ToolCallDelta>) {
        if let Some(closed) = transition.closed {
            self.close_frames(frames, closed);
        }
        if let Some(opened) = transition.opened {
            self.open_frames(frames, opened, call);
        }
    }

    fn open_frames(&mut self, frames: &mut Vec<SseFrame>, block: Block, call: Option<&ToolCallDelta>) {
        let output_index = block.index;
        match block.kind {
            BlockKind::Text => {
                self.open = OpenItem {
                    id: new_item_id("msg_"),
                    ..OpenItem::default()
                };
                let added = ResponsesStreamEvent::OutputItemAdded {
                    output_index,
                    item: ResponsesItem::Message(ResponsesMessage {
                        id: Some(self.open.id.clone()),
                        role: "assistant".to_owned(),
                        content: ResponsesMessageContent::Parts(Vec::new()),
                        status: Some("in_progress".to_owned()),
                    }),
                };
                frames.push(self.emit(&added));
                let part = ResponsesStreamEvent::ContentPartAdded {
                    item_id: self.open.id.clone(),
                    output_index,
                    content_index: 0,
                    part: ResponsesContentPart::OutputText {
                        text: String::new(),
                        annotations: Vec::new(),
                    },
                };
                frames.push(self.emit(&part));
            }
            BlockKind::Thinking => {
                self.open = OpenItem {
                    id: new_item_id("rs_"),
                    ..OpenItem::default()
                };
                let added = ResponsesStreamEvent::OutputItemAdded {
                    output_index,
                    item: ResponsesItem::Reasoning(ResponsesReasoningItem {
                        id: Some(self.open.id.clone()),
                        summary: Vec::new(),
                        encrypted_content: None,
                    }),
                };
                frames.push(self.emit(&added));
                let part = ResponsesStreamEvent::ReasoningSummaryPartAdded {
                    item_id: self.open.id.clone(),
                    output_index,
                    summary_index: 0,
                    part: ResponsesSummaryText::new(""),
                };
                frames.push(self.emit(&part));
            }
            BlockKind::ToolUse => {
                self.open = OpenItem {
                    id: new_item_id("fc_"),
                    text: String::new(),
                    call_id: call
                        .and_then(|c| c.id.clone())
                        .unwrap_or_else(|| new_item_id("call_")),
                    name: call.and_then(|c| c.name.clone()).unwrap_or_default(),
                };
                let added = ResponsesStreamEvent::OutputItemAdded {
                    output_index,
                    item: ResponsesItem::FunctionCall(ResponsesFunctionCall {
                        id: Some(self.open.id.clone()),
                        call_id: self.open.call_id.clone(),
                        name: self.open.name.clone(),
                        arguments: String::new(),
                        status: Some("in_progress".to_owned()),
                    }),
                };
                frames.push(self.emit(&added));
            }
        }
    }

    fn close_frames(&mut self, frames: &mut Vec<SseFrame>, block: Block) {
        let output_index = block.index;
        let open = std::mem::take(&mut self.open);
        let item = match block.kind {
            BlockKind::Text => {
                let done = ResponsesStreamEvent::OutputTextDone {
                    item_id: open.id.clone(),
                    output_index,
                    content_index: 0,
                    text: open.text.clone(),
                };
                frames.push(self.emit(&done));
                let part = ResponsesStreamEvent::ContentPartDone {
                    item_id: open.id.clone(),
                    output_index,
                    content_index: 0,
                    part: ResponsesContentPart::OutputText {
                        text: open.text.clone(),
                        annotations: Vec::new(),
                    },
                };
                frames.push(self.emit(&part));
                message_item(open.id, open.text)
            }
            BlockKind::Thinking => {
                let done = ResponsesStreamEvent::ReasoningSummaryTextDone {
                    item_id: open.id.clone(),
                    output_index,
                    summary_index: 0,
                    text: open.text.clone(),
                };
                frames.push(self.emit(&done));
                let part = ResponsesStreamEvent::ReasoningSummaryPartDone {
                    item_id: open.id.clone(),
                    output_index,
                    summary_index: 0,
                    part: ResponsesSummaryText::new(open.text.clone()),
                };
                frames.push(self.emit(&part));
                ResponsesItem::Reasoning(ResponsesReasoningItem {
                    id: Some(open.id),
                    summary: vec![ResponsesSummaryText::new(open.text)],
                    encrypted_content: None,
                })
            }
            BlockKind::ToolUse => {
                let done = ResponsesStreamEvent::FunctionCallArgumentsDone {
                    item_id: open.id.clone(),
                    output_index,
                    arguments: open.text.clone(),
                };
                frames.push(self.emit(&done));
                function_call_item(open.id, &open.call_id, &open.name, &open.text)
            }
        };

        let done = ResponsesStreamEvent::OutputItemDone {
            output_index,
            item: item.clone(),
        };
        frames.push(self.emit(&done));
        self.output.push(item);
    }

    fn close(&mut self, frames: &mut Vec<SseFrame>) {
        if let Some(block) = self.tracker.close() {
            self.close_frames(frames, block);
        }
    }

    fn tool_call(&mut self, frames: &mut Vec<SseFrame>, call: &ToolCallDelta) {
        let opens_new = call.id.is_some()
            || call.name.is_some()
            || self
                .tracker
                .current()
                .is_none_or(|block| block.kind != BlockKind::ToolUse || block.tool_index != Some(call.index));
        if opens_new {
            let transition = self.tracker.enter(BlockKind::ToolUse, Some(call.index));
            self.apply(frames, transition, Some(call));
        }

        if let Some(arguments) = call.arguments.as_deref().filter(|a| !a.is_empty()) {
            self.open.text.push_str(arguments);
            let delta = ResponsesStreamEvent::FunctionCallArgumentsDelta {
                item_id: self.open.id.clone(),
                output_index: self.tracker.content_index(),
                delta: arguments.to_owned(),
            };
            frames.push(self.emit(&delta));
        }
    }
}

impl StreamEventBuilder for ResponsesStreamBuilder {
    fn process(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        if let StreamEventKind::Error { message, code } = &event.kind {
            let error = ResponsesStreamEvent::Error {
                code: code.clone(),
                message: message.clone(),
                param: None,
            };
            frames.push(self.emit(&error));
            return frames;
        }

        if self.tracker.has_ended() {
            return frames;
        }

        if self.tracker.start(event) {
            let created = ResponsesStreamEvent::Created {
                response: self.response("in_progress"),
            };
            frames.push(self.emit(&created));
        }

        match &event.kind {
            StreamEventKind::Start | StreamEventKind::Error { .. } => {}
            StreamEventKind::Content { delta, .. } if !delta.is_empty() => {
                let transition = self.tracker.enter(BlockKind::Text, None);
                self.apply(&mut frames, transition, None);
                self.open.text.push_str(delta);
                let delta = ResponsesStreamEvent::OutputTextDelta {
                    item_id: self.open.id.clone(),
                    output_index: self.tracker.content_index(),
                    content_index: 0,
                    delta: delta.clone(),
                };
                frames.push(self.emit(&delta));
            }
            StreamEventKind::Reasoning { delta, .. } if !delta.is_empty() => {
                let transition = self.tracker.enter(BlockKind::Thinking, None);
                self.apply(&mut frames, transition, None);
                self.open.text.push_str(delta);
                let delta = ResponsesStreamEvent::ReasoningSummaryTextDelta {
                    item_id: self.open.id.clone(),
                    output_index: self.tracker.content_index(),
                    summary_index: 0,
                    delta: delta.clone(),
                };
                frames.push(self.emit(&delta));
            }
            StreamEventKind::Content { .. } | StreamEventKind::Reasoning { .. } => {}
            StreamEventKind::ToolCall(call) => self.tool_call(&mut frames, call),
            StreamEventKind::End { finish_reason, usage } => {
                self.close(&mut frames);
                if let Some(usage) = usage {
                    self.tracker.record_usage(usage);
                    self.usage = Some(usage.clone());
                }
                let (status, incomplete_details) = terminal_status(finish_reason.unwrap_or(FinishReason::Stop));
                let mut response = self.response(status);
                response.output = std::mem::take(&mut self.output);
                response.usage = self.usage.as_ref().map(usage_to_wire);
                response.incomplete_details = incomplete_details;

                let terminal = if status == "completed" {
                    ResponsesStreamEvent::Completed { response }
                } else {
                    ResponsesStreamEvent::Incomplete { response }
                };
                frames.push(self.emit(&terminal));
                self.tracker.mark_ended();
            }
        }

        frames
    }

    fn finalize(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if !self.tracker.has_ended() {
            self.close(&mut frames);
        }
        frames
    }
}
