//! IR events to Messages API SSE events

use serde_json::json;

use super::{Block, BlockKind, BlockTracker, SseFrame, StreamEventBuilder, Transition};
use crate::convert::anthropic::finish_reason_to_wire;
use crate::ir::{FinishReason, StreamEvent, StreamEventKind, ToolCallDelta};
use crate::protocol::anthropic::{
    AnthropicErrorDetail, AnthropicMessageDelta, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicStreamMessage, AnthropicUsage,
};

/// Builds `message_start` .. `message_stop` event sequences
///
/// Every delta lands in an open content block; switching block kind (or
/// tool call) closes the previous block first.
#[derive(Debug, Default)]
pub struct AnthropicStreamBuilder {
    tracker: BlockTracker,
}

fn frame(event: &AnthropicStreamEvent) -> SseFrame {
    SseFrame::named(event.event_name(), event)
}

fn stop_frame(block: Block) -> SseFrame {
    frame(&AnthropicStreamEvent::ContentBlockStop { index: block.index })
}

impl AnthropicStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the open content block
    pub const fn content_index(&self) -> u32 {
        self.tracker.content_index()
    }

    fn message_start(&mut self) -> SseFrame {
        frame(&AnthropicStreamEvent::MessageStart {
            message: AnthropicStreamMessage {
                id: self.tracker.message_id("msg_"),
                message_type: "message".to_owned(),
                role: "assistant".to_owned(),
                content: Vec::new(),
                model: self.tracker.model(),
                stop_reason: None,
                stop_sequence: None,
                usage: Some(AnthropicUsage::default()),
            },
        })
    }

    /// Emit the stop/start frames for a transition
    fn transition(
        frames: &mut Vec<SseFrame>,
        transition: Transition,
        content_block: impl FnOnce() -> AnthropicStreamContentBlock,
    ) {
        if let Some(closed) = transition.closed {
            frames.push(stop_frame(closed));
        }
        if let Some(opened) = transition.opened {
            frames.push(frame(&AnthropicStreamEvent::ContentBlockStart {
                index: opened.index,
                content_block: content_block(),
            }));
        }
    }

    fn delta(&self, delta: AnthropicStreamDelta) -> SseFrame {
        frame(&AnthropicStreamEvent::ContentBlockDelta {
            index: self.tracker.content_index(),
            delta,
        })
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
            Self::transition(frames, transition, || AnthropicStreamContentBlock::ToolUse {
                id: call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple())),
                name: call.name.clone().unwrap_or_default(),
                input: json!({}),
            });
        }

        if let Some(arguments) = call.arguments.as_deref().filter(|a| !a.is_empty()) {
            frames.push(self.delta(AnthropicStreamDelta::InputJsonDelta {
                partial_json: arguments.to_owned(),
            }));
        }
    }
}

impl StreamEventBuilder for AnthropicStreamBuilder {
    fn process(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        if let StreamEventKind::Error { message, code } = &event.kind {
            frames.push(frame(&AnthropicStreamEvent::Error {
                error: AnthropicErrorDetail {
                    error_type: code.clone().unwrap_or_else(|| "api_error".to_owned()),
                    message: message.clone(),
                },
            }));
            return frames;
        }

        if self.tracker.has_ended() {
            return frames;
        }

        if self.tracker.start(event) {
            frames.push(self.message_start());
        }

        match &event.kind {
            StreamEventKind::Start | StreamEventKind::Error { .. } => {}
            StreamEventKind::Content { delta, .. } => {
                if delta.is_empty() {
                    return frames;
                }
                let transition = self.tracker.enter(BlockKind::Text, None);
                Self::transition(&mut frames, transition, || AnthropicStreamContentBlock::Text {
                    text: String::new(),
                });
                frames.push(self.delta(AnthropicStreamDelta::TextDelta { text: delta.clone() }));
            }
            StreamEventKind::Reasoning { delta, .. } => {
                if delta.is_empty() {
                    return frames;
                }
                let transition = self.tracker.enter(BlockKind::Thinking, None);
                Self::transition(&mut frames, transition, || AnthropicStreamContentBlock::Thinking {
                    thinking: String::new(),
                });
                frames.push(self.delta(AnthropicStreamDelta::ThinkingDelta {
                    thinking: delta.clone(),
                }));
            }
            StreamEventKind::ToolCall(call) => self.tool_call(&mut frames, call),
            StreamEventKind::End { finish_reason, usage } => {
                if let Some(closed) = self.tracker.close() {
                    frames.push(stop_frame(closed));
                }
                if let Some(usage) = usage {
                    self.tracker.record_usage(usage);
                }
                let details = usage.as_ref().map(crate::ir::Usage::details_or_default).unwrap_or_default();

                frames.push(frame(&AnthropicStreamEvent::MessageDelta {
                    delta: AnthropicMessageDelta {
                        stop_reason: Some(finish_reason_to_wire(finish_reason.unwrap_or(FinishReason::Stop)).to_owned()),
                        stop_sequence: None,
                    },
                    usage: Some(AnthropicUsage {
                        input_tokens: self.tracker.input_tokens(),
                        output_tokens: self.tracker.output_tokens(),
                        cache_creation_input_tokens: details.cache_creation_tokens,
                        cache_read_input_tokens: details.cache_read_tokens.or(details.cached_tokens),
                    }),
                }));
                frames.push(frame(&AnthropicStreamEvent::MessageStop));
                self.tracker.mark_ended();
            }
        }

        frames
    }

    fn finalize(&mut self) -> Vec<SseFrame> {
        if self.tracker.has_ended() {
            return Vec::new();
        }
        self.tracker.close().map(stop_frame).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Usage;

    fn run(builder: &mut AnthropicStreamBuilder, events: &[StreamEvent]) -> Vec<SseFrame> {
        events.iter().flat_map(|e| builder.process(e)).collect()
    }

    fn names(frames: &[SseFrame]) -> Vec<&str> {
        frames.iter().filter_map(|f| f.event.as_deref()).collect()
    }

    #[test]
    fn text_then_tool_advances_index_twice() {
        let mut builder = AnthropicStreamBuilder::new();
        let frames = run(
            &mut builder,
            &[
                StreamEvent::start(Some("msg_1".to_owned()), Some("claude".to_owned())),
                StreamEvent::content("a"),
                StreamEvent::content("b"),
                StreamEvent::tool_call(ToolCallDelta {
                    index: 0,
                    id: None,
                    name: Some("f".to_owned()),
                    arguments: None,
                }),
                StreamEvent::tool_call(ToolCallDelta {
                    index: 0,
                    arguments: Some("{}".to_owned()),
                    ..ToolCallDelta::default()
                }),
                StreamEvent::end(Some(FinishReason::ToolCalls), Some(Usage::new(3, 4))),
            ],
        );

        assert_eq!(builder.content_index(), 2);
        assert_eq!(
            names(&frames),
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(frames[0].data["message"]["id"], "msg_1");
        assert_eq!(frames[5].data["index"], 1);
        assert_eq!(frames[5].data["content_block"]["name"], "f");
        assert!(frames[5].data["content_block"]["id"].as_str().unwrap().starts_with("toolu_"));
        assert_eq!(frames[6].data["delta"]["partial_json"], "{}");
        assert_eq!(frames[8].data["delta"]["stop_reason"], "tool_use");
        assert_eq!(frames[8].data["usage"]["output_tokens"], 4);
        assert!(builder.finalize().is_empty());
    }

    #[test]
    fn thinking_block_precedes_text() {
        let mut builder = AnthropicStreamBuilder::new();
        let frames = run(
            &mut builder,
            &[StreamEvent::reasoning("plan"), StreamEvent::content("answer")],
        );

        assert_eq!(frames[1].data["content_block"]["type"], "thinking");
        assert_eq!(frames[2].data["delta"]["thinking"], "plan");
        assert_eq!(frames[3].data, json!({"type": "content_block_stop", "index": 0}));
        assert_eq!(frames[4].data["content_block"]["type"], "text");
        assert_eq!(frames[4].data["index"], 1);
    }

    #[test]
    fn finalize_closes_open_block_without_finishing() {
        let mut builder = AnthropicStreamBuilder::new();
        run(&mut builder, &[StreamEvent::content("partial")]);

        let frames = builder.finalize();
        assert_eq!(names(&frames), ["content_block_stop"]);
        assert!(builder.finalize().is_empty());
    }

    #[test]
    fn error_event_becomes_error_frame() {
        let mut builder = AnthropicStreamBuilder::new();
        let frames = builder.process(&StreamEvent::error("overloaded", Some("overloaded_error".to_owned())));

        assert_eq!(names(&frames), ["error"]);
        assert_eq!(
            frames[0].data,
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "overloaded"}})
        );
    }
}
