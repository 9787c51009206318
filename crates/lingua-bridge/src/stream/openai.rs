//! IR events to chat completion chunks

use serde_json::json;

use super::{BlockTracker, SseFrame, StreamEventBuilder};
use crate::adapter::openai::{Dialect, ReasoningField};
use crate::ir::{FinishReason, StreamEvent, StreamEventKind, ToolCallDelta, unix_now};
use crate::protocol::openai::{
    OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamFunctionCall, OpenAiStreamToolCall,
    OpenAiUsage, ReasoningDetail,
};

/// Builds `chat.completion.chunk` frames
#[derive(Debug)]
pub struct OpenAiStreamBuilder {
    dialect: Dialect,
    tracker: BlockTracker,
    created: u64,
}

impl OpenAiStreamBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tracker: BlockTracker::new(),
            created: unix_now(),
        }
    }

    fn chunk(&mut self, delta: OpenAiStreamDelta, finish_reason: Option<FinishReason>) -> OpenAiStreamChunk {
        OpenAiStreamChunk {
            id: self.tracker.message_id("chatcmpl-"),
            object: "chat.completion.chunk".to_owned(),
            created: self.created,
            model: self.tracker.model(),
            choices: vec![OpenAiStreamChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(|r| r.as_openai().to_owned()),
            }],
            usage: None,
        }
    }

    fn reasoning_delta(&self, text: &str) -> OpenAiStreamDelta {
        match self.dialect.response_reasoning() {
            ReasoningField::Details => OpenAiStreamDelta {
                reasoning_details: Some(vec![ReasoningDetail {
                    detail_type: "thinking".to_owned(),
                    text: text.to_owned(),
                }]),
                ..OpenAiStreamDelta::default()
            },
            ReasoningField::Content | ReasoningField::None => OpenAiStreamDelta {
                reasoning_content: Some(text.to_owned()),
                ..OpenAiStreamDelta::default()
            },
        }
    }
}

fn tool_delta(call: &ToolCallDelta) -> OpenAiStreamDelta {
    OpenAiStreamDelta {
        tool_calls: Some(vec![OpenAiStreamToolCall {
            index: call.index,
            id: call.id.clone(),
            tool_type: call.id.as_ref().map(|_| "function".to_owned()),
            function: Some(OpenAiStreamFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            }),
        }]),
        ..OpenAiStreamDelta::default()
    }
}

impl StreamEventBuilder for OpenAiStreamBuilder {
    fn process(&mut self, event: &StreamEvent) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        if !matches!(event.kind, StreamEventKind::Error { .. }) && self.tracker.start(event) {
            let delta = OpenAiStreamDelta {
                role: Some("assistant".to_owned()),
                content: Some(String::new()),
                ..OpenAiStreamDelta::default()
            };
            let chunk = self.chunk(delta, None);
            frames.push(SseFrame::data(&chunk));
        }

        match &event.kind {
            StreamEventKind::Start => {}
            StreamEventKind::Content { delta, .. } => {
                let chunk = self.chunk(
                    OpenAiStreamDelta {
                        content: Some(delta.clone()),
                        ..OpenAiStreamDelta::default()
                    },
                    None,
                );
                frames.push(SseFrame::data(&chunk));
            }
            StreamEventKind::Reasoning { delta, .. } => {
                let delta = self.reasoning_delta(delta);
                let chunk = self.chunk(delta, None);
                frames.push(SseFrame::data(&chunk));
            }
            StreamEventKind::ToolCall(call) => {
                let chunk = self.chunk(tool_delta(call), None);
                frames.push(SseFrame::data(&chunk));
            }
            StreamEventKind::End { finish_reason, usage } => {
                if self.tracker.has_ended() {
                    return frames;
                }
                self.tracker.mark_ended();
                let mut chunk = self.chunk(OpenAiStreamDelta::default(), Some(finish_reason.unwrap_or(FinishReason::Stop)));
                chunk.usage = usage.as_ref().map(OpenAiUsage::from);
                frames.push(SseFrame::data(&chunk));
                frames.push(SseFrame::done());
            }
            StreamEventKind::Error { message, code } => {
                frames.push(SseFrame::data(&json!({
                    "error": {
                        "message": message,
                        "type": "upstream_error",
                        "code": code,
                    }
                })));
            }
        }

        frames
    }

    fn finalize(&mut self) -> Vec<SseFrame> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Usage;

    #[test]
    fn text_stream_frames() {
        let mut builder = OpenAiStreamBuilder::new(Dialect::OpenAi);
        let mut frames = Vec::new();
        for event in [
            StreamEvent::start(Some("chatcmpl-9".to_owned()), Some("gpt-4o".to_owned())),
            StreamEvent::content("Hel"),
            StreamEvent::content("lo"),
            StreamEvent::end(Some(FinishReason::Stop), Some(Usage::new(4, 2))),
        ] {
            frames.extend(builder.process(&event));
        }
        frames.extend(builder.finalize());

        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0].data["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(frames[1].data["choices"][0]["delta"]["content"], "Hel");
        assert_eq!(frames[1].data["id"], "chatcmpl-9");
        assert_eq!(frames[3].data["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[3].data["usage"]["total_tokens"], 6);
        assert!(frames[4].is_done());
    }

    #[test]
    fn minimax_reasoning_uses_details() {
        let mut builder = OpenAiStreamBuilder::new(Dialect::MiniMax);
        let frames = builder.process(&StreamEvent::reasoning("think"));

        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[1].data["choices"][0]["delta"]["reasoning_details"][0]["text"],
            "think"
        );
    }

    #[test]
    fn tool_call_deltas_keep_index() {
        let mut builder = OpenAiStreamBuilder::new(Dialect::OpenAi);
        builder.process(&StreamEvent::start(None, None));
        let frames = builder.process(&StreamEvent::tool_call(ToolCallDelta {
            index: 1,
            id: Some("call_a".to_owned()),
            name: Some("lookup".to_owned()),
            arguments: None,
        }));

        let call = &frames[0].data["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(call["index"], 1);
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "lookup");
    }
}
