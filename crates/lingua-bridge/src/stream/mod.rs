//! Streaming conversion
//!
//! Parsers turn provider chunks into IR [`StreamEvent`]s; builders turn IR
//! events into provider SSE frames. Both are created per stream and own
//! their state.

pub mod aggregate;
pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod responses;

use serde::Serialize;
use serde_json::Value;

use crate::error::AdapterError;
use crate::ir::{StreamEvent, Usage};
use crate::sse::DONE_SENTINEL;

pub use aggregate::StreamAggregator;
pub use anthropic::AnthropicStreamBuilder;
pub use gemini::GeminiStreamBuilder;
pub use openai::OpenAiStreamBuilder;
pub use responses::ResponsesStreamBuilder;

/// One server-sent event ready for framing
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    /// `event:` field, omitted when `None`
    pub event: Option<String>,
    /// JSON payload of the `data:` field
    pub data: Value,
}

impl SseFrame {
    /// Frame with only a `data:` field
    pub fn data(payload: &impl Serialize) -> Self {
        Self {
            event: None,
            data: serde_json::to_value(payload).unwrap_or_default(),
        }
    }

    /// Frame with both `event:` and `data:` fields
    pub fn named(event: &str, payload: &impl Serialize) -> Self {
        Self {
            event: Some(event.to_owned()),
            data: serde_json::to_value(payload).unwrap_or_default(),
        }
    }

    /// Terminal `[DONE]` marker
    pub fn done() -> Self {
        Self {
            event: None,
            data: Value::String(DONE_SENTINEL.to_owned()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.data.as_str() == Some(DONE_SENTINEL)
    }

    /// Render as SSE text, terminated by a blank line
    pub fn to_sse_string(&self) -> String {
        let data = match &self.data {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        match &self.event {
            Some(event) => format!("event: {event}\ndata: {data}\n\n"),
            None => format!("data: {data}\n\n"),
        }
    }
}

/// Stateful provider chunk to IR event conversion
pub trait StreamParser: Send {
    fn parse(&mut self, chunk: &Value) -> Result<Vec<StreamEvent>, AdapterError>;

    /// Events owed once the upstream body is exhausted
    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

/// Stateful IR event to provider frame conversion
pub trait StreamEventBuilder: Send {
    fn process(&mut self, event: &StreamEvent) -> Vec<SseFrame>;

    /// Frames owed once the event stream is exhausted
    ///
    /// Closes a block left open by a stream that never delivered `End`;
    /// a truncated stream is not completed with a fabricated finish.
    fn finalize(&mut self) -> Vec<SseFrame>;
}

/// Kind of an output block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    ToolUse,
    Thinking,
}

/// A block opened or closed by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub index: u32,
    pub kind: BlockKind,
    /// Tool call index for tool blocks
    pub tool_index: Option<u32>,
}

/// Effect of routing an event into a block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    pub closed: Option<Block>,
    pub opened: Option<Block>,
}

/// Block bookkeeping shared by the builders
///
/// `content_index` names the block currently open and advances exactly when
/// a block closes.
#[derive(Debug, Default)]
pub struct BlockTracker {
    has_started: bool,
    ended: bool,
    message_id: Option<String>,
    model: Option<String>,
    content_index: u32,
    current: Option<Block>,
    output_tokens: u32,
    input_tokens: u32,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record stream identity; true exactly once, when the start frame is due
    pub fn start(&mut self, event: &StreamEvent) -> bool {
        if self.message_id.is_none() {
            self.message_id.clone_from(&event.id);
        }
        if self.model.is_none() {
            self.model.clone_from(&event.model);
        }
        if self.has_started {
            return false;
        }
        self.has_started = true;
        true
    }

    pub const fn has_started(&self) -> bool {
        self.has_started
    }

    pub const fn has_ended(&self) -> bool {
        self.ended
    }

    pub const fn mark_ended(&mut self) {
        self.ended = true;
    }

    /// Message id from the stream, or a generated one with `prefix`
    pub fn message_id(&mut self, prefix: &str) -> String {
        self.message_id
            .get_or_insert_with(|| format!("{prefix}{}", uuid::Uuid::new_v4().simple()))
            .clone()
    }

    pub fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| "unknown".to_owned())
    }

    pub const fn content_index(&self) -> u32 {
        self.content_index
    }

    pub const fn current(&self) -> Option<Block> {
        self.current
    }

    /// Route an event into a block of `kind`, opening one when needed
    pub fn enter(&mut self, kind: BlockKind, tool_index: Option<u32>) -> Transition {
        let same = self
            .current
            .is_some_and(|block| block.kind == kind && (kind != BlockKind::ToolUse || block.tool_index == tool_index));
        if same {
            return Transition::default();
        }

        let closed = self.close();
        let opened = Block {
            index: self.content_index,
            kind,
            tool_index,
        };
        self.current = Some(opened);
        Transition {
            closed,
            opened: Some(opened),
        }
    }

    /// Close the open block, if any, advancing the content index
    pub fn close(&mut self) -> Option<Block> {
        let block = self.current.take()?;
        self.content_index += 1;
        Some(block)
    }

    pub fn record_usage(&mut self, usage: &Usage) {
        self.output_tokens = usage.completion_tokens;
        self.input_tokens = usage.prompt_tokens;
    }

    pub const fn output_tokens(&self) -> u32 {
        self.output_tokens
    }

    pub const fn input_tokens(&self) -> u32 {
        self.input_tokens
    }
}

/// Drop `[DONE]` frames produced by a builder
pub fn without_done(frames: Vec<SseFrame>) -> Vec<SseFrame> {
    frames.into_iter().filter(|frame| !frame.is_done()).collect()
}
