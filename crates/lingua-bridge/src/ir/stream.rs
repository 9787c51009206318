use serde::{Deserialize, Serialize};

use super::response::{FinishReason, Usage};

/// Event emitted during a streaming completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Response identifier, when the provider sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Model name, when the provider sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// What happened
    #[serde(flatten)]
    pub kind: StreamEventKind,
}

/// Payload of a stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEventKind {
    /// Stream opened
    Start,
    /// Incremental assistant text
    Content {
        delta: String,
        #[serde(default)]
        index: u32,
    },
    /// Incremental reasoning text
    Reasoning {
        delta: String,
        #[serde(default)]
        index: u32,
    },
    /// Incremental tool call; only the changed fields are present
    ToolCall(ToolCallDelta),
    /// Generation finished
    End {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Upstream reported an error mid-stream
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// Partial tool call, accumulated by `index`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the tool call within the response
    pub index: u32,
    /// Tool call ID (first delta only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name (first delta only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Argument JSON fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl StreamEvent {
    pub const fn new(kind: StreamEventKind) -> Self {
        Self {
            id: None,
            model: None,
            kind,
        }
    }

    pub fn start(id: Option<String>, model: Option<String>) -> Self {
        Self {
            id,
            model,
            kind: StreamEventKind::Start,
        }
    }

    pub fn content(delta: impl Into<String>) -> Self {
        Self::new(StreamEventKind::Content {
            delta: delta.into(),
            index: 0,
        })
    }

    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self::new(StreamEventKind::Reasoning {
            delta: delta.into(),
            index: 0,
        })
    }

    pub const fn tool_call(delta: ToolCallDelta) -> Self {
        Self::new(StreamEventKind::ToolCall(delta))
    }

    pub const fn end(finish_reason: Option<FinishReason>, usage: Option<Usage>) -> Self {
        Self::new(StreamEventKind::End { finish_reason, usage })
    }

    pub fn error(message: impl Into<String>, code: Option<String>) -> Self {
        Self::new(StreamEventKind::Error {
            message: message.into(),
            code,
        })
    }

    /// Attach response identity
    #[must_use]
    pub fn with_identity(mut self, id: Option<String>, model: Option<String>) -> Self {
        self.id = id;
        self.model = model;
        self
    }
}
