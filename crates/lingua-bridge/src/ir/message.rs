use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

impl Role {
    /// Wire name shared by every chat-style format
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ID of the tool call this message is a response to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Model reasoning that preceded this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl Message {
    /// Create a plain text message
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Create a tool result answering the given call
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text(Role::Tool, content)
        }
    }

    /// Tool calls on this message, empty when there are none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// Message content, either plain text or structured parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Array of content parts (text, images)
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Content {
    /// Extract text content, joining parts if necessary
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Whether there is neither text nor any part
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }

    pub fn has_image(&self) -> bool {
        matches!(self, Self::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::Image { .. })))
    }

    /// View the content as parts, wrapping plain text in a single part
    pub fn parts(&self) -> Vec<ContentPart> {
        match self {
            Self::Text(text) if text.is_empty() => Vec::new(),
            Self::Text(text) => vec![ContentPart::Text { text: text.clone() }],
            Self::Parts(parts) => parts.clone(),
        }
    }

    /// Collapse a list of parts, using plain text when there is a single text part
    pub fn from_parts(mut parts: Vec<ContentPart>) -> Self {
        match parts.len() {
            0 => Self::default(),
            1 if matches!(parts[0], ContentPart::Text { .. }) => match parts.remove(0) {
                ContentPart::Text { text } => Self::Text(text),
                other => Self::Parts(vec![other]),
            },
            _ => Self::Parts(parts),
        }
    }
}

/// Individual part within a multipart message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference
    Image {
        /// Where the image bytes come from
        source: ImageSource,
    },
}

/// Location of image data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Remote image
    Url {
        /// Image URL
        url: String,
    },
    /// Inline image data
    Base64 {
        /// MIME type (e.g. "image/png")
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
}

impl ImageSource {
    /// Interpret a URL, splitting `data:` URIs into inline data
    pub fn from_url(url: &str) -> Self {
        url.strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map_or_else(
                || Self::Url { url: url.to_owned() },
                |(media_type, data)| Self::Base64 {
                    media_type: media_type.to_owned(),
                    data: data.to_owned(),
                },
            )
    }

    /// Render as a URL, using a `data:` URI for inline data
    pub fn to_url(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_splits_into_inline_image() {
        let source = ImageSource::from_url("data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(
            source,
            ImageSource::Base64 {
                media_type: "image/png".to_owned(),
                data: "iVBORw0KGgo=".to_owned(),
            }
        );
        assert_eq!(source.to_url(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn plain_url_stays_remote() {
        let source = ImageSource::from_url("https://example.com/cat.jpg");
        assert_eq!(
            source,
            ImageSource::Url {
                url: "https://example.com/cat.jpg".to_owned()
            }
        );
    }

    #[test]
    fn single_text_part_collapses_to_text() {
        let content = Content::from_parts(vec![ContentPart::Text {
            text: "hello".to_owned(),
        }]);
        assert_eq!(content, Content::Text("hello".to_owned()));
        assert!(Content::from_parts(Vec::new()).is_empty());
    }

    #[test]
    fn as_text_skips_images() {
        let content = Content::Parts(vec![
            ContentPart::Text { text: "a".to_owned() },
            ContentPart::Image {
                source: ImageSource::from_url("https://example.com/x.png"),
            },
            ContentPart::Text { text: "b".to_owned() },
        ]);
        assert_eq!(content.as_text(), "ab");
        assert!(content.has_image());
    }
}
