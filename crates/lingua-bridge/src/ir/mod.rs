//! Intermediate representation shared by every adapter
//!
//! Parsers lift a provider wire format into these types and builders lower
//! them back out. Values are created fresh per call and never shared
//! between requests.

pub mod error;
pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use error::{ErrorIr, ErrorType};
pub use message::{Content, ContentPart, ImageSource, Message, Role};
pub use request::{Extensions, GenerationConfig, LlmRequest, ResponseFormat, ThinkingConfig};
pub use response::{Choice, FinishReason, LlmResponse, Usage, UsageDetails, unix_now};
pub use stream::{StreamEvent, StreamEventKind, ToolCallDelta};
pub use tool::{FunctionCall, FunctionDefinition, Tool, ToolCall, ToolChoice, parse_arguments};
