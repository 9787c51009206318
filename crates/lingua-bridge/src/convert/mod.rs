//! Bidirectional conversion between the IR and wire formats
//!
//! Each submodule handles conversions for a specific provider's protocol,
//! including its stateful stream parser.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod responses;
