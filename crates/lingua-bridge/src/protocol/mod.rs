//! Wire format types for provider-specific API protocols
//!
//! Each module contains pure serde structs matching the respective provider's
//! JSON API format. These types are only used at the boundary; everything in
//! between works on the IR.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod responses;
