//! Bidirectional translation between LLM provider wire formats
//!
//! Requests are lifted from one provider's format into a shared intermediate
//! representation, lowered into another provider's format, dispatched, and
//! the response (or stream) is translated back for the caller.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod bridge;
pub mod convert;
pub mod error;
pub mod hooks;
pub mod http;
pub mod ir;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod sse;
pub mod stream;

pub use adapter::{Adapter, AdapterCapabilities, AdapterEndpoint, AdapterInfo};
pub use bridge::{Bridge, BridgeBuilder, BridgeConfig, CompatibilityReport, FrameStream};
pub use error::{AdapterError, BridgeError};
pub use hooks::{BridgeHooks, NoopHooks, TracingHooks};
pub use http::{HttpClient, HttpRequest, ReqwestTransport, Transport};
pub use ir::{ErrorIr, LlmRequest, LlmResponse, StreamEvent};
pub use registry::Provider;
pub use stream::SseFrame;
