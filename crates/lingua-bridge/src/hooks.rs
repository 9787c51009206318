//! Lifecycle hooks around a bridged call

use async_trait::async_trait;

use crate::ir::{ErrorIr, LlmRequest, LlmResponse, StreamEvent};

/// Observer invoked at each stage of a call
///
/// Hooks are awaited in sequence with the call. An error from `on_request`,
/// `on_response` or `on_stream_event` fails the call; failures of `on_error`
/// are logged and dropped.
#[async_trait]
pub trait BridgeHooks: Send + Sync {
    /// After model mapping, before validation
    async fn on_request(&self, _request: &LlmRequest) -> anyhow::Result<()> {
        Ok(())
    }

    /// After the upstream response is parsed into the IR
    async fn on_response(&self, _response: &LlmResponse) -> anyhow::Result<()> {
        Ok(())
    }

    /// For every event of a streamed response
    async fn on_stream_event(&self, _event: &StreamEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_error(&self, _error: &ErrorIr) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl BridgeHooks for NoopHooks {}

/// Hooks that log every stage through `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingHooks {
    /// Name attached to every log line
    pub label: String,
}

impl TracingHooks {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl BridgeHooks for TracingHooks {
    async fn on_request(&self, request: &LlmRequest) -> anyhow::Result<()> {
        tracing::debug!(
            bridge = %self.label,
            model = request.model.as_deref().unwrap_or_default(),
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            stream = request.stream,
            "bridging request"
        );
        Ok(())
    }

    async fn on_response(&self, response: &LlmResponse) -> anyhow::Result<()> {
        tracing::debug!(
            bridge = %self.label,
            id = %response.id,
            model = %response.model,
            prompt_tokens = response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens = response.usage.as_ref().map(|u| u.completion_tokens),
            "upstream response"
        );
        Ok(())
    }

    async fn on_stream_event(&self, event: &StreamEvent) -> anyhow::Result<()> {
        tracing::trace!(bridge = %self.label, event = ?event.kind, "stream event");
        Ok(())
    }

    async fn on_error(&self, error: &ErrorIr) -> anyhow::Result<()> {
        tracing::warn!(
            bridge = %self.label,
            error_type = %error.error_type,
            status = ?error.status,
            code = error.code.as_deref().unwrap_or_default(),
            "bridged call failed: {}",
            error.message
        );
        Ok(())
    }
}
