use std::time::Duration;

use http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::ir::{ErrorIr, ErrorType};
use crate::retry::Retryable;

/// Errors raised while converting between a wire format and the IR
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Payload did not match the provider's wire format
    #[error("invalid {format} payload: {source}")]
    Deserialize {
        format: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Wire value could not be produced
    #[error("failed to build {format} payload: {source}")]
    Serialize {
        format: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Payload was well-formed but semantically unusable
    #[error("invalid request: {0}")]
    Invalid(String),

    /// The adapter does not implement this direction
    #[error("{adapter} adapter does not support {operation}")]
    Unsupported {
        adapter: &'static str,
        operation: &'static str,
    },
}

impl AdapterError {
    pub fn deserialize(format: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Deserialize { format, source }
    }

    pub fn serialize(format: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Serialize { format, source }
    }
}

/// Errors surfaced by a bridged call
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Connection could not be established or broke mid-transfer
    #[error("network error: {0}")]
    Network(String),

    /// The attempt exceeded its timeout
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream answered with a non-success status
    #[error("upstream returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    /// Request rejected before dispatch
    #[error("validation failed: {0}")]
    Validation(String),

    /// Wire format conversion failed
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Orchestration failure
    #[error("bridge error: {0}")]
    Bridge(String),

    /// A lifecycle hook returned an error
    #[error("hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    /// Upstream reported an error inside an open stream
    #[error("upstream stream error: {message}")]
    Stream { message: String, code: Option<String> },

    /// Upstream completed without producing any output
    #[error("upstream returned an empty response")]
    EmptyResponse,
}

impl BridgeError {
    /// HTTP status reported by the upstream, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error should trigger another attempt
    ///
    /// Only transient failures qualify: server errors, timeouts and
    /// transport faults. Client errors are returned as-is.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status >= 500,
            Self::Network(_) | Self::Timeout(_) | Self::Stream { .. } | Self::EmptyResponse => true,
            Self::Validation(_) | Self::Adapter(_) | Self::Bridge(_) | Self::Hook(_) => false,
        }
    }

    /// Status code to answer a client with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Api { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Network(_) | Self::Stream { .. } | Self::EmptyResponse => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Validation(_) | Self::Adapter(_) => StatusCode::BAD_REQUEST,
            Self::Bridge(_) | Self::Hook(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error type for client-facing bodies
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Api { status, .. } => match ErrorType::from_status(*status) {
                ErrorType::Authentication => "authentication_error",
                ErrorType::Permission => "permission_error",
                ErrorType::NotFound => "not_found_error",
                ErrorType::RateLimit => "rate_limit_error",
                ErrorType::Validation => "invalid_request_error",
                _ => "upstream_error",
            },
            Self::Network(_) | Self::Timeout(_) | Self::Stream { .. } | Self::EmptyResponse => "upstream_error",
            Self::Validation(_) | Self::Adapter(_) => "invalid_request_error",
            Self::Bridge(_) | Self::Hook(_) => "internal_error",
        }
    }

    /// Message safe to show to clients
    pub fn client_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Hook(_) | Self::Bridge(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

impl Retryable for BridgeError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

impl From<&BridgeError> for ErrorIr {
    fn from(error: &BridgeError) -> Self {
        match error {
            BridgeError::Network(_) => Self::new(ErrorType::Network, error.to_string()),
            BridgeError::Timeout(_) => Self {
                code: Some("timeout".to_owned()),
                ..Self::new(ErrorType::Network, error.to_string())
            },
            BridgeError::Api { status, message, body } => Self {
                status: Some(*status),
                raw: body.clone(),
                ..Self::new(ErrorType::from_status(*status), message.clone())
            },
            BridgeError::Validation(message) => Self::new(ErrorType::Validation, message.clone()),
            BridgeError::Adapter(_) => Self::new(ErrorType::Validation, error.to_string()),
            BridgeError::Stream { message, code } => Self {
                code: code.clone(),
                ..Self::new(ErrorType::Server, message.clone())
            },
            BridgeError::EmptyResponse => Self {
                retryable: true,
                ..Self::new(ErrorType::Api, error.to_string())
            },
            BridgeError::Bridge(_) | BridgeError::Hook(_) => Self::new(ErrorType::Unknown, error.to_string()),
        }
    }
}
