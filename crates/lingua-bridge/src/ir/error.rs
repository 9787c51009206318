use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorType {
    Network,
    Api,
    Validation,
    RateLimit,
    Authentication,
    Permission,
    NotFound,
    Server,
    Unknown,
}

impl ErrorType {
    /// Classify an HTTP status code
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::Validation,
            401 => Self::Authentication,
            403 => Self::Permission,
            404 => Self::NotFound,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Api,
        }
    }

    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::Server)
    }
}

/// Provider-neutral description of an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorIr {
    /// Error category
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    /// Human-readable message
    pub message: String,
    /// Provider error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// HTTP status, when the error came from an HTTP response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Whether repeating the call may succeed
    pub retryable: bool,
    /// Original error body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ErrorIr {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            code: None,
            status: None,
            retryable: error_type.is_retryable(),
            raw: None,
        }
    }

    /// Classify by status when present, otherwise by the provider's error code
    pub fn from_upstream(message: impl Into<String>, code: Option<String>, status: Option<u16>, raw: &Value) -> Self {
        let error_type = status.map_or_else(
            || code.as_deref().map_or(ErrorType::Unknown, classify_code),
            ErrorType::from_status,
        );
        Self {
            code,
            status,
            raw: Some(raw.clone()),
            ..Self::new(error_type, message)
        }
    }
}

/// Map a provider error code onto an error category
pub fn classify_code(code: &str) -> ErrorType {
    match code {
        "invalid_request_error" | "invalid_argument" | "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => {
            ErrorType::Validation
        }
        "authentication_error" | "invalid_api_key" | "UNAUTHENTICATED" => ErrorType::Authentication,
        "permission_error" | "PERMISSION_DENIED" => ErrorType::Permission,
        "not_found_error" | "model_not_found" | "NOT_FOUND" => ErrorType::NotFound,
        "rate_limit_error" | "rate_limit_exceeded" | "insufficient_quota" | "RESOURCE_EXHAUSTED" => {
            ErrorType::RateLimit
        }
        "api_error" | "overloaded_error" | "server_error" | "INTERNAL" | "UNAVAILABLE" => ErrorType::Server,
        _ => ErrorType::Api,
    }
}
