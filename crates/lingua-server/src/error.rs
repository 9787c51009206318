use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use lingua_bridge::{BridgeError, Provider};
use lingua_oauth::PoolError;
use serde_json::json;

/// A failure ready to be shown to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error_type: "invalid_request_error",
            message: message.into(),
        }
    }

    /// Error body in the caller's wire format
    pub fn into_response_for(self, format: Provider) -> Response {
        let body = match format {
            Provider::Anthropic => json!({
                "type": "error",
                "error": {
                    "type": self.error_type,
                    "message": self.message,
                }
            }),
            _ => json!({
                "error": {
                    "message": self.message,
                    "type": self.error_type,
                    "code": serde_json::Value::Null,
                }
            }),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<&BridgeError> for ApiError {
    fn from(error: &BridgeError) -> Self {
        Self {
            status: error.status_code(),
            error_type: error.error_type(),
            message: error.client_message(),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        Self::from(&error)
    }
}

impl From<PoolError> for ApiError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::Upstream(e) => Self::from(&e),
            PoolError::NoAccounts { .. } => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error_type: "upstream_error",
                message: error.to_string(),
            },
            PoolError::Exhausted { .. } => Self {
                status: StatusCode::BAD_GATEWAY,
                error_type: "upstream_error",
                message: error.to_string(),
            },
        }
    }
}
