use axum::Json;
use serde_json::{Value, json};

/// Liveness check; never touches the upstream
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
