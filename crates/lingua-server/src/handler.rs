//! Axum route handlers, one per inbound wire format

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::StreamExt;
use lingua_bridge::ir::unix_now;
use lingua_bridge::{FrameStream, Provider, SseFrame};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::upstream::Upstream;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    upstreams: Arc<HashMap<Provider, Upstream>>,
    models: Arc<Vec<String>>,
    provider: Provider,
}

impl AppState {
    pub fn new(upstreams: HashMap<Provider, Upstream>, models: Vec<String>, provider: Provider) -> Self {
        Self {
            upstreams: Arc::new(upstreams),
            models: Arc::new(models),
            provider,
        }
    }
}

/// Build the router with all bridge endpoints
pub fn bridge_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(openai_chat_completions))
        .route("/v1/messages", routing::post(anthropic_messages))
        .route("/v1/responses", routing::post(openai_responses))
        .route("/v1/models", routing::get(list_models))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn openai_chat_completions(State(state): State<AppState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    bridge_call(&state, Provider::OpenAi, body).await
}

/// Handle `POST /v1/messages`
async fn anthropic_messages(State(state): State<AppState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    bridge_call(&state, Provider::Anthropic, body).await
}

/// Handle `POST /v1/responses`
async fn openai_responses(State(state): State<AppState>, body: Result<Json<Value>, JsonRejection>) -> Response {
    bridge_call(&state, Provider::OpenAiResponses, body).await
}

/// Handle `GET /v1/models`
///
/// Lists the models requests can be rewritten to. Without any configured,
/// the upstream's own listing is passed on.
async fn list_models(State(state): State<AppState>) -> Response {
    let models = if state.models.is_empty() {
        match state.upstreams.get(&Provider::OpenAi) {
            Some(upstream) => match upstream.models().await {
                Ok(models) => models,
                Err(e) => return e.into_response_for(Provider::OpenAi),
            },
            None => Vec::new(),
        }
    } else {
        state.models.to_vec()
    };

    let created = unix_now();
    let data: Vec<Value> = models
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": created,
                "owned_by": state.provider.as_ref(),
            })
        })
        .collect();

    Json(json!({ "object": "list", "data": data })).into_response()
}

async fn bridge_call(state: &AppState, inbound: Provider, body: Result<Json<Value>, JsonRejection>) -> Response {
    let wire = match body {
        Ok(Json(wire)) => wire,
        Err(rejection) => return ApiError::invalid_request(rejection.body_text()).into_response_for(inbound),
    };

    let Some(upstream) = state.upstreams.get(&inbound) else {
        tracing::error!(%inbound, "no upstream for inbound format");
        return ApiError {
            status: http::StatusCode::INTERNAL_SERVER_ERROR,
            error_type: "internal_error",
            message: "an internal error occurred".to_owned(),
        }
        .into_response_for(inbound);
    };

    let streaming = wire.get("stream").and_then(Value::as_bool).unwrap_or(false);
    if streaming {
        match upstream.chat_stream(wire).await {
            Ok(frames) => stream_response(frames, inbound).into_response(),
            Err(e) => e.into_response_for(inbound),
        }
    } else {
        match upstream.chat(wire).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => e.into_response_for(inbound),
        }
    }
}

fn to_event(frame: &SseFrame) -> Event {
    let data = if frame.is_done() {
        "[DONE]".to_owned()
    } else {
        frame.data.to_string()
    };
    let event = match &frame.event {
        Some(name) => Event::default().event(name),
        None => Event::default(),
    };
    event.data(data)
}

/// Frame a bridged stream as SSE
///
/// Chat Completions callers get a trailing `data: [DONE]`. A failure after
/// the headers went out ends the stream without one.
fn stream_response(
    frames: FrameStream,
    inbound: Provider,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let terminator = (inbound == Provider::OpenAi).then(SseFrame::done);

    let events = futures_util::stream::unfold(Some((frames, terminator)), move |state| async move {
        let (mut frames, terminator) = state?;
        match frames.next().await {
            Some(Ok(frame)) => Some((Ok(to_event(&frame)), Some((frames, terminator)))),
            Some(Err(e)) => {
                tracing::warn!(%inbound, error = %e, "stream failed after response started");
                None
            }
            None => terminator.map(|done| (Ok(to_event(&done)), None)),
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
