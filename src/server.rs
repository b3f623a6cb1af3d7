use crate::error::AdaptorError;
use crate::relay::{sse_body, Adaptor, RelayOutcome};
use crate::translate::openai_types::{GeneralRequest, ImageRequest};
use crate::vendor::{CHANNEL_NAME, MODEL_LIST};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub adaptor: Adaptor,
    pub streams: StreamStats,
}

impl AppState {
    pub fn new(adaptor: Adaptor) -> Self {
        Self {
            adaptor,
            streams: StreamStats::default(),
        }
    }
}

/// Outcome counters for streamed responses.
#[derive(Debug, Default)]
pub struct StreamStats {
    pub completed: AtomicU64,
    pub aborted: AtomicU64,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat))
        .route("/v1/embeddings", post(handle_embeddings))
        .route("/v1/images/generations", post(handle_images))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: Option<GeneralRequest> = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let outcome = state.adaptor.chat(req.as_ref()).await;
    outcome_response(&state, outcome)
}

async fn handle_embeddings(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: Option<GeneralRequest> = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let outcome = state.adaptor.embeddings(req.as_ref()).await;
    outcome_response(&state, outcome)
}

async fn handle_images(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: Option<ImageRequest> = match parse_body(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let outcome = state.adaptor.image(req.as_ref()).await;
    outcome_response(&state, outcome)
}

/// An empty body is an absent request, which the translators reject themselves.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<Option<T>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(body).map(Some).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse request body");
        error_response(&AdaptorError::validation(format!("Invalid request body: {e}")))
    })
}

fn outcome_response(state: &Arc<AppState>, outcome: crate::Result<RelayOutcome>) -> Response {
    match outcome {
        Ok(RelayOutcome::Json(reply)) => Response::builder()
            .status(reply.status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(reply.body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Ok(RelayOutcome::Stream(events)) => stream_response(state.clone(), events),
        Ok(RelayOutcome::Empty { status }) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::BAD_GATEWAY)
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Relay failed");
            error_response(&e)
        }
    }
}

fn stream_response(state: Arc<AppState>, events: crate::relay::ChunkStream) -> Response {
    let (body, report) = sse_body(events);

    tokio::spawn(async move {
        match report.await {
            Ok(Ok(summary)) => {
                state.streams.completed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    chunks = summary.chunks,
                    usage = ?summary.usage,
                    "Stream delivered"
                );
            }
            Ok(Err(e)) => {
                state.streams.aborted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    code = %e.to_canonical().error.code,
                    "Stream write failed"
                );
            }
            Err(_) => {}
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_response(err: &AdaptorError) -> Response {
    let canonical = err.to_canonical();
    let status =
        StatusCode::from_u16(canonical.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(canonical)).into_response()
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "vendor": state.adaptor.base_url(),
        "streams": {
            "completed": state.streams.completed.load(Ordering::Relaxed),
            "aborted": state.streams.aborted.load(Ordering::Relaxed),
        },
    }))
}

async fn handle_models() -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = MODEL_LIST
        .iter()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": CHANNEL_NAME,
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}
