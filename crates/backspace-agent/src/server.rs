//! HTTP surface: health check and the streaming `POST /code` endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use backspace_engine::events::{encode_frame, EventEmitter, EventStream};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::github::RepoRef;
use crate::telemetry::TracingObserver;
use crate::workflow::{CodingWorkflow, WorkflowRequest};

pub const SERVICE_NAME: &str = "Backspace Coding Agent";

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<CodingWorkflow>,
    pub telemetry: Arc<TracingObserver>,
}

impl AppState {
    /// Wire `telemetry` in as the workflow's observer.
    pub fn new(workflow: CodingWorkflow, telemetry: Arc<TracingObserver>) -> Self {
        let workflow = workflow.with_observer(telemetry.clone());
        Self {
            workflow: Arc::new(workflow),
            telemetry,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRequest {
    pub repo_url: String,
    pub prompt: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/healthz", get(health))
        .route("/stats", get(stats))
        .route("/code", post(code))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn stats(State(state): State<AppState>) -> Response {
    Json(state.telemetry.snapshot()).into_response()
}

fn bad_request(detail: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
}

async fn code(State(state): State<AppState>, Json(body): Json<CodeRequest>) -> Response {
    if RepoRef::parse(&body.repo_url).is_none() {
        warn!(repo = %body.repo_url, "Rejected non-GitHub repository");
        return bad_request("Only GitHub repositories are supported");
    }
    if body.prompt.trim().is_empty() {
        return bad_request("Prompt must not be empty");
    }

    let (events, rx) = EventEmitter::channel(state.workflow.config().heartbeat_interval());
    let workflow = state.workflow.clone();
    let request = WorkflowRequest {
        repo_url: body.repo_url,
        prompt: body.prompt,
    };
    tokio::spawn(async move {
        workflow.run(&request, events).await;
    });

    event_stream_response(rx)
}

/// Stream `rx` as `text/event-stream`, one `data:` frame per event.
pub fn event_stream_response(mut rx: EventStream) -> Response {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match encode_frame(&event) {
                Ok(frame) => yield Ok::<_, Infallible>(frame),
                Err(e) => warn!(error = %e, event_type = event.event_type(), "Dropping unencodable event"),
            }
        }
    };

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
