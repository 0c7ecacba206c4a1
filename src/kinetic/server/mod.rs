// SPDX-License-Identifier: MIT

//! HTTP status/trace API over the engines

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::agent::ReActEngine;
use crate::adk::error::KineticError;
use crate::adk::event::EventBus;
use crate::adk::invoker::StepInvoker;
use crate::adk::store::StateStore;
use crate::kinetic::config::Config;
use crate::kinetic::jobs::JobManager;
use crate::kinetic::services::{HttpInvoker, ServiceRegistry};
use crate::kinetic::workflow::graph::WorkflowEngine;
use crate::kinetic::workflow::types::{ExecutionMetadata, ExecutionSummary, WorkflowDefinition};

/// Engines shared by every handler; constructed once at startup
#[derive(Clone)]
pub struct AppState {
    pub workflows: WorkflowEngine,
    pub react: ReActEngine,
    pub jobs: JobManager,
    pub events: EventBus,
}

impl AppState {
    /// Wire both engines and the job manager to one store, one event bus and
    /// an HTTP invoker over the configured services
    pub fn from_config(config: &Config, store: Arc<dyn StateStore>) -> crate::Result<Self> {
        let registry = ServiceRegistry::from_config(&config.services)?;
        log::info!("Registered services: {:?}", registry.names());
        let invoker: Arc<dyn StepInvoker> = Arc::new(HttpInvoker::new(registry));
        let events = EventBus::new(config.event_capacity);

        Ok(Self {
            workflows: WorkflowEngine::new(invoker.clone(), store.clone(), events.clone())
                .with_ttl(config.store_ttl())
                .with_call_timeout(config.call_timeout()),
            react: ReActEngine::new(invoker, store.clone(), events.clone())
                .with_ttl(config.store_ttl())
                .with_call_timeout(config.call_timeout())
                .with_max_iterations(config.react_max_iterations)
                .with_action_retry(config.action_retry.clone()),
            jobs: JobManager::new(store, events.clone()).with_ttl(config.store_ttl()),
            events,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows/execute", post(execute_workflow))
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/executions/{id}/cancel", post(cancel_execution))
        .route("/api/react", post(execute_goal))
        .route("/api/react/{id}", get(get_trace))
        .route("/api/react/{id}/cancel", post(cancel_goal))
        .route("/api/jobs", post(create_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        .route("/api/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> crate::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Maps engine errors onto HTTP statuses with a `{"error": ...}` body
struct ApiError(KineticError);

impl From<KineticError> for ApiError {
    fn from(e: KineticError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            KineticError::Validation(_)
            | KineticError::Dependency { .. }
            | KineticError::Json(_)
            | KineticError::Yaml(_) => StatusCode::BAD_REQUEST,
            KineticError::NotFound { .. } => StatusCode::NOT_FOUND,
            KineticError::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct ExecuteWorkflowRequest {
    definition: WorkflowDefinition,
    #[serde(default)]
    input: Map<String, Value>,
    #[serde(default)]
    metadata: ExecutionMetadata,
}

async fn execute_workflow(
    State(state): State<AppState>,
    Json(req): Json<ExecuteWorkflowRequest>,
) -> std::result::Result<(StatusCode, Json<Value>), ApiError> {
    let id = state
        .workflows
        .execute_workflow(req.definition, req.input, req.metadata)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": id }))))
}

async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ExecutionSummary> {
    let exec = state
        .workflows
        .get_execution(&id)
        .await?
        .ok_or_else(|| KineticError::not_found("execution", &id))?;
    Ok(Json(ExecutionSummary::from(&exec)))
}

async fn cancel_execution(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let cancelled = state.workflows.cancel(&id).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

#[derive(Deserialize)]
struct ExecuteGoalRequest {
    goal: String,
    #[serde(default)]
    context: Map<String, Value>,
}

async fn execute_goal(
    State(state): State<AppState>,
    Json(req): Json<ExecuteGoalRequest>,
) -> std::result::Result<(StatusCode, Json<Value>), ApiError> {
    let id = state.react.execute_goal(&req.goal, req.context).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": id }))))
}

async fn get_trace(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let trace = state
        .react
        .get_trace(&id)
        .await?
        .ok_or_else(|| KineticError::not_found("react execution", &id))?;
    Ok(Json(serde_json::to_value(trace).map_err(KineticError::from)?))
}

async fn cancel_goal(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let cancelled = state.react.cancel(&id).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest {
    file_name: String,
    #[serde(default)]
    file_size: u64,
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> std::result::Result<(StatusCode, Json<Value>), ApiError> {
    let job = state.jobs.create_job(&req.file_name, req.file_size).await?;
    let body = serde_json::to_value(job).map_err(KineticError::from)?;
    Ok((StatusCode::CREATED, Json(body)))
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let job = state
        .jobs
        .get_job(&id)
        .await?
        .ok_or_else(|| KineticError::not_found("job", &id))?;
    Ok(Json(serde_json::to_value(job).map_err(KineticError::from)?))
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let cancelled = state.jobs.cancel_job(&id).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

/// Event Bus as server-sent events. Lagging clients skip what they missed.
async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|msg| match msg {
        Ok(event) => Event::default()
            .event(event.event.as_str())
            .json_data(&event)
            .ok()
            .map(Ok),
        Err(e) => {
            log::warn!("SSE subscriber lagged: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
