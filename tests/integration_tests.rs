//! Integration tests for workflow and goal execution
//!
//! Mock media, transcription and enhancement services run on ephemeral local
//! ports and both engines reach them through the real `HttpInvoker`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use kinetic_flow::adk::agent::{ActionType, ReActStatus, ReActTrace};
use kinetic_flow::adk::store::MemoryStateStore;
use kinetic_flow::kinetic::config::Config;
use kinetic_flow::kinetic::server::AppState;
use kinetic_flow::kinetic::workflow::loader::WorkflowLoader;
use kinetic_flow::kinetic::workflow::types::{ExecutionMetadata, ExecutionStatus, WorkflowExecution};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock Services
// ============================================================================

type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, name: &str) {
    log.lock().unwrap().push(name.to_string());
}

fn media_service(log: CallLog) -> Router {
    Router::new()
        .route(
            "/validate",
            post(|State(log): State<CallLog>, Json(body): Json<Value>| async move {
                record(&log, "media/validate");
                let url = body["url"].as_str().unwrap_or_default().to_string();
                if url.starts_with("https://") {
                    Json(json!({"valid": true, "id": "vid-42"}))
                } else {
                    Json(json!({"valid": false, "error": format!("unsupported source {}", url)}))
                }
            }),
        )
        .route(
            "/metadata",
            post(|State(log): State<CallLog>| async move {
                record(&log, "media/metadata");
                Json(json!({
                    "id": "vid-42",
                    "title": "Rust at Scale",
                    "description": "Conference talk",
                    "duration": 1800.0,
                    "author": "Ferris",
                    "thumbnails": [{"url": "https://img/1.jpg"}]
                }))
            }),
        )
        .route(
            "/extract",
            post(|State(log): State<CallLog>, Json(body): Json<Value>| async move {
                record(&log, "media/extract");
                Json(json!({
                    "mediaFile": format!("/tmp/{}.wav", body["format"].as_str().unwrap_or("raw")),
                    "metadata": {"sampleRate": 16000},
                    "duration": 1800.0
                }))
            }),
        )
        .with_state(log)
}

fn transcription_service(log: CallLog) -> Router {
    Router::new()
        .route(
            "/transcribe",
            post(|State(log): State<CallLog>, Json(body): Json<Value>| async move {
                record(&log, "transcription/transcribe");
                if body["mediaFile"].as_str().is_none() {
                    return (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({"error": "mediaFile is required"})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "text": "welcome to the talk",
                        "segments": [{"start": 0.0, "end": 2.5, "text": "welcome to the talk"}],
                        "language": body["language"],
                        "duration": 1800.0
                    })),
                )
            }),
        )
        .with_state(log)
}

fn enhancement_service(log: CallLog) -> Router {
    Router::new()
        .route(
            "/enhance",
            post(|State(log): State<CallLog>, Json(body): Json<Value>| async move {
                record(&log, "enhancement/enhance");
                let text = body["text"].as_str().unwrap_or_default();
                Json(json!({
                    "enhancedText": format!("{}.", capitalize(text)),
                    "summary": "A welcome.",
                    "keywords": ["welcome", "talk"],
                    "improvements": {"punctuation": 1}
                }))
            }),
        )
        .with_state(log)
}

/// Service that always answers 503
fn broken_service() -> Router {
    Router::new().route(
        "/{*path}",
        post(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "transcriber overloaded"})),
            )
        }),
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

struct Harness {
    state: AppState,
    calls: CallLog,
}

async fn harness(transcription_broken: bool) -> Harness {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));

    let media = spawn(media_service(calls.clone())).await;
    let transcription = if transcription_broken {
        spawn(broken_service()).await
    } else {
        spawn(transcription_service(calls.clone())).await
    };
    let enhancement = spawn(enhancement_service(calls.clone())).await;

    let mut config = Config::default();
    config.services.insert("media".to_string(), media);
    config.services.insert("transcription".to_string(), transcription);
    config.services.insert("enhancement".to_string(), enhancement);
    config.call_timeout_ms = 5_000;

    let state = AppState::from_config(&config, Arc::new(MemoryStateStore::new())).unwrap();
    Harness { state, calls }
}

async fn wait_execution(state: &AppState, id: &str) -> WorkflowExecution {
    for _ in 0..400 {
        let exec = state.workflows.get_execution(id).await.unwrap().unwrap();
        if exec.status.is_terminal() {
            return exec;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} did not finish", id);
}

async fn wait_trace(state: &AppState, id: &str) -> ReActTrace {
    for _ in 0..400 {
        let trace = state.react.get_trace(id).await.unwrap().unwrap();
        if trace.status.is_terminal() {
            return trace;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("ReAct run {} did not finish", id);
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

const PIPELINE: &str = r#"
id: media-pipeline
name: Media Pipeline
timeoutMs: 20000
steps:
  - id: metadata
    service: media
    endpoint: /metadata
  - id: extract
    service: media
    endpoint: /extract
  - id: transcribe
    service: transcription
    endpoint: /transcribe
    dependsOn: extract
    inputMapping:
      mediaFile: extract.mediaFile
    outputMapping:
      text: text
      language: language
  - id: enhance
    service: enhancement
    endpoint: /enhance
    dependsOn: [transcribe, metadata]
    inputMapping:
      text: transcribe.text
      title: metadata.title
"#;

// ============================================================================
// Workflow Tests
// ============================================================================

#[tokio::test]
async fn test_workflow_pipeline_over_http() {
    let h = harness(false).await;
    let def = WorkflowLoader::parse_yaml(PIPELINE).unwrap();

    let id = h
        .state
        .workflows
        .execute_workflow(
            def,
            object(json!({"url": "https://example.com/talk", "format": "wav", "language": "en"})),
            ExecutionMetadata::with_source("test"),
        )
        .await
        .unwrap();
    let exec = wait_execution(&h.state, &id).await;

    assert_eq!(exec.status, ExecutionStatus::Completed, "error: {:?}", exec.error);
    assert_eq!(exec.completed_steps.len(), 4);
    assert_eq!(exec.completed_steps.last().map(String::as_str), Some("enhance"));
    assert_eq!(
        exec.step_results["transcribe"],
        json!({"text": "welcome to the talk", "language": "en"})
    );
    assert_eq!(
        exec.step_results["enhance"]["enhancedText"],
        "Welcome to the talk."
    );
    assert_eq!(exec.metadata.source, "test");

    // transcribe waits for extract; enhance waits for everything before it
    let calls = h.calls.lock().unwrap().clone();
    let pos = |name: &str| calls.iter().position(|c| c == name).unwrap();
    assert!(pos("media/extract") < pos("transcription/transcribe"));
    assert!(pos("transcription/transcribe") < pos("enhancement/enhance"));
    assert!(pos("media/metadata") < pos("enhancement/enhance"));
}

#[tokio::test]
async fn test_workflow_fails_on_remote_error() {
    let h = harness(true).await;
    let def = WorkflowLoader::parse_yaml(PIPELINE).unwrap();

    let id = h
        .state
        .workflows
        .execute_workflow(
            def,
            object(json!({"url": "https://example.com/talk"})),
            ExecutionMetadata::default(),
        )
        .await
        .unwrap();
    let exec = wait_execution(&h.state, &id).await;

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(exec.failed_steps, vec!["transcribe".to_string()]);
    assert!(exec.error.unwrap().contains("transcriber overloaded"));
    assert!(!exec.completed_steps.contains(&"enhance".to_string()));
    assert!(exec.output.is_none());
}

#[tokio::test]
async fn test_sample_workflow_file_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/workflows/transcribe.yaml");
    let def = WorkflowLoader::new().load_workflow(path).unwrap();
    kinetic_flow::kinetic::workflow::graph::validate_definition(&def).unwrap();
    assert_eq!(
        kinetic_flow::kinetic::workflow::graph::topological_batches(&def)
            .unwrap()
            .len(),
        3
    );
}

// ============================================================================
// ReAct Tests
// ============================================================================

#[tokio::test]
async fn test_react_transcription_goal() {
    let h = harness(false).await;

    let id = h
        .state
        .react
        .execute_goal(
            "Transcribe video from https://example.com/talk",
            object(json!({"sourceUrl": "https://example.com/talk", "enhanceText": false})),
        )
        .await
        .unwrap();
    let trace = wait_trace(&h.state, &id).await;

    assert_eq!(trace.status, ReActStatus::Completed, "error: {:?}", trace.error);
    let sequence: Vec<ActionType> = trace
        .action_history
        .iter()
        .map(|a| a.action_type())
        .collect();
    assert_eq!(
        sequence,
        vec![
            ActionType::Validate,
            ActionType::Metadata,
            ActionType::PrepareMedia,
            ActionType::Transcribe
        ]
    );

    let result = trace.final_result.unwrap();
    assert_eq!(result["achieved"], true);
    assert_eq!(result["results"]["transcribe"]["text"], "welcome to the talk");
    assert_eq!(result["results"]["metadata"]["title"], "Rust at Scale");
    assert_eq!(trace.progress.actions_executed, 4);
    assert_eq!(trace.progress.successful_actions, 4);
    assert_eq!(trace.progress.failed_actions, 0);
    assert_eq!(trace.observations.len(), 4);

    // The prepared media file flowed into the transcription request
    let transcribe = &trace.action_history[3];
    assert_eq!(transcribe.action.payload["mediaFile"], "/tmp/wav.wav");
}

#[tokio::test]
async fn test_react_transcription_with_enhancement() {
    let h = harness(false).await;

    let id = h
        .state
        .react
        .execute_goal(
            "transcribe this talk",
            object(json!({
                "sourceUrl": "https://example.com/talk",
                "enhanceText": true,
                "language": "en"
            })),
        )
        .await
        .unwrap();
    let trace = wait_trace(&h.state, &id).await;

    assert_eq!(trace.status, ReActStatus::Completed);
    assert_eq!(trace.action_history.len(), 5);
    assert_eq!(
        trace.final_result.unwrap()["results"]["enhance"]["enhancedText"],
        "Welcome to the talk."
    );
    assert_eq!(
        h.calls.lock().unwrap().last().map(String::as_str),
        Some("enhancement/enhance")
    );
}

#[tokio::test]
async fn test_react_rejected_source_fails() {
    let h = harness(false).await;

    let id = h
        .state
        .react
        .execute_goal(
            "transcribe video",
            object(json!({"sourceUrl": "ftp://example.com/talk"})),
        )
        .await
        .unwrap();
    let trace = wait_trace(&h.state, &id).await;

    assert_eq!(trace.status, ReActStatus::Failed);
    assert!(trace.error.unwrap().contains("unsupported source"));
    assert_eq!(trace.action_history.len(), 1);
    assert_eq!(trace.final_result.unwrap()["achieved"], false);
}

#[tokio::test]
async fn test_react_remote_failure_fails_run() {
    let h = harness(true).await;

    let id = h
        .state
        .react
        .execute_goal(
            "transcribe video",
            object(json!({"sourceUrl": "https://example.com/talk"})),
        )
        .await
        .unwrap();
    let trace = wait_trace(&h.state, &id).await;

    assert_eq!(trace.status, ReActStatus::Failed);
    assert_eq!(trace.progress.successful_actions, 3);
    assert_eq!(trace.progress.failed_actions, 1);
    assert!(trace.error.unwrap().contains("transcriber overloaded"));
}

// ============================================================================
// Job Tests
// ============================================================================

#[tokio::test]
async fn test_job_lifecycle_events() {
    let h = harness(false).await;
    let mut rx = h.state.events.subscribe();

    let job = h.state.jobs.create_job("talk.mp4", 4096).await.unwrap();
    h.state.jobs.start_job(&job.id).await.unwrap();
    h.state.jobs.update_progress(&job.id, 50).await.unwrap();
    h.state
        .jobs
        .complete_job(&job.id, json!({"transcript": "welcome"}))
        .await
        .unwrap();
    assert!(!h.state.jobs.cancel_job(&job.id).await.unwrap());

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.execution_id, job.id);
        names.push(event.event.to_string());
    }
    assert_eq!(
        names,
        vec!["job.created", "job.started", "job.progress", "job.completed"]
    );
}
