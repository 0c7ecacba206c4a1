// SPDX-License-Identifier: MIT

//! Lifecycle event bus
//!
//! Events are fire-and-forget: publishing never fails and never blocks, and
//! a publisher with no subscribers simply drops the event. Engines publish
//! only after the state change an event describes has been persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Kind of lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "workflow.started")]
    WorkflowStarted,
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted,
    #[serde(rename = "workflow.failed")]
    WorkflowFailed,
    #[serde(rename = "workflow.cancelled")]
    WorkflowCancelled,
    #[serde(rename = "step.started")]
    StepStarted,
    #[serde(rename = "step.completed")]
    StepCompleted,
    #[serde(rename = "step.failed")]
    StepFailed,
    #[serde(rename = "step.retrying")]
    StepRetrying,
    #[serde(rename = "react.started")]
    ReactStarted,
    #[serde(rename = "react.reasoning")]
    ReactReasoning,
    #[serde(rename = "react.acting")]
    ReactActing,
    #[serde(rename = "react.observing")]
    ReactObserving,
    #[serde(rename = "react.completed")]
    ReactCompleted,
    #[serde(rename = "react.failed")]
    ReactFailed,
    #[serde(rename = "react.cancelled")]
    ReactCancelled,
    #[serde(rename = "job.created")]
    JobCreated,
    #[serde(rename = "job.started")]
    JobStarted,
    #[serde(rename = "job.progress")]
    JobProgress,
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.failed")]
    JobFailed,
    #[serde(rename = "job.cancelled")]
    JobCancelled,
}

impl EventKind {
    /// Dotted wire name, e.g. `step.completed`
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WorkflowStarted => "workflow.started",
            EventKind::WorkflowCompleted => "workflow.completed",
            EventKind::WorkflowFailed => "workflow.failed",
            EventKind::WorkflowCancelled => "workflow.cancelled",
            EventKind::StepStarted => "step.started",
            EventKind::StepCompleted => "step.completed",
            EventKind::StepFailed => "step.failed",
            EventKind::StepRetrying => "step.retrying",
            EventKind::ReactStarted => "react.started",
            EventKind::ReactReasoning => "react.reasoning",
            EventKind::ReactActing => "react.acting",
            EventKind::ReactObserving => "react.observing",
            EventKind::ReactCompleted => "react.completed",
            EventKind::ReactFailed => "react.failed",
            EventKind::ReactCancelled => "react.cancelled",
            EventKind::JobCreated => "job.created",
            EventKind::JobStarted => "job.started",
            EventKind::JobProgress => "job.progress",
            EventKind::JobCompleted => "job.completed",
            EventKind::JobFailed => "job.failed",
            EventKind::JobCancelled => "job.cancelled",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification about one execution, ReAct run, or job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorEvent {
    pub event: EventKind,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl OrchestratorEvent {
    pub fn new(event: EventKind, execution_id: impl Into<String>, data: Value) -> Self {
        Self {
            event,
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Event bus using a tokio broadcast channel.
/// All subscribers receive all events; slow subscribers may lag and miss some.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Best effort: an event with no receivers is dropped.
    pub fn publish(&self, event: OrchestratorEvent) {
        log::debug!("event {} for {}", event.event, event.execution_id);
        let _ = self.tx.send(event);
    }

    /// Shorthand for building and publishing an event
    pub fn emit(&self, kind: EventKind, execution_id: &str, data: Value) {
        self.publish(OrchestratorEvent::new(kind, execution_id, data));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
