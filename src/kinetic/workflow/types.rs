// SPDX-License-Identifier: MIT

//! Workflow definition and execution record types
//!
//! Definitions are parsed from YAML or JSON and are immutable once submitted.
//! Execution records are created at submission and mutated only by the
//! scheduler loop that owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::adk::error::{KineticError, Result};
use crate::adk::invoker::HttpMethod;
use crate::adk::retry::RetryPolicy;

/// A statically declared workflow
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    /// Deadline for the whole run; 0 disables it
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl WorkflowDefinition {
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// One dependency-aware unit of work against a named service
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    /// Logical service name, e.g. `transcription`
    pub service: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Per-attempt deadline; 0 falls back to the engine's call timeout
    #[serde(default)]
    pub timeout_ms: u64,
    /// Overrides the definition's `retryPolicy.maxRetries` when non-zero
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, alias = "dependencies")]
    pub depends_on: DependsOn,
    /// Target input field -> dotted source path (`stepId.field` or `input.field`)
    #[serde(default)]
    pub input_mapping: BTreeMap<String, String>,
    /// Stored field -> dotted path into the raw response
    #[serde(default)]
    pub output_mapping: BTreeMap<String, String>,
}

/// Steps a step waits on, written as a single id or a list
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(untagged)]
pub enum DependsOn {
    /// No dependencies (entry step)
    #[default]
    None,
    /// Single dependency
    Single(String),
    /// Multiple dependencies
    Multiple(Vec<String>),
}

impl DependsOn {
    /// Convert to a vector of dependency IDs
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            DependsOn::None => vec![],
            DependsOn::Single(s) => vec![s.clone()],
            DependsOn::Multiple(v) => v.clone(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        let slice: &[String] = match self {
            DependsOn::None => &[],
            DependsOn::Single(s) => std::slice::from_ref(s),
            DependsOn::Multiple(v) => v.as_slice(),
        };
        slice.iter()
    }

    /// Check if this step has no dependencies (is an entry step)
    pub fn is_empty(&self) -> bool {
        match self {
            DependsOn::None => true,
            DependsOn::Single(_) => false,
            DependsOn::Multiple(v) => v.is_empty(),
        }
    }
}

impl From<Vec<&str>> for DependsOn {
    fn from(ids: Vec<&str>) -> Self {
        match ids.len() {
            0 => DependsOn::None,
            _ => DependsOn::Multiple(ids.into_iter().map(String::from).collect()),
        }
    }
}

/// Execution status; transitions are monotonic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// pending -> running -> {completed | failed | cancelled}; pending may also be cancelled or failed directly
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Caller-supplied bookkeeping attached to an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_source() -> String {
    "api".to_string()
}

impl Default for ExecutionMetadata {
    fn default() -> Self {
        Self {
            user_id: None,
            source: default_source(),
            priority: Priority::default(),
            tags: Vec::new(),
        }
    }
}

impl ExecutionMetadata {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

/// One concrete run of a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub input: Map<String, Value>,
    /// Populated only on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Ids of the batch currently in flight, comma separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub step_results: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: ExecutionMetadata,
}

impl WorkflowExecution {
    pub fn new(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        input: Map<String, Value>,
        metadata: ExecutionMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            input,
            output: None,
            current_step: None,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            step_results: BTreeMap::new(),
            error: None,
            start_time: Utc::now(),
            end_time: None,
            metadata,
        }
    }

    /// Move to `next`, rejecting anything but a forward transition
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(KineticError::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }
}

/// Status view returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub step_results: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&WorkflowExecution> for ExecutionSummary {
    fn from(exec: &WorkflowExecution) -> Self {
        Self {
            id: exec.id.clone(),
            workflow_id: exec.workflow_id.clone(),
            status: exec.status,
            completed_steps: exec.completed_steps.clone(),
            failed_steps: exec.failed_steps.clone(),
            step_results: exec.step_results.clone(),
            error: exec.error.clone(),
            start_time: exec.start_time,
            end_time: exec.end_time,
        }
    }
}
