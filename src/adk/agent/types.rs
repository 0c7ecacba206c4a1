// SPDX-License-Identifier: MIT

//! ReAct state, trace entries and typed action results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::intent::GoalIntent;
use crate::adk::invoker::HttpMethod;

/// Capability an action invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Check that the source URL is usable
    Validate,
    /// Fetch title, duration, author, ...
    Metadata,
    /// Download/extract the media file
    PrepareMedia,
    Transcribe,
    Enhance,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Validate => "validate",
            ActionType::Metadata => "metadata",
            ActionType::PrepareMedia => "prepare_media",
            ActionType::Transcribe => "transcribe",
            ActionType::Enhance => "enhance",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic outcome of a reasoning phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Validate,
    Metadata,
    PrepareMedia,
    Transcribe,
    Enhance,
    /// Run the fallback declared by the previous failed action
    Fallback,
    /// Nothing left on the checklist
    Complete,
}

impl Decision {
    /// The capability this decision invokes, if any
    pub fn action_type(&self) -> Option<ActionType> {
        match self {
            Decision::Validate => Some(ActionType::Validate),
            Decision::Metadata => Some(ActionType::Metadata),
            Decision::PrepareMedia => Some(ActionType::PrepareMedia),
            Decision::Transcribe => Some(ActionType::Transcribe),
            Decision::Enhance => Some(ActionType::Enhance),
            Decision::Fallback | Decision::Complete => None,
        }
    }
}

impl From<ActionType> for Decision {
    fn from(t: ActionType) -> Self {
        match t {
            ActionType::Validate => Decision::Validate,
            ActionType::Metadata => Decision::Metadata,
            ActionType::PrepareMedia => Decision::PrepareMedia,
            ActionType::Transcribe => Decision::Transcribe,
            ActionType::Enhance => Decision::Enhance,
        }
    }
}

/// Status of a ReAct run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReActStatus {
    #[default]
    Pending,
    Reasoning,
    Acting,
    Observing,
    Completed,
    Failed,
    Cancelled,
}

impl ReActStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReActStatus::Completed | ReActStatus::Failed | ReActStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningStep {
    pub id: String,
    pub thought: String,
    pub reasoning: String,
    pub decision: Decision,
    /// Informational only; never gates control flow
    pub confidence: f64,
    #[serde(default)]
    pub alternatives: Vec<Decision>,
    pub timestamp: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn new(thought: String, reasoning: String, decision: Decision, confidence: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thought,
            reasoning,
            decision,
            confidence: confidence.clamp(0.0, 1.0),
            alternatives: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<Decision>) -> Self {
        self.alternatives = alternatives;
        self
    }
}

/// Concrete call produced from a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub service: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    pub payload: Value,
    pub expected_outcome: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_actions: Vec<PlannedAction>,
}

impl PlannedAction {
    pub fn new(
        action_type: ActionType,
        service: impl Into<String>,
        endpoint: impl Into<String>,
        payload: Value,
        expected_outcome: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_type,
            service: service.into(),
            endpoint: endpoint.into(),
            method: HttpMethod::Post,
            payload,
            expected_outcome: expected_outcome.into(),
            fallback_actions: Vec::new(),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<PlannedAction>) -> Self {
        self.fallback_actions = fallbacks;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
}

/// Record of one executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    pub id: String,
    /// Reasoning step that produced this action
    pub reasoning_id: String,
    pub action: PlannedAction,
    pub status: ActionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionStep {
    pub fn new(action: PlannedAction, reasoning_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reasoning_id: reasoning_id.into(),
            action,
            status: ActionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
            attempts: 0,
            result: None,
            error: None,
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.action.action_type
    }

    pub fn succeeded(&self) -> bool {
        self.status == ActionStatus::Completed
    }

    pub fn failed(&self) -> bool {
        self.status == ActionStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub action_id: String,
    pub observation: String,
    pub analysis: String,
    pub impact: Impact,
    /// Advisory only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_suggestion: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Typed action results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedMedia {
    pub media_file: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Value>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedText {
    pub enhanced_text: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub improvements: Value,
}

/// Action response, discriminated by the action type that produced it.
/// Payloads that don't match the expected shape are kept as `Raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ActionResult {
    Validation(ValidationResult),
    Metadata(MediaMetadata),
    PreparedMedia(PreparedMedia),
    Transcript(Transcript),
    EnhancedText(EnhancedText),
    Raw(Value),
}

impl ActionResult {
    /// Interpret a raw response according to the action that produced it
    pub fn parse(action_type: ActionType, raw: Value) -> Self {
        fn typed<T: serde::de::DeserializeOwned>(
            raw: Value,
            wrap: fn(T) -> ActionResult,
        ) -> ActionResult {
            match serde_json::from_value::<T>(raw.clone()) {
                Ok(v) => wrap(v),
                Err(e) => {
                    log::debug!("Keeping untyped action payload: {}", e);
                    ActionResult::Raw(raw)
                }
            }
        }

        match action_type {
            ActionType::Validate => typed(raw, ActionResult::Validation),
            ActionType::Metadata => typed(raw, ActionResult::Metadata),
            ActionType::PrepareMedia => typed(raw, ActionResult::PreparedMedia),
            ActionType::Transcribe => typed(raw, ActionResult::Transcript),
            ActionType::Enhance => typed(raw, ActionResult::EnhancedText),
        }
    }

    /// Error the remote service reported inside a 2xx response
    pub fn rejection(&self) -> Option<String> {
        match self {
            ActionResult::Validation(v) if !v.valid => Some(
                v.error
                    .clone()
                    .unwrap_or_else(|| "source rejected by validation".to_string()),
            ),
            _ => None,
        }
    }

    /// The payload without its discriminator
    pub fn to_value(&self) -> Value {
        let v = match self {
            ActionResult::Validation(v) => serde_json::to_value(v),
            ActionResult::Metadata(v) => serde_json::to_value(v),
            ActionResult::PreparedMedia(v) => serde_json::to_value(v),
            ActionResult::Transcript(v) => serde_json::to_value(v),
            ActionResult::EnhancedText(v) => serde_json::to_value(v),
            ActionResult::Raw(v) => return v.clone(),
        };
        v.unwrap_or(Value::Null)
    }

    /// One-line description of what was produced
    pub fn summary(&self) -> String {
        match self {
            ActionResult::Validation(v) => match &v.id {
                Some(id) => format!("Source validated (id {})", id),
                None => "Source validated".to_string(),
            },
            ActionResult::Metadata(m) => {
                let author = m.author.as_deref().unwrap_or("unknown author");
                format!(
                    "Fetched metadata for \"{}\" by {} ({:.0}s)",
                    m.title, author, m.duration
                )
            }
            ActionResult::PreparedMedia(p) => {
                format!("Prepared media file {} ({:.0}s)", p.media_file, p.duration)
            }
            ActionResult::Transcript(t) => format!(
                "Transcribed {} characters in {} segment(s), language {}",
                t.text.chars().count(),
                t.segments.len(),
                t.language.as_deref().unwrap_or("unknown")
            ),
            ActionResult::EnhancedText(e) => format!(
                "Enhanced text to {} characters with {} keyword(s)",
                e.enhanced_text.chars().count(),
                e.keywords.len()
            ),
            ActionResult::Raw(_) => "Received an untyped response".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Persisted state of one ReAct run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReActState {
    pub execution_id: String,
    pub goal: String,
    pub intent: GoalIntent,
    pub context: Map<String, Value>,
    pub reasoning_trace: Vec<ReasoningStep>,
    pub action_history: Vec<ActionStep>,
    pub observations: Vec<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_thought: Option<String>,
    /// Action chosen to run next; set while acting and when a fallback is queued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<PlannedAction>,
    pub status: ReActStatus,
    pub iteration: u32,
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReActState {
    pub fn new(
        execution_id: impl Into<String>,
        goal: impl Into<String>,
        intent: GoalIntent,
        context: Map<String, Value>,
        max_iterations: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id: execution_id.into(),
            goal: goal.into(),
            intent,
            context,
            reasoning_trace: Vec::new(),
            action_history: Vec::new(),
            observations: Vec::new(),
            current_thought: None,
            next_action: None,
            status: ReActStatus::Pending,
            iteration: 0,
            max_iterations,
            final_result: None,
            error: None,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn successful_actions(&self) -> usize {
        self.action_history.iter().filter(|a| a.succeeded()).count()
    }

    pub fn failed_actions(&self) -> usize {
        self.action_history.iter().filter(|a| a.failed()).count()
    }

    /// Whether an action of this type has completed successfully
    pub fn has_completed(&self, action_type: ActionType) -> bool {
        self.action_history
            .iter()
            .any(|a| a.succeeded() && a.action_type() == action_type)
    }

    /// Most recent successful result of the given type
    pub fn latest_result(&self, action_type: ActionType) -> Option<&ActionResult> {
        self.action_history
            .iter()
            .rev()
            .filter(|a| a.succeeded() && a.action_type() == action_type)
            .find_map(|a| a.result.as_ref())
    }

    pub fn last_action(&self) -> Option<&ActionStep> {
        self.action_history.last()
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// Successful results keyed by action type; later results win
    pub fn results_by_type(&self) -> Map<String, Value> {
        let mut results = Map::new();
        for step in self.action_history.iter().filter(|a| a.succeeded()) {
            if let Some(result) = &step.result {
                results.insert(step.action_type().to_string(), result.to_value());
            }
        }
        results
    }

    /// Final result body for a finished run
    pub fn summarize(&self, achieved: bool) -> Value {
        json!({
            "achieved": achieved,
            "goal": self.goal,
            "results": self.results_by_type(),
            "steps": self.action_history.len(),
            "successfulActions": self.successful_actions(),
            "failedActions": self.failed_actions(),
            "observations": self.observations.len(),
            "iterations": self.iteration,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceProgress {
    pub reasoning_steps: usize,
    pub actions_executed: usize,
    pub successful_actions: usize,
    pub failed_actions: usize,
}

/// Trace view returned to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReActTrace {
    pub execution_id: String,
    pub goal: String,
    pub status: ReActStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_thought: Option<String>,
    pub reasoning_trace: Vec<ReasoningStep>,
    pub action_history: Vec<ActionStep>,
    pub observations: Vec<Observation>,
    pub progress: TraceProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ReActState> for ReActTrace {
    fn from(state: &ReActState) -> Self {
        Self {
            execution_id: state.execution_id.clone(),
            goal: state.goal.clone(),
            status: state.status,
            current_thought: state.current_thought.clone(),
            reasoning_trace: state.reasoning_trace.clone(),
            action_history: state.action_history.clone(),
            observations: state.observations.clone(),
            progress: TraceProgress {
                reasoning_steps: state.reasoning_trace.len(),
                actions_executed: state.action_history.len(),
                successful_actions: state.successful_actions(),
                failed_actions: state.failed_actions(),
            },
            final_result: state.final_result.clone(),
            error: state.error.clone(),
        }
    }
}
