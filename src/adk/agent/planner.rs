// SPDX-License-Identifier: MIT

//! Planner - the reasoning, planning and observing half of the ReAct loop
//!
//! The engine owns sequencing, persistence and invocation; a [`Planner`]
//! only looks at the current state and decides.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use super::types::{
    ActionResult, ActionStep, ActionType, Decision, Impact, Observation, PlannedAction,
    ReActState, ReasoningStep,
};
use crate::adk::error::{KineticError, Result};

#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce a thought and a decision from the full history
    async fn reason(&self, state: &ReActState) -> Result<ReasoningStep>;

    /// Turn an actionable decision into a concrete call
    async fn plan(&self, reasoning: &ReasoningStep, state: &ReActState) -> Result<PlannedAction>;

    /// Classify the outcome of an executed action
    fn observe(&self, step: &ActionStep, state: &ReActState) -> Observation;

    /// Goal-completion predicate, checked after every observation
    fn is_goal_complete(&self, state: &ReActState) -> bool {
        state
            .intent
            .is_satisfied(|action_type| state.has_completed(action_type))
    }
}

/// Walks the intent's capability checklist, one unfinished item per iteration
#[derive(Debug, Clone)]
pub struct CapabilityPlanner {
    pub media_service: String,
    pub transcription_service: String,
    pub enhancement_service: String,
}

impl Default for CapabilityPlanner {
    fn default() -> Self {
        Self {
            media_service: "media".to_string(),
            transcription_service: "transcription".to_string(),
            enhancement_service: "enhancement".to_string(),
        }
    }
}

impl CapabilityPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next checklist item without a successful action, if any
    fn next_unfinished(&self, state: &ReActState) -> Option<ActionType> {
        state
            .intent
            .checklist()
            .into_iter()
            .find(|t| !state.has_completed(*t))
    }

    /// Success-rate and context-completeness blend; informational only
    fn confidence(&self, state: &ReActState) -> f64 {
        let executed = state.action_history.len();
        let success_rate = if executed == 0 {
            1.0
        } else {
            state.successful_actions() as f64 / executed as f64
        };

        let required = state.intent.required_context();
        let present = required
            .iter()
            .filter(|k| state.context.get(**k).is_some_and(|v| !v.is_null()))
            .count();
        let completeness = if required.is_empty() {
            1.0
        } else {
            present as f64 / required.len() as f64
        };

        (0.6 * success_rate + 0.4 * completeness).clamp(0.0, 1.0)
    }

    fn endpoint(&self, action_type: ActionType) -> (&str, &'static str) {
        match action_type {
            ActionType::Validate => (&self.media_service, "/validate"),
            ActionType::Metadata => (&self.media_service, "/metadata"),
            ActionType::PrepareMedia => (&self.media_service, "/extract"),
            ActionType::Transcribe => (&self.transcription_service, "/transcribe"),
            ActionType::Enhance => (&self.enhancement_service, "/enhance"),
        }
    }

    fn payload(&self, action_type: ActionType, state: &ReActState) -> Result<Value> {
        let ctx = &state.context;
        let source = || {
            ctx.get("sourceUrl")
                .cloned()
                .ok_or_else(|| KineticError::validation("context has no sourceUrl"))
        };

        let payload = match action_type {
            ActionType::Validate | ActionType::Metadata => json!({ "url": source()? }),
            ActionType::PrepareMedia => json!({
                "url": source()?,
                "format": ctx.get("format").cloned().unwrap_or_else(|| json!("wav")),
            }),
            ActionType::Transcribe => {
                let media_file = result_field(state, ActionType::PrepareMedia, "mediaFile")
                    .ok_or_else(|| {
                        KineticError::validation("no prepared media file to transcribe")
                    })?;
                json!({
                    "mediaFile": media_file,
                    "language": ctx.get("language").cloned().unwrap_or_else(|| json!("auto")),
                })
            }
            ActionType::Enhance => {
                let text = result_field(state, ActionType::Transcribe, "text")
                    .or_else(|| ctx.get("text").cloned())
                    .ok_or_else(|| KineticError::validation("no text to enhance"))?;
                json!({
                    "text": text,
                    "options": ctx
                        .get("enhanceOptions")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Map::new())),
                })
            }
        };
        Ok(payload)
    }

    fn expected_outcome(action_type: ActionType) -> &'static str {
        match action_type {
            ActionType::Validate => "source URL confirmed as processable",
            ActionType::Metadata => "title, duration and author of the media",
            ActionType::PrepareMedia => "local media file ready for transcription",
            ActionType::Transcribe => "transcript text with segments",
            ActionType::Enhance => "enhanced text with summary and keywords",
        }
    }
}

/// Field of the latest successful result of a given type
fn result_field(state: &ReActState, action_type: ActionType, key: &str) -> Option<Value> {
    state
        .latest_result(action_type)
        .map(ActionResult::to_value)
        .and_then(|v| v.get(key).cloned())
}

#[async_trait]
impl Planner for CapabilityPlanner {
    async fn reason(&self, state: &ReActState) -> Result<ReasoningStep> {
        let checklist = state.intent.checklist();
        let done = checklist.iter().filter(|t| state.has_completed(**t)).count();
        let last = state
            .last_observation()
            .map(|o| o.observation.as_str())
            .unwrap_or("nothing observed yet");

        let thought = format!(
            "Iteration {}: {} of {} steps toward '{}' are done ({} succeeded, {} failed). Last: {}",
            state.iteration,
            done,
            checklist.len(),
            state.goal,
            state.successful_actions(),
            state.failed_actions(),
            last
        );

        let next = self.next_unfinished(state);
        let (decision, reasoning) = match next {
            Some(t) => (
                Decision::from(t),
                format!(
                    "The {} checklist still needs '{}'; earlier items are complete",
                    state.intent, t
                ),
            ),
            None => (
                Decision::Complete,
                format!("Every item on the {} checklist has succeeded", state.intent),
            ),
        };

        let alternatives = checklist
            .iter()
            .filter(|t| Some(**t) != next && !state.has_completed(**t))
            .map(|t| Decision::from(*t))
            .collect();

        Ok(
            ReasoningStep::new(thought, reasoning, decision, self.confidence(state))
                .with_alternatives(alternatives),
        )
    }

    async fn plan(&self, reasoning: &ReasoningStep, state: &ReActState) -> Result<PlannedAction> {
        let action_type = reasoning.decision.action_type().ok_or_else(|| {
            KineticError::validation(format!(
                "decision {:?} has no action to plan",
                reasoning.decision
            ))
        })?;
        let (service, endpoint) = self.endpoint(action_type);
        let payload = self.payload(action_type, state)?;

        Ok(PlannedAction::new(
            action_type,
            service,
            endpoint,
            payload,
            Self::expected_outcome(action_type),
        ))
    }

    fn observe(&self, step: &ActionStep, state: &ReActState) -> Observation {
        let action_type = step.action_type();
        let remaining = state
            .intent
            .checklist()
            .into_iter()
            .find(|t| *t != action_type && !state.has_completed(*t));

        let (observation, analysis, impact, suggestion, data) = match (&step.result, &step.error) {
            (Some(result), None) => (
                result.summary(),
                format!(
                    "'{}' succeeded in {}ms; expected {}",
                    action_type, step.duration_ms, step.action.expected_outcome
                ),
                Impact::Positive,
                Some(match remaining {
                    Some(t) => format!("Proceed with '{}'", t),
                    None => "Goal should now be complete".to_string(),
                }),
                result.to_value(),
            ),
            (_, Some(error)) => (
                format!("Action '{}' failed: {}", action_type, error),
                format!(
                    "'{}' failed after {} attempt(s)",
                    action_type, step.attempts
                ),
                Impact::Negative,
                Some(if step.action.fallback_actions.is_empty() {
                    "No fallback declared; stop".to_string()
                } else {
                    "Try the declared fallback".to_string()
                }),
                json!({ "error": error }),
            ),
            (None, None) => (
                format!("Action '{}' returned nothing", action_type),
                "No result recorded".to_string(),
                Impact::Neutral,
                None,
                Value::Null,
            ),
        };

        Observation {
            id: uuid::Uuid::new_v4().to_string(),
            action_id: step.id.clone(),
            observation,
            analysis,
            impact,
            next_step_suggestion: suggestion,
            data,
            timestamp: Utc::now(),
        }
    }
}
