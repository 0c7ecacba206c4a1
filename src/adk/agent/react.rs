// SPDX-License-Identifier: MIT

//! ReAct engine - Reasoning + Acting toward a goal
//!
//! One action is in flight at a time. Each iteration reasons over the full
//! history, executes the chosen action through the [`StepInvoker`], records
//! an observation and then checks whether the run is done. State is
//! persisted after every phase and events follow the persisted record.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::intent::GoalIntent;
use super::planner::{CapabilityPlanner, Planner};
use super::types::{
    ActionResult, ActionStatus, ActionStep, Decision, PlannedAction, ReActState, ReActStatus,
    ReActTrace, ReasoningStep,
};
use crate::adk::error::{KineticError, Result};
use crate::adk::event::{EventBus, EventKind};
use crate::adk::invoker::{InvocationRequest, StepInvoker};
use crate::adk::retry::RetryPolicy;
use crate::adk::runs::{RunHandle, RunRegistry};
use crate::adk::store::{RecordStore, StateStore, DEFAULT_TTL};

/// Store namespace for ReAct state records
pub const STATE_NAMESPACE: &str = "react:state";

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

#[derive(Clone)]
pub struct ReActEngine {
    invoker: Arc<dyn StepInvoker>,
    planner: Arc<dyn Planner>,
    records: RecordStore<ReActState>,
    events: EventBus,
    runs: RunRegistry,
    max_iterations: u32,
    call_timeout: Duration,
    action_retry: RetryPolicy,
}

impl ReActEngine {
    pub fn new(invoker: Arc<dyn StepInvoker>, store: Arc<dyn StateStore>, events: EventBus) -> Self {
        Self {
            invoker,
            planner: Arc::new(CapabilityPlanner::default()),
            records: RecordStore::new(store, STATE_NAMESPACE, DEFAULT_TTL),
            events,
            runs: RunRegistry::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            call_timeout: Duration::from_secs(30),
            action_retry: RetryPolicy::none(),
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.records = self.records.with_ttl(ttl);
        self
    }

    /// Iteration cap; always at least one
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Retry policy applied to every action call
    pub fn with_action_retry(mut self, policy: RetryPolicy) -> Self {
        self.action_retry = policy;
        self
    }

    /// Resolve the goal's intent, persist the initial state and start the loop
    /// in the background. Returns the execution id immediately.
    pub async fn execute_goal(&self, goal: &str, context: Map<String, Value>) -> Result<String> {
        if goal.trim().is_empty() {
            return Err(KineticError::validation("goal must not be empty"));
        }
        let intent = GoalIntent::resolve(goal, &context)?;
        intent.validate_context(&context)?;

        let id = uuid::Uuid::new_v4().to_string();
        let state = ReActState::new(&id, goal, intent, context, self.max_iterations);
        self.records.save(&id, &state).await?;

        let handle = self.runs.register(&id).await;
        log::info!("Starting ReAct execution {} ({}) for goal: {}", id, intent, goal);

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(state, handle).await;
        });

        Ok(id)
    }

    pub async fn get_state(&self, id: &str) -> Result<Option<ReActState>> {
        self.records.load(id).await
    }

    pub async fn get_trace(&self, id: &str) -> Result<Option<ReActTrace>> {
        Ok(self.records.load(id).await?.as_ref().map(ReActTrace::from))
    }

    /// Cancel a non-terminal run. Returns false when absent or already terminal.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let handle = self.runs.get(id).await;
        let _guard = match handle.as_ref() {
            Some(h) => Some(h.lock().await),
            None => None,
        };

        let Some(mut state) = self.records.load(id).await? else {
            return Ok(false);
        };
        if state.status.is_terminal() {
            return Ok(false);
        }

        let now = Utc::now();
        state.status = ReActStatus::Cancelled;
        state.next_action = None;
        state.updated_at = now;
        state.completed_at = Some(now);
        self.records.save(id, &state).await?;

        if let Some(h) = handle.as_ref() {
            h.cancel();
        }
        log::warn!("ReAct execution {} cancelled", id);
        self.events.emit(
            EventKind::ReactCancelled,
            id,
            json!({"iteration": state.iteration}),
        );
        Ok(true)
    }

    async fn run(&self, mut state: ReActState, handle: Arc<RunHandle>) {
        match self.drive(&mut state, &handle).await {
            Ok(()) => self.complete(&mut state, &handle).await,
            Err(KineticError::Cancelled) => {
                log::info!(
                    "ReAct execution {} stopped after cancellation",
                    state.execution_id
                );
            }
            Err(e) => self.fail(&mut state, &handle, e.to_string()).await,
        }
        self.runs.remove(&state.execution_id).await;
    }

    async fn drive(&self, state: &mut ReActState, handle: &RunHandle) -> Result<()> {
        self.persist(state, handle).await?;
        self.events.emit(
            EventKind::ReactStarted,
            &state.execution_id,
            json!({"goal": state.goal, "intent": state.intent}),
        );

        loop {
            if handle.is_cancelled() {
                return Err(KineticError::Cancelled);
            }
            state.iteration += 1;

            // Reasoning
            state.status = ReActStatus::Reasoning;
            let (reasoning, action) = self.reason(state).await?;
            log::info!(
                "ReAct {} iteration {}/{}: decision {:?}",
                state.execution_id,
                state.iteration,
                state.max_iterations,
                reasoning.decision
            );
            log::debug!("ReAct {} thought: {}", state.execution_id, reasoning.thought);

            let reasoning_id = reasoning.id.clone();
            let decision = reasoning.decision;
            let confidence = reasoning.confidence;
            state.current_thought = Some(reasoning.thought.clone());
            state.reasoning_trace.push(reasoning);
            state.next_action = action.clone();
            self.persist(state, handle).await?;
            self.events.emit(
                EventKind::ReactReasoning,
                &state.execution_id,
                json!({
                    "iteration": state.iteration,
                    "decision": decision,
                    "confidence": confidence,
                }),
            );

            let Some(action) = action else {
                if self.planner.is_goal_complete(state) {
                    return Ok(());
                }
                return Err(KineticError::validation(
                    "checklist exhausted before the goal was reached",
                ));
            };

            // Acting
            state.status = ReActStatus::Acting;
            let mut step = ActionStep::new(action, reasoning_id);
            step.status = ActionStatus::Executing;
            state.action_history.push(step.clone());
            self.persist(state, handle).await?;
            self.events.emit(
                EventKind::ReactActing,
                &state.execution_id,
                json!({
                    "iteration": state.iteration,
                    "actionId": step.id,
                    "actionType": step.action_type(),
                    "service": step.action.service,
                }),
            );
            log::debug!(
                "ReAct {} {} payload: {}",
                state.execution_id,
                step.action_type(),
                step.action.payload
            );

            self.act(&mut step, &state.execution_id, handle).await?;
            state.next_action = None;
            if let Some(last) = state.action_history.last_mut() {
                *last = step.clone();
            }

            // Observing
            state.status = ReActStatus::Observing;
            let observation = self.planner.observe(&step, state);
            let impact = observation.impact;
            state.observations.push(observation);
            self.persist(state, handle).await?;
            self.events.emit(
                EventKind::ReactObserving,
                &state.execution_id,
                json!({
                    "iteration": state.iteration,
                    "actionType": step.action_type(),
                    "impact": impact,
                }),
            );

            // Termination check
            if step.failed() {
                let error = step.error.clone().unwrap_or_default();
                match queue_fallback(&step.action) {
                    Some(fallback) => {
                        log::warn!(
                            "ReAct {}: '{}' failed, falling back to '{}'",
                            state.execution_id,
                            step.action_type(),
                            fallback.action_type
                        );
                        state.next_action = Some(fallback);
                    }
                    None => {
                        return Err(KineticError::Other(format!(
                            "Action '{}' failed: {}",
                            step.action_type(),
                            error
                        )));
                    }
                }
            } else if self.planner.is_goal_complete(state) {
                return Ok(());
            }

            if state.iteration >= state.max_iterations {
                log::warn!(
                    "ReAct {} hit the iteration cap of {}",
                    state.execution_id,
                    state.max_iterations
                );
                return Err(KineticError::IterationLimit {
                    limit: state.max_iterations,
                });
            }
        }
    }

    /// Reasoning phase. A queued fallback short-circuits the planner.
    async fn reason(&self, state: &ReActState) -> Result<(ReasoningStep, Option<PlannedAction>)> {
        if let Some(fallback) = state.next_action.clone() {
            let failed = state
                .last_action()
                .map(|a| a.action_type().to_string())
                .unwrap_or_default();
            let reasoning = ReasoningStep::new(
                format!(
                    "Iteration {}: '{}' failed, a fallback is available",
                    state.iteration, failed
                ),
                format!(
                    "Running fallback '{}' via {}{}",
                    fallback.action_type, fallback.service, fallback.endpoint
                ),
                Decision::Fallback,
                0.5,
            );
            return Ok((reasoning, Some(fallback)));
        }

        let reasoning = self.planner.reason(state).await?;
        let action = match reasoning.decision {
            Decision::Complete => None,
            _ => Some(self.planner.plan(&reasoning, state).await?),
        };
        Ok((reasoning, action))
    }

    /// Invoke the action with the configured retry policy and fill in its outcome
    async fn act(&self, step: &mut ActionStep, execution_id: &str, handle: &RunHandle) -> Result<()> {
        let action_type = step.action_type();
        let request = InvocationRequest::new(&step.action.service, &step.action.endpoint)
            .with_method(step.action.method)
            .with_payload(step.action.payload.clone())
            .with_timeout(self.call_timeout);

        let started = Instant::now();
        let mut retries = 0;
        let outcome = loop {
            step.attempts += 1;
            let attempt = handle
                .race(async {
                    match tokio::time::timeout(self.call_timeout, self.invoker.invoke(&request)).await
                    {
                        Ok(res) => res,
                        Err(_) => Err(KineticError::Timeout {
                            what: format!("Action '{}'", action_type),
                            after_ms: self.call_timeout.as_millis() as u64,
                        }),
                    }
                })
                .await;

            match attempt {
                Err(KineticError::Cancelled) => return Err(KineticError::Cancelled),
                Err(e) if retries < self.action_retry.max_retries => {
                    retries += 1;
                    let delay = self.action_retry.delay_for(retries);
                    log::warn!(
                        "ReAct {}: '{}' attempt {} failed ({}), retrying in {:?}",
                        execution_id,
                        action_type,
                        step.attempts,
                        e,
                        delay
                    );
                    handle
                        .race(async {
                            tokio::time::sleep(delay).await;
                            Ok(())
                        })
                        .await?;
                }
                other => break other,
            }
        };

        step.duration_ms = started.elapsed().as_millis() as u64;
        step.completed_at = Some(Utc::now());

        match outcome {
            Ok(raw) => {
                let result = ActionResult::parse(action_type, raw);
                match result.rejection() {
                    Some(reason) => {
                        log::error!("ReAct {}: '{}' rejected: {}", execution_id, action_type, reason);
                        step.status = ActionStatus::Failed;
                        step.error = Some(reason);
                    }
                    None => {
                        log::info!(
                            "ReAct {}: '{}' completed in {}ms",
                            execution_id,
                            action_type,
                            step.duration_ms
                        );
                        step.status = ActionStatus::Completed;
                    }
                }
                step.result = Some(result);
            }
            Err(e) => {
                log::error!("ReAct {}: '{}' failed: {}", execution_id, action_type, e);
                step.status = ActionStatus::Failed;
                step.error = Some(e.to_string());
            }
        }
        Ok(())
    }

    async fn persist(&self, state: &mut ReActState, handle: &RunHandle) -> Result<()> {
        let _guard = handle.lock().await;
        if handle.is_cancelled() {
            return Err(KineticError::Cancelled);
        }
        state.updated_at = Utc::now();
        self.records.save(&state.execution_id, state).await
    }

    async fn complete(&self, state: &mut ReActState, handle: &RunHandle) {
        let now = Utc::now();
        state.status = ReActStatus::Completed;
        state.next_action = None;
        state.final_result = Some(state.summarize(true));
        state.completed_at = Some(now);

        match self.persist(state, handle).await {
            Ok(()) => {
                log::info!(
                    "ReAct {} reached its goal in {} iteration(s)",
                    state.execution_id,
                    state.iteration
                );
                self.events.emit(
                    EventKind::ReactCompleted,
                    &state.execution_id,
                    json!({"iterations": state.iteration, "steps": state.action_history.len()}),
                );
            }
            Err(KineticError::Cancelled) => {}
            Err(e) => log::error!(
                "ReAct {}: failed to store completion: {}",
                state.execution_id,
                e
            ),
        }
    }

    async fn fail(&self, state: &mut ReActState, handle: &RunHandle, error: String) {
        log::error!("ReAct {} failed: {}", state.execution_id, error);
        state.status = ReActStatus::Failed;
        state.next_action = None;
        state.error = Some(error.clone());
        state.final_result = Some(state.summarize(false));
        state.completed_at = Some(Utc::now());

        match self.persist(state, handle).await {
            Ok(()) => self.events.emit(
                EventKind::ReactFailed,
                &state.execution_id,
                json!({"error": error, "iterations": state.iteration}),
            ),
            Err(KineticError::Cancelled) => {}
            Err(e) => log::error!(
                "ReAct {}: failed to store failure: {}",
                state.execution_id,
                e
            ),
        }
    }
}

/// First declared fallback, carrying the rest forward as its own fallbacks
fn queue_fallback(failed: &PlannedAction) -> Option<PlannedAction> {
    let (first, rest) = failed.fallback_actions.split_first()?;
    let mut next = first.clone();
    next.fallback_actions.extend(rest.iter().cloned());
    Some(next)
}
