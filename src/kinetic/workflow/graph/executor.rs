// SPDX-License-Identifier: MIT

//! DAG workflow scheduler
//!
//! Steps run in batches: every pending step whose dependencies have all
//! completed is dispatched concurrently, and the whole batch settles before
//! the next one is computed. The first failing step fails the execution;
//! siblings that already succeeded keep their results.

use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::validate::validate_definition;
use crate::adk::error::{KineticError, Result};
use crate::adk::event::{EventBus, EventKind};
use crate::adk::invoker::{InvocationRequest, StepInvoker};
use crate::adk::runs::{RunHandle, RunRegistry};
use crate::adk::store::{RecordStore, StateStore, DEFAULT_TTL};
use crate::kinetic::workflow::mapping::{apply_output_mapping, resolve_step_input};
use crate::kinetic::workflow::types::{
    ExecutionMetadata, ExecutionStatus, WorkflowDefinition, WorkflowExecution, WorkflowStep,
};

/// Store namespace for workflow execution records
pub const EXECUTION_NAMESPACE: &str = "workflow:execution";

/// Executes workflow definitions on background tasks
#[derive(Clone)]
pub struct WorkflowEngine {
    invoker: Arc<dyn StepInvoker>,
    records: RecordStore<WorkflowExecution>,
    events: EventBus,
    runs: RunRegistry,
    call_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(invoker: Arc<dyn StepInvoker>, store: Arc<dyn StateStore>, events: EventBus) -> Self {
        Self {
            invoker,
            records: RecordStore::new(store, EXECUTION_NAMESPACE, DEFAULT_TTL),
            events,
            runs: RunRegistry::new(),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Expiry applied to execution records
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.records = self.records.with_ttl(ttl);
        self
    }

    /// Per-attempt timeout for steps that don't declare their own
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Validate and submit a workflow. Returns the execution id immediately;
    /// the run continues on a background task.
    ///
    /// Malformed definitions are rejected here. A definition whose steps can't
    /// all be scheduled (cycle or unknown dependency) still gets an execution,
    /// which fails with a dependency error.
    pub async fn execute_workflow(
        &self,
        definition: WorkflowDefinition,
        input: Map<String, Value>,
        metadata: ExecutionMetadata,
    ) -> Result<String> {
        match validate_definition(&definition) {
            Ok(()) => {}
            Err(KineticError::Dependency { pending }) => log::warn!(
                "Workflow {} has unschedulable steps {:?}",
                definition.id,
                pending
            ),
            Err(e) => return Err(e),
        }

        let id = uuid::Uuid::new_v4().to_string();
        let execution = WorkflowExecution::new(&id, &definition.id, input, metadata);
        self.records.save(&id, &execution).await?;

        let handle = self.runs.register(&id).await;
        log::info!(
            "Submitted workflow {} ({} steps) as execution {}",
            definition.id,
            definition.steps.len(),
            id
        );

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(definition, execution, handle).await;
        });

        Ok(id)
    }

    /// Latest stored record for an execution
    pub async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        self.records.load(id).await
    }

    /// Cancel a non-terminal execution. Returns false when the execution is
    /// absent or already terminal.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let handle = self.runs.get(id).await;
        let _guard = match handle.as_ref() {
            Some(h) => Some(h.lock().await),
            None => None,
        };

        let Some(mut execution) = self.records.load(id).await? else {
            return Ok(false);
        };
        if execution.transition(ExecutionStatus::Cancelled).is_err() {
            return Ok(false);
        }

        execution.current_step = None;
        execution.end_time = Some(Utc::now());
        self.records.save(id, &execution).await?;

        if let Some(h) = handle.as_ref() {
            h.cancel();
        }
        log::warn!("Execution {} cancelled", id);
        self.events.emit(
            EventKind::WorkflowCancelled,
            id,
            json!({"workflowId": execution.workflow_id}),
        );
        Ok(true)
    }

    async fn run(&self, def: WorkflowDefinition, mut exec: WorkflowExecution, handle: Arc<RunHandle>) {
        let outcome = if def.timeout_ms > 0 {
            let deadline = Duration::from_millis(def.timeout_ms);
            match tokio::time::timeout(deadline, self.drive(&def, &mut exec, &handle)).await {
                Ok(res) => res,
                Err(_) => {
                    log::warn!("Execution {} exceeded workflow timeout", exec.id);
                    Err(KineticError::Timeout {
                        what: format!("Workflow '{}'", def.id),
                        after_ms: def.timeout_ms,
                    })
                }
            }
        } else {
            self.drive(&def, &mut exec, &handle).await
        };

        match outcome {
            Ok(()) => self.complete(&mut exec, &handle).await,
            Err(KineticError::Cancelled) => {
                log::info!("Execution {} stopped after cancellation", exec.id);
            }
            Err(e) => self.fail(&mut exec, &handle, e.to_string()).await,
        }

        self.runs.remove(&exec.id).await;
    }

    async fn drive(
        &self,
        def: &WorkflowDefinition,
        exec: &mut WorkflowExecution,
        handle: &RunHandle,
    ) -> Result<()> {
        exec.transition(ExecutionStatus::Running)?;
        self.persist(exec, handle).await?;
        self.events.emit(
            EventKind::WorkflowStarted,
            &exec.id,
            json!({"workflowId": def.id, "steps": def.steps.len()}),
        );

        let mut pending: Vec<&WorkflowStep> = def.steps.iter().collect();
        let mut completed: HashSet<String> = HashSet::new();
        let mut batch_no = 0;

        while !pending.is_empty() {
            if handle.is_cancelled() {
                return Err(KineticError::Cancelled);
            }

            let ready: Vec<&WorkflowStep> = pending
                .iter()
                .copied()
                .filter(|s| s.depends_on.iter().all(|d| completed.contains(d)))
                .collect();

            if ready.is_empty() {
                let pending_ids: Vec<String> = pending.iter().map(|s| s.id.clone()).collect();
                log::error!(
                    "Execution {}: no runnable steps among {:?}",
                    exec.id,
                    pending_ids
                );
                return Err(KineticError::Dependency {
                    pending: pending_ids,
                });
            }

            batch_no += 1;
            let ready_ids: Vec<String> = ready.iter().map(|s| s.id.clone()).collect();
            log::info!(
                "Execution {} batch {}: dispatching {:?}",
                exec.id,
                batch_no,
                ready_ids
            );

            exec.current_step = Some(ready_ids.join(", "));
            self.persist(exec, handle).await?;
            for step in &ready {
                self.events.emit(
                    EventKind::StepStarted,
                    &exec.id,
                    json!({"stepId": step.id, "service": step.service, "batch": batch_no}),
                );
            }

            let calls = ready.iter().map(|step| {
                let input = resolve_step_input(step, &exec.input, &exec.step_results);
                self.run_step(def, step, input, &exec.id, handle)
            });
            let results = join_all(calls).await;

            let mut first_failure: Option<(String, KineticError)> = None;
            let mut settled = Vec::new();
            for (step, res) in ready.iter().zip(results) {
                match res {
                    Ok(output) => {
                        log::info!("Execution {}: step {} completed", exec.id, step.id);
                        completed.insert(step.id.clone());
                        exec.completed_steps.push(step.id.clone());
                        exec.step_results.insert(step.id.clone(), output);
                        settled.push((EventKind::StepCompleted, json!({"stepId": step.id})));
                    }
                    Err(KineticError::Cancelled) => return Err(KineticError::Cancelled),
                    Err(e) => {
                        log::error!("Execution {}: step {} failed: {}", exec.id, step.id, e);
                        exec.failed_steps.push(step.id.clone());
                        settled.push((
                            EventKind::StepFailed,
                            json!({"stepId": step.id, "error": e.to_string()}),
                        ));
                        if first_failure.is_none() {
                            first_failure = Some((step.id.clone(), e));
                        }
                    }
                }
            }
            pending.retain(|s| !completed.contains(&s.id));
            exec.current_step = None;

            self.persist(exec, handle).await?;
            for (kind, data) in settled {
                self.events.emit(kind, &exec.id, data);
            }

            if let Some((step_id, err)) = first_failure {
                return Err(KineticError::Other(format!(
                    "Step '{}' failed: {}",
                    step_id, err
                )));
            }
        }

        Ok(())
    }

    /// Invoke one step, honoring its retry budget and per-attempt timeout
    async fn run_step(
        &self,
        def: &WorkflowDefinition,
        step: &WorkflowStep,
        input: Map<String, Value>,
        execution_id: &str,
        handle: &RunHandle,
    ) -> Result<Value> {
        let max_retries = if step.retry_count > 0 {
            step.retry_count
        } else {
            def.retry_policy.max_retries
        };
        let timeout = if step.timeout_ms > 0 {
            Duration::from_millis(step.timeout_ms)
        } else {
            self.call_timeout
        };

        let request = InvocationRequest::new(&step.service, &step.endpoint)
            .with_method(step.method)
            .with_payload(Value::Object(input))
            .with_timeout(timeout);

        let mut retries = 0;
        loop {
            let attempt = handle
                .race(async {
                    match tokio::time::timeout(timeout, self.invoker.invoke(&request)).await {
                        Ok(res) => res,
                        Err(_) => Err(KineticError::Timeout {
                            what: format!("Step '{}'", step.id),
                            after_ms: timeout.as_millis() as u64,
                        }),
                    }
                })
                .await;

            match attempt {
                Ok(raw) => return Ok(apply_output_mapping(&step.output_mapping, raw)),
                Err(KineticError::Cancelled) => return Err(KineticError::Cancelled),
                Err(e) if retries < max_retries => {
                    retries += 1;
                    let delay = def.retry_policy.delay_for(retries);
                    log::warn!(
                        "Execution {}: step {} attempt {} failed ({}), retrying in {:?}",
                        execution_id,
                        step.id,
                        retries,
                        e,
                        delay
                    );
                    self.events.emit(
                        EventKind::StepRetrying,
                        execution_id,
                        json!({
                            "stepId": step.id,
                            "retry": retries,
                            "error": e.to_string(),
                            "delayMs": delay.as_millis() as u64,
                        }),
                    );
                    handle
                        .race(async {
                            tokio::time::sleep(delay).await;
                            Ok(())
                        })
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write the record unless the run has been cancelled in the meantime
    async fn persist(&self, exec: &WorkflowExecution, handle: &RunHandle) -> Result<()> {
        let _guard = handle.lock().await;
        if handle.is_cancelled() {
            return Err(KineticError::Cancelled);
        }
        self.records.save(&exec.id, exec).await
    }

    async fn complete(&self, exec: &mut WorkflowExecution, handle: &RunHandle) {
        if let Err(e) = exec.transition(ExecutionStatus::Completed) {
            log::error!("Execution {}: {}", exec.id, e);
            return;
        }
        exec.current_step = None;
        exec.output = Some(Value::Object(
            exec.step_results
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ));
        exec.end_time = Some(Utc::now());

        match self.persist(exec, handle).await {
            Ok(()) => {
                log::info!(
                    "Execution {} completed ({} steps)",
                    exec.id,
                    exec.completed_steps.len()
                );
                self.events.emit(
                    EventKind::WorkflowCompleted,
                    &exec.id,
                    json!({"workflowId": exec.workflow_id, "completedSteps": exec.completed_steps}),
                );
            }
            Err(KineticError::Cancelled) => {}
            Err(e) => log::error!("Execution {}: failed to store completion: {}", exec.id, e),
        }
    }

    async fn fail(&self, exec: &mut WorkflowExecution, handle: &RunHandle, error: String) {
        log::error!("Execution {} failed: {}", exec.id, error);
        if let Err(e) = exec.transition(ExecutionStatus::Failed) {
            log::error!("Execution {}: {}", exec.id, e);
            return;
        }
        exec.current_step = None;
        exec.error = Some(error.clone());
        exec.end_time = Some(Utc::now());

        match self.persist(exec, handle).await {
            Ok(()) => self.events.emit(
                EventKind::WorkflowFailed,
                &exec.id,
                json!({"workflowId": exec.workflow_id, "error": error}),
            ),
            Err(KineticError::Cancelled) => {}
            Err(e) => log::error!("Execution {}: failed to store failure: {}", exec.id, e),
        }
    }
}
