// SPDX-License-Identifier: MIT

//! Job lifecycle manager for single-pass uploads
//!
//! pending -> processing -> {completed, failed, cancelled}; cancellation is
//! also allowed straight from pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::adk::error::{KineticError, Result};
use crate::adk::event::{EventBus, EventKind};
use crate::adk::store::{RecordStore, StateStore, DEFAULT_TTL};

pub const JOB_NAMESPACE: &str = "job";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Tracks upload jobs in the shared state store
#[derive(Clone)]
pub struct JobManager {
    records: RecordStore<Job>,
    events: EventBus,
    // Serializes read-check-write transitions
    write: Arc<Mutex<()>>,
}

impl JobManager {
    pub fn new(store: Arc<dyn StateStore>, events: EventBus) -> Self {
        Self {
            records: RecordStore::new(store, JOB_NAMESPACE, DEFAULT_TTL),
            events,
            write: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.records = self.records.with_ttl(ttl);
        self
    }

    pub async fn create_job(&self, file_name: &str, file_size: u64) -> Result<Job> {
        if file_name.trim().is_empty() {
            return Err(KineticError::validation("job file name must not be empty"));
        }
        let now = Utc::now();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            file_size,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };
        self.records.save(&job.id, &job).await?;
        log::info!("Created job {} for {} ({} bytes)", job.id, file_name, file_size);
        self.events.emit(
            EventKind::JobCreated,
            &job.id,
            json!({"fileName": job.file_name, "fileSize": job.file_size}),
        );
        Ok(job)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        self.records.load(id).await
    }

    /// pending -> processing
    pub async fn start_job(&self, id: &str) -> Result<Job> {
        self.transition(id, EventKind::JobStarted, |job| {
            expect_status(job, JobStatus::Pending, JobStatus::Processing)?;
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            Ok(json!({}))
        })
        .await
    }

    /// Record progress on a processing job, clamped to 0..=100
    pub async fn update_progress(&self, id: &str, progress: i64) -> Result<Job> {
        self.transition(id, EventKind::JobProgress, |job| {
            if job.status != JobStatus::Processing {
                return Err(KineticError::invalid_transition(job.status, "progress update"));
            }
            job.progress = progress.clamp(0, 100) as u8;
            Ok(json!({"progress": job.progress}))
        })
        .await
    }

    /// processing -> completed
    pub async fn complete_job(&self, id: &str, result: Value) -> Result<Job> {
        self.transition(id, EventKind::JobCompleted, |job| {
            expect_status(job, JobStatus::Processing, JobStatus::Completed)?;
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.result = Some(result);
            job.completed_at = Some(Utc::now());
            Ok(json!({}))
        })
        .await
    }

    /// processing -> failed
    pub async fn fail_job(&self, id: &str, error: &str) -> Result<Job> {
        self.transition(id, EventKind::JobFailed, |job| {
            expect_status(job, JobStatus::Processing, JobStatus::Failed)?;
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
            Ok(json!({"error": error}))
        })
        .await
    }

    /// Cancel a pending or processing job. Returns false when the job is
    /// absent or already terminal.
    pub async fn cancel_job(&self, id: &str) -> Result<bool> {
        let _guard = self.write.lock().await;
        let Some(mut job) = self.records.load(id).await? else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            return Ok(false);
        }

        let now = Utc::now();
        job.status = JobStatus::Cancelled;
        job.updated_at = now;
        job.completed_at = Some(now);
        self.records.save(id, &job).await?;
        log::warn!("Job {} cancelled", id);
        self.events.emit(EventKind::JobCancelled, id, json!({}));
        Ok(true)
    }

    async fn transition<F>(&self, id: &str, kind: EventKind, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<Value>,
    {
        let _guard = self.write.lock().await;
        let mut job = self
            .records
            .load(id)
            .await?
            .ok_or_else(|| KineticError::not_found("job", id))?;

        let data = apply(&mut job)?;
        job.updated_at = Utc::now();
        self.records.save(id, &job).await?;

        log::debug!("Job {} -> {} ({}%)", id, job.status, job.progress);
        self.events.emit(kind, id, data);
        Ok(job)
    }
}

fn expect_status(job: &Job, required: JobStatus, target: JobStatus) -> Result<()> {
    if job.status != required {
        return Err(KineticError::invalid_transition(job.status, target));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::store::MemoryStateStore;

    fn manager() -> (JobManager, EventBus) {
        let events = EventBus::new(64);
        (
            JobManager::new(Arc::new(MemoryStateStore::new()), events.clone()),
            events,
        )
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (jobs, events) = manager();
        let mut rx = events.subscribe();

        let job = jobs.create_job("talk.mp4", 1024).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        jobs.start_job(&job.id).await.unwrap();
        jobs.update_progress(&job.id, 40).await.unwrap();
        let done = jobs
            .complete_job(&job.id, json!({"transcript": "hi"}))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());

        let stored = jobs.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored, done);

        let mut kinds = Vec::new();
        while let Ok(e) = rx.try_recv() {
            kinds.push(e.event);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::JobCreated,
                EventKind::JobStarted,
                EventKind::JobProgress,
                EventKind::JobCompleted
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_is_clamped_and_requires_processing() {
        let (jobs, _) = manager();
        let job = jobs.create_job("a.wav", 1).await.unwrap();

        assert!(matches!(
            jobs.update_progress(&job.id, 10).await,
            Err(KineticError::InvalidTransition { .. })
        ));

        jobs.start_job(&job.id).await.unwrap();
        assert_eq!(jobs.update_progress(&job.id, 250).await.unwrap().progress, 100);
        assert_eq!(jobs.update_progress(&job.id, -5).await.unwrap().progress, 0);
    }

    #[tokio::test]
    async fn test_start_requires_pending() {
        let (jobs, _) = manager();
        let job = jobs.create_job("a.wav", 1).await.unwrap();
        jobs.start_job(&job.id).await.unwrap();
        assert!(matches!(
            jobs.start_job(&job.id).await,
            Err(KineticError::InvalidTransition { .. })
        ));
        assert!(matches!(
            jobs.start_job("missing").await,
            Err(KineticError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_only_from_live_states() {
        let (jobs, _) = manager();

        let pending = jobs.create_job("p.wav", 1).await.unwrap();
        assert!(jobs.cancel_job(&pending.id).await.unwrap());
        assert!(!jobs.cancel_job(&pending.id).await.unwrap());

        let processing = jobs.create_job("q.wav", 1).await.unwrap();
        jobs.start_job(&processing.id).await.unwrap();
        assert!(jobs.cancel_job(&processing.id).await.unwrap());
        assert!(matches!(
            jobs.complete_job(&processing.id, Value::Null).await,
            Err(KineticError::InvalidTransition { .. })
        ));

        let failed = jobs.create_job("r.wav", 1).await.unwrap();
        jobs.start_job(&failed.id).await.unwrap();
        jobs.fail_job(&failed.id, "decoder crashed").await.unwrap();
        assert!(!jobs.cancel_job(&failed.id).await.unwrap());
        assert_eq!(
            jobs.get_job(&failed.id).await.unwrap().unwrap().error.as_deref(),
            Some("decoder crashed")
        );

        assert!(!jobs.cancel_job("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_file_name_rejected() {
        let (jobs, _) = manager();
        assert!(matches!(
            jobs.create_job(" ", 0).await,
            Err(KineticError::Validation(_))
        ));
    }
}
