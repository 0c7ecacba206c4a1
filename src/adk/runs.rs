// SPDX-License-Identifier: MIT

//! Registry of runs that are live in this process
//!
//! Each live execution gets a [`RunHandle`] carrying its cancellation signal
//! and a write guard. The engine loop takes the guard before every persist
//! and stops writing once the signal has fired; `cancel` takes the same guard
//! before writing the cancelled record, so a terminal record is never
//! overwritten.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard, RwLock};

use crate::adk::error::{KineticError, Result};

/// Cancellation signal and write guard for one execution
pub struct RunHandle {
    guard: Mutex<()>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl RunHandle {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            guard: Mutex::new(()),
            cancel_tx,
            cancel_rx,
        }
    }

    /// Serialize writes to this execution's record
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().await
    }

    /// Fire the cancellation signal
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once the run has been cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender lives as long as self, so this never resolves early
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `fut` unless the execution is cancelled first, in which case the
    /// future is dropped and `KineticError::Cancelled` is returned
    pub async fn race<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(KineticError::Cancelled),
            res = fut => res,
        }
    }
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Live runs keyed by execution id
#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<String, Arc<RunHandle>>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: &str) -> Arc<RunHandle> {
        let handle = Arc::new(RunHandle::new());
        let mut runs = self.runs.write().await;
        runs.insert(id.to_string(), handle.clone());
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<RunHandle>> {
        let runs = self.runs.read().await;
        runs.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) {
        let mut runs = self.runs.write().await;
        runs.remove(id);
    }

    pub async fn active(&self) -> usize {
        self.runs.read().await.len()
    }
}
