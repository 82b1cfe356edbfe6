//! In-process job registry and cooperative control flags.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;

use crate::models::{Job, JobStatus};

use super::OrchestrationError;

/// Cooperative control surface shared between the registry and a running
/// pipeline. Stop is an abort flag polled between candidates; pause is a
/// latch the worker blocks on until resumed.
pub struct JobControl {
    abort: AtomicBool,
    pause_tx: watch::Sender<bool>,
}

impl JobControl {
    pub fn new() -> Arc<Self> {
        let (pause_tx, _) = watch::channel(false);
        Arc::new(Self {
            abort: AtomicBool::new(false),
            pause_tx,
        })
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
        // A paused job must wake to observe the abort
        let _ = self.pause_tx.send(false);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        let _ = self.pause_tx.send(paused);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    /// Block until unpaused. Returns immediately when not paused.
    pub async fn wait_if_paused(&self) {
        let mut rx = self.pause_tx.subscribe();
        while *rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct JobEntry {
    job: Job,
    control: Arc<JobControl>,
}

/// Registry of jobs owned by this process.
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
    allow_multi_jobs: bool,
}

impl JobRegistry {
    pub fn new(allow_multi_jobs: bool) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            allow_multi_jobs,
        }
    }

    /// Register a new running job. Fails with a conflict when another job
    /// is still live and multi-job mode is off.
    pub fn create(
        &self,
        operation_name: &str,
        start_url: &str,
        overrides: serde_json::Value,
    ) -> Result<(Job, Arc<JobControl>), OrchestrationError> {
        let mut jobs = self.jobs.lock().unwrap();

        if !self.allow_multi_jobs {
            if let Some(live) = jobs.values().find(|e| !e.job.status.is_terminal()) {
                return Err(OrchestrationError::JobConflict(format!(
                    "job {} ({}) is still {}",
                    live.job.id,
                    live.job.operation_name,
                    live.job.status.as_str()
                )));
            }
        }

        let job = Job::new(operation_name, start_url, overrides);
        let control = JobControl::new();
        jobs.insert(
            job.id.clone(),
            JobEntry {
                job: job.clone(),
                control: control.clone(),
            },
        );
        Ok((job, control))
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(id).map(|e| e.job.clone())
    }

    pub fn control(&self, id: &str) -> Option<Arc<JobControl>> {
        self.jobs.lock().unwrap().get(id).map(|e| e.control.clone())
    }

    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn pause(&self, id: &str) -> Result<Job, OrchestrationError> {
        self.transition(id, |entry| {
            if entry.job.status != JobStatus::Running {
                return Err(OrchestrationError::JobConflict(format!(
                    "job {} is {}, not running",
                    entry.job.id,
                    entry.job.status.as_str()
                )));
            }
            entry.control.set_paused(true);
            entry.job.status = JobStatus::Paused;
            entry.job.paused = true;
            Ok(())
        })
    }

    pub fn resume(&self, id: &str) -> Result<Job, OrchestrationError> {
        self.transition(id, |entry| {
            if entry.job.status != JobStatus::Paused {
                return Err(OrchestrationError::JobConflict(format!(
                    "job {} is {}, not paused",
                    entry.job.id,
                    entry.job.status.as_str()
                )));
            }
            entry.control.set_paused(false);
            entry.job.status = JobStatus::Running;
            entry.job.paused = false;
            Ok(())
        })
    }

    pub fn stop(&self, id: &str) -> Result<Job, OrchestrationError> {
        self.transition(id, |entry| {
            if entry.job.status.is_terminal() {
                return Err(OrchestrationError::JobConflict(format!(
                    "job {} already {}",
                    entry.job.id,
                    entry.job.status.as_str()
                )));
            }
            entry.control.request_abort();
            entry.job.status = JobStatus::Stopping;
            entry.job.abort_requested = true;
            entry.job.paused = false;
            Ok(())
        })
    }

    /// Mark a job finished and store its final progress payload.
    pub fn complete(&self, id: &str, failed: bool, progress: serde_json::Value) {
        if let Some(entry) = self.jobs.lock().unwrap().get_mut(id) {
            entry.job.status = if failed {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            };
            entry.job.finished_at = Some(Utc::now());
            entry.job.progress = progress;
        }
    }

    pub fn update_progress(&self, id: &str, progress: serde_json::Value) {
        if let Some(entry) = self.jobs.lock().unwrap().get_mut(id) {
            entry.job.progress = progress;
        }
    }

    fn transition(
        &self,
        id: &str,
        apply: impl FnOnce(&mut JobEntry) -> Result<(), OrchestrationError>,
    ) -> Result<Job, OrchestrationError> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| OrchestrationError::UnknownJob(id.to_string()))?;
        apply(entry)?;
        Ok(entry.job.clone())
    }
}
