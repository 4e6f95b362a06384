//! In-memory implementation of the compute backend.
//!
//! Jobs never execute anything; they move when driven through [`InMemoryBackend::start`],
//! [`InMemoryBackend::succeed`] and [`InMemoryBackend::fail`], or by the simulator task.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::{sync::RwLock, task::JoinHandle, time::interval};
use tracing::{debug, info};

use crate::{
    backend::{BackendError, BackendReport, ComputeBackend, Submission},
    model::{OperationId, OperationStatus},
};

/// A job held by the in-memory backend.
#[derive(Debug, Clone)]
struct Job {
    /// Submitted payload.
    payload: Value,

    /// Current status.
    status: OperationStatus,

    /// Start time.
    started_at: Option<DateTime<Utc>>,

    /// Finish time.
    finished_at: Option<DateTime<Utc>>,

    /// Output of a successful run.
    result: Option<Value>,
}

#[derive(Debug, Default)]
struct Jobs {
    /// Counter behind the `op-<n>` identifiers.
    last_id: u64,

    /// Jobs by identifier.
    jobs: BTreeMap<OperationId, Job>,
}

/// In-memory compute backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<RwLock<Jobs>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a pending job to running. Returns whether the job moved.
    pub async fn start(&self, id: &OperationId) -> Result<bool, BackendError> {
        self.advance(id, OperationStatus::Running, None).await
    }

    /// Finishes a job successfully with `result`. Returns whether the job moved.
    pub async fn succeed(&self, id: &OperationId, result: Value) -> Result<bool, BackendError> {
        self.advance(id, OperationStatus::Succeeded, Some(result))
            .await
    }

    /// Finishes a job unsuccessfully. Returns whether the job moved.
    pub async fn fail(&self, id: &OperationId) -> Result<bool, BackendError> {
        self.advance(id, OperationStatus::Failed, None).await
    }

    /// Number of jobs ever submitted.
    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    /// Whether nothing was ever submitted.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Spawns a task that moves every job one step per `period`: pending jobs start, running
    /// jobs succeed with their payload echoed back as the result.
    pub fn spawn_simulator(&self, period: Duration) -> JoinHandle<()> {
        let backend = self.clone();

        tokio::spawn(async move {
            info!(?period, "starting in-memory backend simulator");
            let mut ticker = interval(period);

            loop {
                ticker.tick().await;

                let mut inner = backend.inner.write().await;
                let now = Utc::now();
                for (id, job) in inner.jobs.iter_mut() {
                    match job.status {
                        OperationStatus::Pending => {
                            job.status = OperationStatus::Running;
                            job.started_at = Some(now);
                        }
                        OperationStatus::Running => {
                            job.status = OperationStatus::Succeeded;
                            job.finished_at = Some(now);
                            job.result = Some(json!({ "echo": job.payload.clone() }));
                        }
                        _ => continue,
                    }
                    debug!(%id, status = %job.status, "simulator advanced job");
                }
            }
        })
    }

    async fn advance(
        &self,
        id: &OperationId,
        to: OperationStatus,
        result: Option<Value>,
    ) -> Result<bool, BackendError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::UnknownJob(id.clone()))?;

        let allowed = match to {
            OperationStatus::Running => job.status == OperationStatus::Pending,
            _ => !job.status.is_terminal(),
        };
        if !allowed {
            return Ok(false);
        }

        let now = Utc::now();
        job.status = to;
        if to == OperationStatus::Running {
            job.started_at = Some(now);
        }
        if to.is_terminal() {
            job.started_at.get_or_insert(now);
            job.finished_at = Some(now);
            job.result = result;
        }

        Ok(true)
    }
}

#[async_trait]
impl ComputeBackend for InMemoryBackend {
    async fn submit(&self, payload: &Value) -> Result<Submission, BackendError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;

        let id = OperationId::new(format!("op-{}", inner.last_id));
        let created_at = Utc::now();
        inner.jobs.insert(
            id.clone(),
            Job {
                payload: payload.clone(),
                status: OperationStatus::Pending,
                started_at: None,
                finished_at: None,
                result: None,
            },
        );

        Ok(Submission { id, created_at })
    }

    async fn status(&self, id: &OperationId) -> Result<BackendReport, BackendError> {
        let inner = self.inner.read().await;
        let job = inner
            .jobs
            .get(id)
            .ok_or_else(|| BackendError::UnknownJob(id.clone()))?;

        Ok(BackendReport {
            status: job.status.to_string(),
            started_at: job.started_at,
            finished_at: job.finished_at,
            result: job.result.clone(),
        })
    }

    async fn cancel(&self, id: &OperationId) -> Result<bool, BackendError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| BackendError::UnknownJob(id.clone()))?;

        if job.status.is_terminal() {
            return Ok(false);
        }

        job.status = OperationStatus::Cancelled;
        job.finished_at = Some(Utc::now());
        Ok(true)
    }
}
