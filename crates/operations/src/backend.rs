//! The compute backend seam: whatever actually executes submitted work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::OperationId;

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Identifier assigned by the backend.
    pub id: OperationId,

    /// When the backend accepted the job.
    pub created_at: DateTime<Utc>,
}

/// Status of a job as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReport {
    /// Backend status name, translated by the lifecycle manager.
    pub status: String,

    /// When the job started, if it has.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job finished, if it has.
    pub finished_at: Option<DateTime<Utc>>,

    /// Output of a successful job.
    pub result: Option<Value>,
}

/// Errors raised by a [`ComputeBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend refused the payload.
    #[error("payload rejected: {message}")]
    Rejected {
        /// Why the payload was refused.
        message: String,

        /// The offending payload field, when attributable to one.
        field: Option<String>,
    },

    /// The backend has no job under this identifier.
    #[error("unknown job '{0}'")]
    UnknownJob(OperationId),

    /// The backend could not be reached or failed internally.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Executes submitted jobs and reports on them.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Submits a validated request payload for execution.
    async fn submit(&self, payload: &Value) -> Result<Submission, BackendError>;

    /// Reports the current status of a job.
    async fn status(&self, id: &OperationId) -> Result<BackendReport, BackendError>;

    /// Requests cancellation. Returns whether the job was actually cancelled.
    async fn cancel(&self, id: &OperationId) -> Result<bool, BackendError>;
}
