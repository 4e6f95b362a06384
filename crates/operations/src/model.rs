//! Operation records and their state machine.
//!
//! ```text
//! PENDING ──▶ RUNNING ──▶ SUCCEEDED | FAILED
//!    │           │
//!    └───────────┴──────▶ CANCELLED
//! ```
//!
//! SUCCEEDED, FAILED and CANCELLED are terminal: once reached, nothing moves the record again.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier of an operation, assigned by the compute backend at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Wraps a backend-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A status string reported by the backend that maps to no [`OperationStatus`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation status reported by backend: {0:?}")]
pub struct UnknownStatus(pub String);

/// Status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Accepted by the backend, not started yet.
    Pending,

    /// Executing on the backend.
    Running,

    /// Finished with a result.
    Succeeded,

    /// Finished without a result.
    Failed,

    /// Stopped on request before finishing.
    Cancelled,
}

impl OperationStatus {
    /// Whether no transition can leave this status.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Position along the state machine. Transitions only ever increase it.
    const fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed | Self::Cancelled => 2,
        }
    }

    /// Canonical lower-case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = UnknownStatus;

    /// Parses a backend status name. Besides the canonical names this accepts the spellings used
    /// by hosted inference backends (`starting`, `processing`, `canceled`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" | "starting" => Ok(Self::Pending),
            "running" | "processing" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Handle returned when an operation is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    /// Identifier to poll and cancel with.
    pub id: OperationId,

    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// A backend status report, already translated into the state machine's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Reported status.
    pub status: OperationStatus,

    /// Start time, if the backend knows it.
    pub started_at: Option<DateTime<Utc>>,

    /// Finish time, if the backend knows it.
    pub finished_at: Option<DateTime<Utc>>,

    /// Result payload, meaningful only with [`OperationStatus::Succeeded`].
    pub result: Option<Value>,
}

/// Outcome of feeding an observation or a cancellation into an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record moved from one status to another.
    Applied {
        /// Status before.
        from: OperationStatus,
        /// Status after.
        to: OperationStatus,
    },

    /// The report repeated the current status.
    Unchanged,

    /// The report is behind the current status and was ignored.
    Stale,

    /// The record is terminal; nothing changed.
    AlreadyTerminal,
}

/// An operation tracked by the gateway.
///
/// `started_at` is set iff the status is not [`OperationStatus::Pending`]; `finished_at` is set
/// iff the status is terminal; `result` only ever accompanies [`OperationStatus::Succeeded`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Identifier assigned at creation.
    id: OperationId,

    /// Current status.
    status: OperationStatus,

    /// Submission time.
    created_at: DateTime<Utc>,

    /// First time the operation was seen out of [`OperationStatus::Pending`].
    started_at: Option<DateTime<Utc>>,

    /// First time the operation was seen terminal.
    finished_at: Option<DateTime<Utc>>,

    /// Result of a successful run.
    result: Option<Value>,
}

impl Operation {
    /// Creates a pending operation.
    pub const fn new(id: OperationId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: OperationStatus::Pending,
            created_at,
            started_at: None,
            finished_at: None,
            result: None,
        }
    }

    /// Identifier.
    pub const fn id(&self) -> &OperationId {
        &self.id
    }

    /// Current status.
    pub const fn status(&self) -> OperationStatus {
        self.status
    }

    /// Submission time.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Start time.
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Finish time.
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Result of a successful run.
    pub const fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Whether the operation has reached a terminal status.
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Folds a backend observation into the record.
    ///
    /// Timestamps come from the observation when present and fall back to `now`. A jump
    /// straight from pending to a terminal status backfills `started_at`.
    pub fn observe(&mut self, observation: Observation, now: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::AlreadyTerminal;
        }

        let from = self.status;
        let to = observation.status;
        match to.rank().cmp(&from.rank()) {
            std::cmp::Ordering::Less => return Transition::Stale,
            std::cmp::Ordering::Equal => return Transition::Unchanged,
            std::cmp::Ordering::Greater => {}
        }

        let finished_at = to
            .is_terminal()
            .then(|| observation.finished_at.unwrap_or(now));
        if self.started_at.is_none() {
            self.started_at = Some(observation.started_at.or(finished_at).unwrap_or(now));
        }
        self.finished_at = finished_at;
        if to == OperationStatus::Succeeded {
            self.result = observation.result;
        }
        self.status = to;

        Transition::Applied { from, to }
    }

    /// Marks the operation cancelled.
    ///
    /// A pending operation gets `started_at = now` as well, since only pending records may lack
    /// a start time.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::AlreadyTerminal;
        }

        let from = self.status;
        self.started_at.get_or_insert(now);
        self.finished_at = Some(now);
        self.status = OperationStatus::Cancelled;

        Transition::Applied {
            from,
            to: OperationStatus::Cancelled,
        }
    }

    /// Whether the timestamp and result invariants hold.
    pub fn is_consistent(&self) -> bool {
        let started_ok = self.started_at.is_some() == (self.status != OperationStatus::Pending);
        let finished_ok = self.finished_at.is_some() == self.status.is_terminal();
        let result_ok = self.result.is_none() || self.status == OperationStatus::Succeeded;

        started_ok && finished_ok && result_ok
    }
}
