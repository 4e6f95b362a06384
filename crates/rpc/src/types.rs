//! Types for the RPC server.

use chrono::{DateTime, Utc};
use jsonrpsee::types::{
    error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE},
    ErrorObjectOwned,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of an operation as seen by RPC clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcOperationStatus {
    /// Accepted by the backend, not started yet.
    Pending,

    /// Executing.
    Running,

    /// Finished with a result.
    Succeeded,

    /// Finished without a result.
    Failed,

    /// Cancelled on request.
    Cancelled,
}

/// Acknowledgement of a created operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcOperationCreated {
    /// Identifier to poll and cancel with.
    pub id: String,

    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// Operation details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcOperation {
    /// Identifier.
    pub id: String,

    /// Current status.
    pub status: RpcOperationStatus,

    /// Submission time.
    pub created_at: DateTime<Utc>,

    /// Start time, unset while pending.
    pub started_at: Option<DateTime<Utc>>,

    /// Finish time, set once the operation is terminal.
    pub finished_at: Option<DateTime<Utc>>,

    /// Output of a successful run.
    pub result: Option<Value>,
}

/// Public half of the server identity derived for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcPersonalServer {
    /// EIP-55 checksummed server address.
    pub address: String,

    /// Uncompressed secp256k1 public key, hex without `0x`.
    pub public_key: String,
}

/// Server identity derived for a user.
///
/// The private key never leaves the gateway process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcServerIdentity {
    /// The user address the identity was derived for, as supplied.
    pub user_address: String,

    /// The user's personal server.
    pub personal_server: RpcPersonalServer,
}

/// Class of an RPC failure, mirroring HTTP status classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input.
    Validation,

    /// Missing credentials.
    Authentication,

    /// Credentials present but insufficient, e.g. a bad request signature.
    Authorization,

    /// The referenced resource does not exist.
    NotFound,

    /// Anything else.
    Server,
}

impl ErrorKind {
    /// Equivalent HTTP status code.
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Server => 500,
        }
    }

    /// JSON-RPC error code.
    pub const fn rpc_code(&self) -> i32 {
        match self {
            Self::Validation => INVALID_PARAMS_CODE,
            Self::Authentication => -32001,
            Self::Authorization => -32003,
            Self::NotFound => -32004,
            Self::Server => INTERNAL_ERROR_CODE,
        }
    }

    /// Machine-readable error code. Validation errors attributable to a field are suffixed with
    /// its upper-cased name.
    pub fn error_code(&self, field: Option<&str>) -> String {
        match (self, field) {
            (Self::Validation, Some(field)) => format!("VALIDATION_ERROR_{}", field.to_uppercase()),
            (Self::Validation, None) => "VALIDATION_ERROR".to_string(),
            (Self::Authentication, _) => "AUTHENTICATION_ERROR".to_string(),
            (Self::Authorization, _) => "AUTHORIZATION_ERROR".to_string(),
            (Self::NotFound, _) => "NOT_FOUND_ERROR".to_string(),
            (Self::Server, _) => "INTERNAL_SERVER_ERROR".to_string(),
        }
    }
}

/// Structured payload attached to every RPC error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorData {
    /// Human-readable description.
    pub detail: String,

    /// Machine-readable error code.
    pub error_code: String,

    /// Offending input field, if any.
    pub field: Option<String>,

    /// Equivalent HTTP status code.
    pub status: u16,
}

impl RpcErrorData {
    /// Builds the payload for `kind`, deriving the error code from the kind and field.
    pub fn new(kind: ErrorKind, detail: impl Into<String>, field: Option<String>) -> Self {
        Self {
            detail: detail.into(),
            error_code: kind.error_code(field.as_deref()),
            field,
            status: kind.status(),
        }
    }

    /// Overrides the error code.
    pub fn with_error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = error_code.into();
        self
    }

    /// Wraps the payload into a JSON-RPC error object.
    pub fn into_error_object(self, kind: ErrorKind) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(kind.rpc_code(), self.detail.clone(), Some(self))
    }
}
