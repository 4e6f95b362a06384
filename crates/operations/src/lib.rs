//! Lifecycle of operations submitted to a compute backend.
//!
//! An operation is created from a signed JSON request, handed to a [`ComputeBackend`] and then
//! tracked by identifier. Polling folds the backend's reports into the record; cancellation is
//! best-effort and idempotent.
//!
//! ```text
//! create(request, signature)
//!     └─ SignatureValidator::verify ─▶ parse_request ─▶ ComputeBackend::submit ─▶ OperationStore
//! get(id)     ─▶ per-operation lock ─▶ ComputeBackend::status ─▶ Operation::observe
//! cancel(id)  ─▶ per-operation lock ─▶ ComputeBackend::cancel ─▶ Operation::cancel
//! ```

pub mod backend;
pub mod errors;
pub mod inmemory;
pub mod manager;
pub mod model;
pub mod request;
pub mod signature;
pub mod store;

pub use backend::{BackendError, BackendReport, ComputeBackend, Submission};
pub use errors::{OperationError, OperationResult};
pub use inmemory::InMemoryBackend;
pub use manager::OperationLifecycleManager;
pub use model::{Operation, OperationHandle, OperationId, OperationStatus, UnknownStatus};
pub use signature::{PersonalSignValidator, SignatureError, SignatureValidator};
pub use store::OperationStore;
