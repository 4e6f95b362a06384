//! The operation lifecycle: create, poll and cancel work running on a compute backend.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    backend::{BackendError, ComputeBackend},
    errors::{OperationError, OperationResult},
    model::{Observation, Operation, OperationHandle, OperationId, OperationStatus, Transition},
    request::{parse_request, PAYLOAD_FIELD},
    signature::SignatureValidator,
    store::OperationStore,
};

/// Owns the create/get/cancel contract over a [`ComputeBackend`].
///
/// Every mutation of a record happens under that record's own lock, including the backend call
/// that motivates it, so concurrent callers on one operation are serialized while different
/// operations proceed independently.
#[derive(Debug)]
pub struct OperationLifecycleManager<B, V> {
    /// Executes the work.
    backend: B,

    /// Authenticates request payloads.
    validator: V,

    /// Every operation created through this manager.
    store: OperationStore,
}

impl<B, V> OperationLifecycleManager<B, V>
where
    B: ComputeBackend,
    V: SignatureValidator,
{
    /// Creates a manager with an empty store.
    pub fn new(backend: B, validator: V) -> Self {
        Self {
            backend,
            validator,
            store: OperationStore::new(),
        }
    }

    /// The compute backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The operation store.
    pub const fn store(&self) -> &OperationStore {
        &self.store
    }

    /// Verifies and submits a request, then starts tracking it as [`OperationStatus::Pending`].
    ///
    /// Nothing is recorded unless the backend accepted the job.
    pub async fn create(
        &self,
        request_json: &str,
        signature: &str,
    ) -> OperationResult<OperationHandle> {
        if signature.is_empty() {
            return Err(OperationError::Authentication(
                "request signature is required".to_string(),
            ));
        }

        if !self.validator.verify(request_json, signature).await {
            warn!("rejecting operation request with an invalid signature");
            return Err(OperationError::Authorization(
                "Invalid signature".to_string(),
            ));
        }

        let payload = parse_request(request_json)?;

        let submission = self
            .backend
            .submit(&payload)
            .await
            .map_err(|e| match e {
                BackendError::Rejected { message, field } => OperationError::Validation {
                    message,
                    field: field.or_else(|| Some(PAYLOAD_FIELD.to_string())),
                },
                other => other.into(),
            })?;

        self.store
            .insert(Operation::new(submission.id.clone(), submission.created_at))
            .await?;

        info!(operation_id = %submission.id, created_at = %submission.created_at, "operation created");

        Ok(OperationHandle {
            id: submission.id,
            created_at: submission.created_at,
        })
    }

    /// Returns the current state of an operation, folding in whatever the backend reports.
    ///
    /// Terminal operations are answered from the store without asking the backend.
    pub async fn get(&self, id: &OperationId) -> OperationResult<Operation> {
        let entry = self
            .store
            .entry(id)
            .await
            .ok_or_else(|| OperationError::NotFound(id.clone()))?;

        let mut operation = entry.lock().await;
        if !operation.is_terminal() {
            self.refresh(&mut operation).await?;
        }

        Ok(operation.clone())
    }

    /// Requests cancellation of an operation.
    ///
    /// Returns `true` iff this call moved the operation to [`OperationStatus::Cancelled`].
    /// Unknown and already finished operations yield `false`.
    pub async fn cancel(&self, id: &OperationId) -> OperationResult<bool> {
        let Some(entry) = self.store.entry(id).await else {
            debug!(operation_id = %id, "cancel requested for unknown operation");
            return Ok(false);
        };

        let mut operation = entry.lock().await;
        if operation.is_terminal() {
            debug!(operation_id = %id, status = %operation.status(), "operation already finished");
            return Ok(false);
        }

        if self.backend.cancel(id).await? {
            let transition = operation.cancel(Utc::now());
            info!(operation_id = %id, ?transition, "operation cancelled");
            return Ok(true);
        }

        // The backend refused, most likely because the job finished in the meantime.
        self.refresh(&mut operation).await?;
        debug!(operation_id = %id, status = %operation.status(), "backend declined cancellation");

        Ok(false)
    }

    async fn refresh(&self, operation: &mut Operation) -> OperationResult<Transition> {
        let report = self.backend.status(operation.id()).await?;
        let status: OperationStatus = report.status.parse()?;

        let transition = operation.observe(
            Observation {
                status,
                started_at: report.started_at,
                finished_at: report.finished_at,
                result: report.result,
            },
            Utc::now(),
        );

        match transition {
            Transition::Applied { from, to } => {
                info!(operation_id = %operation.id(), %from, %to, "operation status changed");
            }
            Transition::Stale => {
                warn!(operation_id = %operation.id(), reported = %status, current = %operation.status(), "ignoring stale backend status");
            }
            Transition::Unchanged | Transition::AlreadyTerminal => {}
        }

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use secp256k1::SecretKey;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        backend::{BackendReport, Submission},
        inmemory::InMemoryBackend,
        signature::{
            tests::{personal_sign, signer_of},
            PersonalSignValidator,
        },
    };

    /// Validator with a fixed answer.
    #[derive(Debug)]
    struct StaticValidator(bool);

    #[async_trait]
    impl SignatureValidator for StaticValidator {
        async fn verify(&self, _payload: &str, _signature: &str) -> bool {
            self.0
        }
    }

    /// Backend that reports a fixed status string for every job.
    #[derive(Debug)]
    struct FixedStatusBackend {
        inner: InMemoryBackend,
        status: &'static str,
    }

    #[async_trait]
    impl ComputeBackend for FixedStatusBackend {
        async fn submit(&self, payload: &Value) -> Result<Submission, BackendError> {
            self.inner.submit(payload).await
        }

        async fn status(&self, id: &OperationId) -> Result<BackendReport, BackendError> {
            let mut report = self.inner.status(id).await?;
            report.status = self.status.to_string();
            Ok(report)
        }

        async fn cancel(&self, id: &OperationId) -> Result<bool, BackendError> {
            self.inner.cancel(id).await
        }
    }

    /// Backend that refuses every payload.
    #[derive(Debug)]
    struct RejectingBackend;

    #[async_trait]
    impl ComputeBackend for RejectingBackend {
        async fn submit(&self, _payload: &Value) -> Result<Submission, BackendError> {
            Err(BackendError::Rejected {
                message: "model is not available".to_string(),
                field: Some("model".to_string()),
            })
        }

        async fn status(&self, id: &OperationId) -> Result<BackendReport, BackendError> {
            Err(BackendError::UnknownJob(id.clone()))
        }

        async fn cancel(&self, id: &OperationId) -> Result<bool, BackendError> {
            Err(BackendError::UnknownJob(id.clone()))
        }
    }

    fn manager() -> OperationLifecycleManager<InMemoryBackend, StaticValidator> {
        OperationLifecycleManager::new(InMemoryBackend::new(), StaticValidator(true))
    }

    #[tokio::test]
    async fn created_operations_start_pending() {
        let manager = manager();

        let handle = manager.create(r#"{"job":"x"}"#, "0xsig").await.unwrap();
        assert_eq!(handle.id.as_str(), "op-1");

        let op = manager.get(&handle.id).await.unwrap();
        assert_eq!(op.status(), OperationStatus::Pending);
        assert_eq!(op.created_at(), handle.created_at);
        assert_eq!(op.started_at(), None);
        assert_eq!(op.finished_at(), None);
        assert_eq!(op.result(), None);
    }

    #[tokio::test]
    async fn reflects_backend_completion() {
        let manager = manager();
        let id = manager.create(r#"{"job":"x"}"#, "0xsig").await.unwrap().id;

        manager.backend().start(&id).await.unwrap();
        assert_eq!(
            manager.get(&id).await.unwrap().status(),
            OperationStatus::Running
        );

        manager
            .backend()
            .succeed(&id, json!({ "score": 0.9 }))
            .await
            .unwrap();
        let backend_finished = manager.backend().status(&id).await.unwrap().finished_at;

        let op = manager.get(&id).await.unwrap();
        assert_eq!(op.status(), OperationStatus::Succeeded);
        assert_eq!(op.result(), Some(&json!({ "score": 0.9 })));
        assert_eq!(op.finished_at(), backend_finished);
        assert!(op.is_consistent());

        // Later polls never go back and never move the finish time.
        let again = manager.get(&id).await.unwrap();
        assert_eq!(again, op);
    }

    #[tokio::test]
    async fn unknown_operations_are_not_found() {
        let manager = manager();

        let err = manager.get(&"unknown-id".into()).await.unwrap_err();
        assert!(matches!(err, OperationError::NotFound(id) if id.as_str() == "unknown-id"));
    }

    #[tokio::test]
    async fn invalid_signature_creates_nothing() {
        let manager = OperationLifecycleManager::new(InMemoryBackend::new(), StaticValidator(false));

        let err = manager.create(r#"{"job":"x"}"#, "0xbad").await.unwrap_err();
        assert!(matches!(err, OperationError::Authorization(_)));

        assert!(manager.store().is_empty().await);
        assert!(manager.backend().is_empty().await);
        assert!(matches!(
            manager.get(&"op-1".into()).await,
            Err(OperationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_signature_is_an_authentication_error() {
        let manager = manager();

        let err = manager.create(r#"{"job":"x"}"#, "").await.unwrap_err();
        assert!(matches!(err, OperationError::Authentication(_)));
        assert!(manager.backend().is_empty().await);
    }

    #[tokio::test]
    async fn malformed_payloads_name_the_field() {
        let manager = manager();

        let err = manager.create("[]", "0xsig").await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::Validation { field: Some(ref f), .. } if f == PAYLOAD_FIELD
        ));

        let err = manager
            .create(r#"{"permission_id":0}"#, "0xsig")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Validation { field: Some(ref f), .. } if f == "permission_id"
        ));

        assert!(manager.backend().is_empty().await);
    }

    #[tokio::test]
    async fn backend_rejection_is_a_validation_error() {
        let manager = OperationLifecycleManager::new(RejectingBackend, StaticValidator(true));

        let err = manager.create(r#"{"model":"m"}"#, "0xsig").await.unwrap_err();
        assert!(matches!(
            err,
            OperationError::Validation { field: Some(ref f), .. } if f == "model"
        ));
        assert!(manager.store().is_empty().await);
    }

    #[tokio::test]
    async fn cancels_running_operations_once() {
        let manager = manager();
        let id = manager.create("{}", "0xsig").await.unwrap().id;
        manager.backend().start(&id).await.unwrap();
        manager.get(&id).await.unwrap();

        assert!(manager.cancel(&id).await.unwrap());
        let cancelled = manager.get(&id).await.unwrap();
        assert_eq!(cancelled.status(), OperationStatus::Cancelled);
        assert!(cancelled.finished_at().is_some());
        assert!(cancelled.is_consistent());

        assert!(!manager.cancel(&id).await.unwrap());
        assert_eq!(manager.get(&id).await.unwrap(), cancelled);
    }

    #[tokio::test]
    async fn cancelling_pending_operations_sets_start() {
        let manager = manager();
        let id = manager.create("{}", "0xsig").await.unwrap().id;

        assert!(manager.cancel(&id).await.unwrap());
        let op = manager.get(&id).await.unwrap();
        assert_eq!(op.status(), OperationStatus::Cancelled);
        assert!(op.is_consistent());
    }

    #[tokio::test]
    async fn cancelling_finished_operations_has_no_effect() {
        let manager = manager();
        let id = manager.create("{}", "0xsig").await.unwrap().id;
        manager.backend().succeed(&id, json!(1)).await.unwrap();
        let finished = manager.get(&id).await.unwrap();

        assert!(!manager.cancel(&id).await.unwrap());
        assert_eq!(manager.get(&id).await.unwrap(), finished);
    }

    #[tokio::test]
    async fn cancelling_unknown_operations_returns_false() {
        let manager = manager();

        assert!(!manager.cancel(&"op-404".into()).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_losing_to_completion_reports_completion() {
        let manager = manager();
        let id = manager.create("{}", "0xsig").await.unwrap().id;

        // The job finishes on the backend before the gateway observed it.
        manager.backend().succeed(&id, json!("done")).await.unwrap();

        assert!(!manager.cancel(&id).await.unwrap());
        let op = manager.get(&id).await.unwrap();
        assert_eq!(op.status(), OperationStatus::Succeeded);
        assert_eq!(op.result(), Some(&json!("done")));
    }

    #[tokio::test]
    async fn unknown_backend_status_is_an_error() {
        let manager = OperationLifecycleManager::new(
            FixedStatusBackend {
                inner: InMemoryBackend::new(),
                status: "exploded",
            },
            StaticValidator(true),
        );
        let id = manager.create("{}", "0xsig").await.unwrap().id;

        let err = manager.get(&id).await.unwrap_err();
        assert!(matches!(err, OperationError::UnknownStatus(_)));

        let op = manager.store().entry(&id).await.unwrap();
        assert_eq!(op.lock().await.status(), OperationStatus::Pending);
    }

    #[tokio::test]
    async fn backend_spellings_are_translated() {
        let manager = OperationLifecycleManager::new(
            FixedStatusBackend {
                inner: InMemoryBackend::new(),
                status: "processing",
            },
            StaticValidator(true),
        );
        let id = manager.create("{}", "0xsig").await.unwrap().id;

        assert_eq!(
            manager.get(&id).await.unwrap().status(),
            OperationStatus::Running
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_polls_agree_on_completion() {
        let manager = Arc::new(manager());
        let id = manager.create("{}", "0xsig").await.unwrap().id;
        manager.backend().succeed(&id, json!(1)).await.unwrap();

        let polls = (0..16).map(|_| {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move { manager.get(&id).await.unwrap() })
        });

        let mut seen = Vec::new();
        for poll in polls {
            seen.push(poll.await.unwrap());
        }

        let first = &seen[0];
        assert_eq!(first.status(), OperationStatus::Succeeded);
        assert!(seen.iter().all(|op| op == first));
    }

    #[tokio::test]
    async fn signed_requests_round_trip() {
        let caller = SecretKey::from_slice(&[9; 32]).unwrap();
        let validator = PersonalSignValidator::with_allowed_signers([signer_of(&caller)]);
        let manager = OperationLifecycleManager::new(InMemoryBackend::new(), validator);

        let payload = r#"{"permission_id":3,"job":"x"}"#;
        let handle = manager
            .create(payload, &personal_sign(payload, &caller))
            .await
            .unwrap();
        assert_eq!(
            manager.get(&handle.id).await.unwrap().status(),
            OperationStatus::Pending
        );

        let tampered = r#"{"permission_id":4,"job":"x"}"#;
        let err = manager
            .create(tampered, &personal_sign(payload, &caller))
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::Authorization(_)));
        assert_eq!(manager.store().len().await, 1);
    }
}
