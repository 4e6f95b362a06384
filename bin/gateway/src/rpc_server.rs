//! Bootstraps the RPC server for the gateway.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compute_gateway_identity::{IdentityDerivationService, IdentityError, UserServerIdentity};
use compute_gateway_operations::{
    ComputeBackend, Operation, OperationError, OperationHandle, OperationId,
    OperationLifecycleManager, OperationStatus, SignatureValidator,
};
use compute_gateway_rpc::{
    types::{
        ErrorKind, RpcErrorData, RpcOperation, RpcOperationCreated, RpcOperationStatus,
        RpcPersonalServer, RpcServerIdentity,
    },
    GatewayControlApiServer, GatewayIdentityApiServer, GatewayOperationsApiServer,
};
use jsonrpsee::{core::RpcResult, types::ErrorObjectOwned, RpcModule};
use thiserror::Error;
use tokio::task::{spawn_blocking, JoinError};
use tracing::{debug, error, info, warn};

/// Name of the derivation input, as reported in validation errors.
const USER_ADDRESS_FIELD: &str = "user_address";

/// Detail returned for every server-class failure.
const INTERNAL_ERROR_DETAIL: &str = "Internal server error";

/// Error code returned when key derivation fails.
const DERIVATION_ERROR_CODE: &str = "DERIVATION_ERROR";

/// Starts the RPC server and serves until it stops.
pub(crate) async fn start_rpc<T>(rpc_impl: &T, rpc_addr: &str) -> anyhow::Result<()>
where
    T: GatewayControlApiServer
        + GatewayOperationsApiServer
        + GatewayIdentityApiServer
        + Clone
        + Sync
        + Send,
{
    let mut rpc_module = RpcModule::new(rpc_impl.clone());

    let control_api = GatewayControlApiServer::into_rpc(rpc_impl.clone());
    let operations_api = GatewayOperationsApiServer::into_rpc(rpc_impl.clone());
    let identity_api = GatewayIdentityApiServer::into_rpc(rpc_impl.clone());

    rpc_module.merge(control_api).context("merge control api")?;
    rpc_module
        .merge(operations_api)
        .context("merge operations api")?;
    rpc_module
        .merge(identity_api)
        .context("merge identity api")?;

    info!(%rpc_addr, "starting gateway rpc server");
    let rpc_server = jsonrpsee::server::ServerBuilder::new()
        .build(rpc_addr)
        .await
        .context("build gateway rpc server")?;

    let rpc_handle = rpc_server.start(rpc_module);
    debug!("gateway rpc server started");

    rpc_handle.stopped().await;
    info!("rpc server stopped");

    Ok(())
}

/// Failures reaching the RPC boundary, one variant per source.
#[derive(Debug, Error)]
enum GatewayError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("blocking task failed: {0}")]
    Task(#[from] JoinError),
}

impl From<GatewayError> for ErrorObjectOwned {
    fn from(err: GatewayError) -> Self {
        let (kind, field) = match &err {
            GatewayError::Operation(OperationError::Validation { field, .. }) => {
                (ErrorKind::Validation, field.clone())
            }
            GatewayError::Operation(OperationError::Authentication(_)) => {
                (ErrorKind::Authentication, None)
            }
            GatewayError::Operation(OperationError::Authorization(_)) => {
                (ErrorKind::Authorization, None)
            }
            GatewayError::Operation(OperationError::NotFound(_)) => (ErrorKind::NotFound, None),
            GatewayError::Operation(
                OperationError::Backend(_)
                | OperationError::UnknownStatus(_)
                | OperationError::DuplicateId(_),
            ) => (ErrorKind::Server, None),
            GatewayError::Identity(IdentityError::InvalidInput(_)) => {
                (ErrorKind::Validation, Some(USER_ADDRESS_FIELD.to_string()))
            }
            GatewayError::Identity(IdentityError::DerivationFailed(_)) => (ErrorKind::Server, None),
            GatewayError::Task(_) => (ErrorKind::Server, None),
        };

        let data = if kind == ErrorKind::Server {
            error!(%err, "request failed");

            let data = RpcErrorData::new(kind, INTERNAL_ERROR_DETAIL, None);
            match err {
                GatewayError::Identity(IdentityError::DerivationFailed(_)) => {
                    data.with_error_code(DERIVATION_ERROR_CODE)
                }
                _ => data,
            }
        } else {
            debug!(%err, status = kind.status(), "request rejected");
            RpcErrorData::new(kind, err.to_string(), field)
        };

        data.into_error_object(kind)
    }
}

const fn rpc_status(status: OperationStatus) -> RpcOperationStatus {
    match status {
        OperationStatus::Pending => RpcOperationStatus::Pending,
        OperationStatus::Running => RpcOperationStatus::Running,
        OperationStatus::Succeeded => RpcOperationStatus::Succeeded,
        OperationStatus::Failed => RpcOperationStatus::Failed,
        OperationStatus::Cancelled => RpcOperationStatus::Cancelled,
    }
}

fn rpc_operation(operation: &Operation) -> RpcOperation {
    RpcOperation {
        id: operation.id().to_string(),
        status: rpc_status(operation.status()),
        created_at: operation.created_at(),
        started_at: operation.started_at(),
        finished_at: operation.finished_at(),
        result: operation.result().cloned(),
    }
}

fn rpc_operation_created(handle: OperationHandle) -> RpcOperationCreated {
    RpcOperationCreated {
        id: handle.id.to_string(),
        created_at: handle.created_at,
    }
}

/// Only the public half of the identity goes on the wire; the private key is dropped (and
/// zeroized) here.
fn rpc_server_identity(identity: UserServerIdentity) -> RpcServerIdentity {
    RpcServerIdentity {
        user_address: identity.user_address,
        personal_server: RpcPersonalServer {
            address: identity.keys.address,
            public_key: identity.keys.public_key_hex,
        },
    }
}

/// RPC implementation backed by the operation lifecycle manager and the identity service.
pub(crate) struct GatewayRpc<B, V> {
    /// Process start time, for uptime.
    start_time: DateTime<Utc>,

    /// Operation lifecycle.
    operations: Arc<OperationLifecycleManager<B, V>>,

    /// Server identity derivation.
    identity: Arc<IdentityDerivationService>,
}

impl<B, V> Clone for GatewayRpc<B, V> {
    fn clone(&self) -> Self {
        Self {
            start_time: self.start_time,
            operations: self.operations.clone(),
            identity: self.identity.clone(),
        }
    }
}

impl<B, V> GatewayRpc<B, V> {
    /// Creates a new instance of [`GatewayRpc`].
    pub(crate) fn new(
        operations: Arc<OperationLifecycleManager<B, V>>,
        identity: Arc<IdentityDerivationService>,
    ) -> Self {
        Self {
            start_time: Utc::now(),
            operations,
            identity,
        }
    }
}

#[async_trait]
impl<B, V> GatewayControlApiServer for GatewayRpc<B, V>
where
    B: ComputeBackend + 'static,
    V: SignatureValidator + 'static,
{
    async fn get_uptime(&self) -> RpcResult<u64> {
        let current_time = Utc::now().timestamp();
        let start_time = self.start_time.timestamp();

        if current_time < start_time {
            warn!(%current_time, %start_time, "system time may be inaccurate");
        }

        Ok(current_time.saturating_sub(start_time).max(0).unsigned_abs())
    }
}

#[async_trait]
impl<B, V> GatewayOperationsApiServer for GatewayRpc<B, V>
where
    B: ComputeBackend + 'static,
    V: SignatureValidator + 'static,
{
    async fn create_operation(
        &self,
        operation_request_json: String,
        app_signature: String,
    ) -> RpcResult<RpcOperationCreated> {
        let handle = self
            .operations
            .create(&operation_request_json, &app_signature)
            .await
            .map_err(GatewayError::from)?;

        Ok(rpc_operation_created(handle))
    }

    async fn get_operation(&self, operation_id: String) -> RpcResult<RpcOperation> {
        let operation = self
            .operations
            .get(&OperationId::from(operation_id))
            .await
            .map_err(GatewayError::from)?;

        Ok(rpc_operation(&operation))
    }

    async fn cancel_operation(&self, operation_id: String) -> RpcResult<bool> {
        let cancelled = self
            .operations
            .cancel(&OperationId::from(operation_id))
            .await
            .map_err(GatewayError::from)?;

        Ok(cancelled)
    }
}

#[async_trait]
impl<B, V> GatewayIdentityApiServer for GatewayRpc<B, V>
where
    B: ComputeBackend + 'static,
    V: SignatureValidator + 'static,
{
    async fn derive_user_server_address(
        &self,
        user_address: String,
    ) -> RpcResult<RpcServerIdentity> {
        let identity = self.identity.clone();

        // Seed stretching is CPU-bound.
        let derived = spawn_blocking(move || identity.derive_user_server_address(&user_address))
            .await
            .map_err(GatewayError::from)?
            .map_err(GatewayError::from)?;

        Ok(rpc_server_identity(derived))
    }
}

#[cfg(test)]
mod tests {
    use compute_gateway_identity::RootSecret;
    use compute_gateway_operations::{InMemoryBackend, PersonalSignValidator};
    use secp256k1::{Message, SecretKey, SECP256K1};
    use serde_json::json;

    use super::*;

    type TestRpc = GatewayRpc<InMemoryBackend, PersonalSignValidator>;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn rpc_with_secret(secret: RootSecret) -> (TestRpc, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let operations = Arc::new(OperationLifecycleManager::new(
            backend.clone(),
            PersonalSignValidator::accept_any(),
        ));
        let identity = Arc::new(IdentityDerivationService::with_bip44(Arc::new(secret)));

        (GatewayRpc::new(operations, identity), backend)
    }

    fn rpc() -> (TestRpc, InMemoryBackend) {
        rpc_with_secret(RootSecret::new(TEST_MNEMONIC, "english"))
    }

    fn sign(payload: &str) -> String {
        let sk = SecretKey::from_slice(&[5; 32]).unwrap();
        let digest = compute_gateway_operations::signature::personal_message_hash(
            payload.as_bytes(),
        );
        let (recovery_id, compact) = SECP256K1
            .sign_ecdsa_recoverable(&Message::from_digest(digest), &sk)
            .serialize_compact();

        let mut raw = compact.to_vec();
        raw.push(27 + recovery_id.to_i32() as u8);
        format!("0x{}", hex::encode(raw))
    }

    fn error_data(err: &ErrorObjectOwned) -> RpcErrorData {
        serde_json::from_str(err.data().expect("error data is attached").get()).unwrap()
    }

    #[tokio::test]
    async fn operation_lifecycle_over_rpc() {
        let (rpc, backend) = rpc();
        let payload = r#"{"job":"x"}"#.to_string();

        let created = rpc
            .create_operation(payload.clone(), sign(&payload))
            .await
            .unwrap();
        assert_eq!(created.id, "op-1");

        let pending = rpc.get_operation(created.id.clone()).await.unwrap();
        assert_eq!(pending.status, RpcOperationStatus::Pending);
        assert_eq!(pending.created_at, created.created_at);

        backend
            .succeed(&created.id.as_str().into(), json!({ "score": 0.9 }))
            .await
            .unwrap();
        let done = rpc.get_operation(created.id.clone()).await.unwrap();
        assert_eq!(done.status, RpcOperationStatus::Succeeded);
        assert_eq!(done.result, Some(json!({ "score": 0.9 })));
        assert!(done.finished_at.is_some());

        assert!(!rpc.cancel_operation(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn errors_carry_status_and_code() {
        let (rpc, _) = rpc();

        let err = rpc.get_operation("unknown-id".to_string()).await.unwrap_err();
        let data = error_data(&err);
        assert_eq!(data.status, 404);
        assert_eq!(data.error_code, "NOT_FOUND_ERROR");

        let err = rpc
            .create_operation(r#"{"job":"x"}"#.to_string(), "0x00".to_string())
            .await
            .unwrap_err();
        let data = error_data(&err);
        assert_eq!(data.status, 403);
        assert_eq!(data.error_code, "AUTHORIZATION_ERROR");

        let err = rpc
            .create_operation(r#"{"job":"x"}"#.to_string(), String::new())
            .await
            .unwrap_err();
        assert_eq!(error_data(&err).status, 401);

        let payload = r#"{"permission_id":-1}"#.to_string();
        let err = rpc
            .create_operation(payload.clone(), sign(&payload))
            .await
            .unwrap_err();
        let data = error_data(&err);
        assert_eq!(data.status, 400);
        assert_eq!(data.field.as_deref(), Some("permission_id"));
        assert_eq!(data.error_code, "VALIDATION_ERROR_PERMISSION_ID");
        assert_eq!(data.detail, "Valid permission ID is required");
    }

    #[tokio::test]
    async fn cancelling_unknown_operations_is_not_an_error() {
        let (rpc, _) = rpc();

        assert!(!rpc.cancel_operation("op-404".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn derives_server_identities() {
        let (rpc, _) = rpc();

        let lower = rpc
            .derive_user_server_address("0xabcdef0123456789abcdef0123456789abcdef01".to_string())
            .await
            .unwrap();
        let upper = rpc
            .derive_user_server_address("0xABCDEF0123456789ABCDEF0123456789ABCDEF01".to_string())
            .await
            .unwrap();

        assert_eq!(lower.personal_server, upper.personal_server);
        assert_eq!(
            lower.user_address,
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert!(lower.personal_server.address.starts_with("0x"));
        assert_eq!(lower.personal_server.public_key.len(), 130);
    }

    #[tokio::test]
    async fn server_identity_response_omits_private_key() {
        let (rpc, _) = rpc();
        let user_address = "0xabcdef0123456789abcdef0123456789abcdef01";

        let derived = IdentityDerivationService::with_bip44(Arc::new(RootSecret::new(
            TEST_MNEMONIC,
            "english",
        )))
        .derive_user_server_address(user_address)
        .unwrap();
        let private_key = derived.keys.private_key_hex.as_str().to_owned();

        let response = rpc
            .derive_user_server_address(user_address.to_string())
            .await
            .unwrap();
        let wire = serde_json::to_string(&response).unwrap();

        assert!(!wire.contains("private_key"));
        assert!(!wire.contains(&private_key));
        assert!(wire.contains(&derived.keys.address));
    }

    #[tokio::test]
    async fn invalid_user_addresses_are_validation_errors() {
        let (rpc, _) = rpc();

        for address in ["", "not-hex"] {
            let err = rpc
                .derive_user_server_address(address.to_string())
                .await
                .unwrap_err();
            let data = error_data(&err);
            assert_eq!(data.status, 400);
            assert_eq!(data.error_code, "VALIDATION_ERROR_USER_ADDRESS");
        }
    }

    #[tokio::test]
    async fn derivation_failures_hide_the_cause() {
        let (rpc, _) = rpc_with_secret(RootSecret::new("correct horse battery staple", "english"));

        let err = rpc
            .derive_user_server_address("0xabc".to_string())
            .await
            .unwrap_err();
        let data = error_data(&err);

        assert_eq!(data.status, 500);
        assert_eq!(data.error_code, "DERIVATION_ERROR");
        assert_eq!(data.detail, "Internal server error");
        assert!(!err.message().contains("horse"));
    }
}
