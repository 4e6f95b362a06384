//! Provides the RPC interface of the compute gateway.
//!
//! The RPCs are grouped by concern: information about the gateway process itself, the lifecycle
//! of operations submitted to the compute backend, and the deterministic server identities
//! assigned to users.

pub mod types;

use jsonrpsee::{core::RpcResult, proc_macros::rpc};

use crate::types::{RpcOperation, RpcOperationCreated, RpcServerIdentity};

/// RPCs related to information about the gateway itself.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "gateway"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "gateway"))]
pub trait GatewayControlApi {
    /// Get the uptime for the gateway in seconds assuming the clock is strictly monotonically
    /// increasing.
    #[method(name = "uptime")]
    async fn get_uptime(&self) -> RpcResult<u64>;
}

/// RPCs that submit work to the compute backend and follow it to completion.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "gateway"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "gateway"))]
pub trait GatewayOperationsApi {
    /// Submit a signed operation request.
    ///
    /// `operation_request_json` is the exact JSON text that `app_signature` signs with
    /// `personal_sign`.
    #[method(name = "createOperation")]
    async fn create_operation(
        &self,
        operation_request_json: String,
        app_signature: String,
    ) -> RpcResult<RpcOperationCreated>;

    /// Get the current state of an operation.
    #[method(name = "getOperation")]
    async fn get_operation(&self, operation_id: String) -> RpcResult<RpcOperation>;

    /// Request cancellation of an operation.
    ///
    /// Returns `false` when the call had no effect, either because the operation already
    /// finished or because it is unknown.
    #[method(name = "cancelOperation")]
    async fn cancel_operation(&self, operation_id: String) -> RpcResult<bool>;
}

/// RPCs exposing the server identities derived for users.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "gateway"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "gateway"))]
pub trait GatewayIdentityApi {
    /// Derive the server address and keypair assigned to `user_address`.
    #[method(name = "deriveUserServerAddress")]
    async fn derive_user_server_address(&self, user_address: String)
        -> RpcResult<RpcServerIdentity>;
}
