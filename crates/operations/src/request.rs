//! Validation of operation request payloads.

use serde_json::Value;

use crate::errors::{OperationError, OperationResult};

/// Name of the request field carrying the JSON payload.
pub const PAYLOAD_FIELD: &str = "operation_request_json";

/// Payload key naming the permission the operation runs under.
pub const PERMISSION_ID_FIELD: &str = "permission_id";

/// Parses and validates an operation request payload.
///
/// The payload must be a JSON object. A `permission_id` member, when present, must be a positive
/// integer.
pub fn parse_request(request_json: &str) -> OperationResult<Value> {
    let payload: Value = serde_json::from_str(request_json).map_err(|e| {
        OperationError::validation(
            format!("operation request is not valid JSON: {e}"),
            Some(PAYLOAD_FIELD),
        )
    })?;

    let Some(object) = payload.as_object() else {
        return Err(OperationError::validation(
            "operation request must be a JSON object",
            Some(PAYLOAD_FIELD),
        ));
    };

    if let Some(permission_id) = object.get(PERMISSION_ID_FIELD) {
        if !permission_id.as_u64().is_some_and(|id| id > 0) {
            return Err(OperationError::validation(
                "Valid permission ID is required",
                Some(PERMISSION_ID_FIELD),
            ));
        }
    }

    Ok(payload)
}
