use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use quickdrop_auth::AuthzError;
use quickdrop_core::DomainError;
use quickdrop_infra::command_dispatcher::DispatchError;
use quickdrop_infra::fulfillment::FulfillmentError;
use quickdrop_infra::storage::StorageError;

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            error!(error = %msg, "stored event failed to decode");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish { message, .. } => {
            json_error(StatusCode::BAD_GATEWAY, "publish_error", message)
        }
        DispatchError::TenantIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg)
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    dispatch_error_to_response(DispatchError::from(err))
}

pub fn storage_error_to_response(err: StorageError) -> Response {
    match err {
        StorageError::Io(e) => {
            error!(error = %e, "object storage failure");
            json_error(StatusCode::BAD_GATEWAY, "storage_error", e.to_string())
        }
        other => json_error(StatusCode::BAD_REQUEST, "invalid_upload", other.to_string()),
    }
}

pub fn fulfillment_error_to_response(err: FulfillmentError) -> Response {
    match err {
        FulfillmentError::Dispatch(e) => dispatch_error_to_response(e),
        FulfillmentError::Storage(e) => storage_error_to_response(e),
        e @ FulfillmentError::CompensationFailed { .. } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "compensation_failed",
            e.to_string(),
        ),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    match err {
        AuthzError::TenantMismatch => {
            json_error(StatusCode::FORBIDDEN, "tenant_mismatch", err.to_string())
        }
        AuthzError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string()),
    }
}

pub fn not_found(what: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// Business rule checked at the API boundary.
pub fn rejected(message: impl Into<String>) -> Response {
    json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
}

pub fn forbidden(message: impl Into<String>) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_documented_statuses() {
        let cases = [
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                DispatchError::InvariantViolation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DispatchError::Unauthorized, StatusCode::FORBIDDEN),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::TenantIsolation("x".into()), StatusCode::FORBIDDEN),
            (
                DispatchError::Publish {
                    message: "x".into(),
                    committed: vec![],
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(dispatch_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn storage_errors_split_client_and_backend_faults() {
        assert_eq!(
            storage_error_to_response(StorageError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        let io = std::io::Error::other("disk full");
        assert_eq!(
            storage_error_to_response(StorageError::Io(io)).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn failed_compensation_is_a_server_error() {
        let err = FulfillmentError::CompensationFailed {
            operation: "approve cash",
            compensation: DispatchError::Concurrency("stale".into()),
        };
        assert_eq!(
            fulfillment_error_to_response(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
