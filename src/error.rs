use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors produced while resolving or provisioning a tenant database.
///
/// The type is `Clone` because a single provisioning outcome is handed to
/// every caller waiting on it; driver errors are kept behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TenantDbError {
    #[error("invalid organization identifier: {reason}")]
    InvalidIdentifier { reason: String },

    #[error("failed to provision database {database}: {source}")]
    Provisioning {
        database: String,
        #[source]
        source: Arc<sqlx::Error>,
    },

    #[error("failed to create bootstrap table {table}: {source}")]
    Schema {
        table: String,
        #[source]
        source: Arc<sqlx::Error>,
    },

    #[error("provisioning of {database} timed out after {after:?}")]
    Timeout { database: String, after: Duration },
}

impl TenantDbError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier { reason: reason.into() }
    }

    pub fn provisioning(database: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Provisioning {
            database: database.into(),
            source: Arc::new(source),
        }
    }

    pub fn schema(table: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Schema {
            table: table.into(),
            source: Arc::new(source),
        }
    }

    /// Server-side failures are transient; a later call starts a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidIdentifier { .. })
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "invalid_identifier",
            Self::Provisioning { .. } => "provisioning",
            Self::Schema { .. } => "schema",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl IntoResponse for TenantDbError {
    fn into_response(self) -> Response {
        match &self {
            Self::InvalidIdentifier { reason } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid organization identifier", "detail": reason })),
            )
                .into_response(),
            _ => {
                // Details stay in the logs; they may name internal hosts.
                tracing::warn!("Tenant database unavailable: {}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "Tenant database unavailable", "retryable": true })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_identifier_is_permanent() {
        assert!(!TenantDbError::invalid("empty").is_retryable());
        assert!(TenantDbError::provisioning("tenant_a", sqlx::Error::PoolTimedOut).is_retryable());
        assert!(TenantDbError::schema("user", sqlx::Error::PoolClosed).is_retryable());
        assert!(TenantDbError::Timeout {
            database: "tenant_a".into(),
            after: Duration::from_secs(1),
        }
        .is_retryable());
    }

    #[test]
    fn status_codes_split_client_and_server_faults() {
        let bad = TenantDbError::invalid("empty").into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let down = TenantDbError::provisioning("tenant_a", sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn clones_share_the_driver_error() {
        let err = TenantDbError::schema("mcp_connection", sqlx::Error::PoolClosed);
        let copy = err.clone();
        match (err, copy) {
            (TenantDbError::Schema { source: a, .. }, TenantDbError::Schema { source: b, .. }) => {
                assert!(Arc::ptr_eq(&a, &b));
            }
            _ => unreachable!(),
        }
    }
}
