use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the indexer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("lock contention: {0}")]
    Lock(String),

    #[error("reorg handling error: {0}")]
    Reorg(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid split combination: {0}")]
    SplitsRuleViolation(String),

    #[error("stale event pointer: {0}")]
    EventPointerStale(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this belongs to the transient-infrastructure class the
    /// Fetcher's backoff loop should retry rather than escalate to fatal:
    /// connection classes 08/53/57, serialization failure, deadlock.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .map(|code| {
                    let code = code.as_ref();
                    code.starts_with("08")
                        || code.starts_with("53")
                        || code.starts_with("57")
                        || code == "40001" // serialization_failure
                        || code == "40P01" // deadlock_detected
                })
                .unwrap_or(false),
            AppError::Database(sqlx::Error::PoolTimedOut) => true,
            AppError::Database(sqlx::Error::Io(_)) => true,
            AppError::Rpc(_) => true,
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Rpc(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Decode(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Lock(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Reorg(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::SplitsRuleViolation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::EventPointerStale(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_errors_are_transient() {
        assert!(AppError::Rpc("timeout".into()).is_transient());
    }

    #[test]
    fn validation_errors_are_not_transient() {
        assert!(!AppError::Validation("bad weight".into()).is_transient());
    }
}
