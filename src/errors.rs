use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rusqlite::ffi;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("forbidden")]
    Forbidden,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Failures the caller could not have prevented. These are the ones that
    /// get a best-effort failure audit entry and a generic response body.
    pub fn is_internal(&self) -> bool {
        match self {
            AppError::Database(e) => !is_unique_violation(e),
            AppError::Internal(_) => true,
            _ => false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {e}"))
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            AppError::Database(e) if is_unique_violation(e) => {
                tracing::warn!(error = %e, "unique constraint violated");
                "unique data conflict, please retry".to_string()
            }
            e if e.is_internal() => {
                tracing::error!(error = %e, "request failed");
                "internal server error".to_string()
            }
            e => e.to_string(),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_violation() -> rusqlite::Error {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err()
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let err = AppError::from(unique_violation());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(!err.is_internal());
    }

    #[test]
    fn test_other_database_errors_are_internal() {
        let err = AppError::from(rusqlite::Error::InvalidQuery);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_internal());
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = AppError::Validation("participants must be a positive integer".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "participants must be a positive integer");
    }
}
