use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    /// The caller sent a request that can never succeed as is.
    #[error("invalid query: {0}")]
    Invalid(String),

    /// The catalog store could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// The store answered, but not in the shape the catalog contract promises.
    #[error("catalog error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Invalid(_) => "invalid",
            QueryError::Unavailable(_) => "unavailable",
            QueryError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            QueryError::Invalid(_) => StatusCode::BAD_REQUEST,
            QueryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => QueryError::Unavailable(err.to_string()),
            other => QueryError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!("frame query failed: {self}");
        } else {
            tracing::debug!("rejected frame query: {self}");
        }

        let message = match &self {
            QueryError::Invalid(msg) | QueryError::Unavailable(msg) | QueryError::Internal(msg) => {
                msg.clone()
            }
        };
        (
            status_code,
            Json(json!({ "error": self.code(), "message": message })),
        )
            .into_response()
    }
}
