//! Error handler for request processing.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

const INTERNAL_SERVER_ERROR: &str = "Internal server error";

/// Enum representing request-time errors.
///
/// Each variant maps to a status code and a short plain text body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerError {
    #[error("Missing resource parameter")]
    MissingResource,

    #[error("Invalid resource format")]
    InvalidResource,

    #[error("Resource not found")]
    NotFound,

    #[error("internal server error, {details}")]
    Internal { details: String },
}

impl ServerError {
    /// HTTP status sent back for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::MissingResource | ServerError::InvalidResource => {
                StatusCode::BAD_REQUEST
            },
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            ServerError::Internal { details } => {
                tracing::error!(%details, "server returned 500 status");
                (status, INTERNAL_SERVER_ERROR).into_response()
            },
            err => (status, err.to_string()).into_response(),
        }
    }
}
