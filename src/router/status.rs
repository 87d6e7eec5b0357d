//! Plain text liveness and fallback pages.

use axum::http::StatusCode;

/// `GET /_healthz`.
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "200 OK")
}

/// Every route that is not explicitly served.
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 Not Found")
}
