//! Error types for the read API.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frontline_core::error::AlertQueryError;
use frontline_db::DbError;
use frontline_world::WorldError;

/// Errors that can occur in the read API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is valid but its precondition does not hold yet.
    #[error(transparent)]
    Precondition(#[from] AlertQueryError),

    /// Live state could not be read.
    #[error("state error: {0}")]
    World(#[from] WorldError),

    /// Durable storage could not be read.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// No durable storage is attached.
    #[error("storage unavailable")]
    StorageUnavailable,
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Precondition(_) => StatusCode::BAD_REQUEST,
            Self::World(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
