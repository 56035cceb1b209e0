use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tourforge_core::error::TourError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Tour(#[from] TourError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal Server Error: {0}")]
    Any(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            AppError::Tour(TourError::ConcurrentRun) => (StatusCode::CONFLICT, TourError::ConcurrentRun.to_string()),
            AppError::Tour(
                e @ (TourError::Validation(_) | TourError::Overflow(_) | TourError::Deserialization(_)),
            ) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Tour(e) => {
                tracing::error!("Core Error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database Error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Validation(s) => (StatusCode::BAD_REQUEST, s),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            AppError::Conflict(s) => (StatusCode::CONFLICT, s),
            AppError::Any(e) => {
                tracing::error!("Internal Error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": msg }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Tour(TourError::ConcurrentRun), StatusCode::CONFLICT),
            (AppError::Tour(TourError::Overflow(21)), StatusCode::BAD_REQUEST),
            (AppError::Tour(TourError::Channel("gone".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("instance".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("busy".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
