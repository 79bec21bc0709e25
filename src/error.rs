use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy from the bridge's error handling design.
///
/// `WorkerPoisonPost` and `ConnectionLost` are not represented here — the
/// former is a process-exit path (the post worker never converts its error
/// into an HTTP response, it just doesn't ack and lets the process die), and
/// the latter is local cleanup with no user-visible response to shape.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    RequestInvalid(String),

    #[error("adapter failure: {0}")]
    AdapterFailure(String),

    #[error("timed out waiting for reply")]
    AdapterTimeout,
}

impl AppError {
    fn code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RequestInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AdapterFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AdapterTimeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.code();
        let description = self.to_string();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(%description, "request failed");
        }

        let body = Json(json!({
            "error": {
                "code": status.as_u16(),
                "description": description,
            }
        }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Fatal errors for the two message workers. Unlike `AppError`, these never
/// become an HTTP response — they either terminate the Post Worker's process
/// (`WorkerPoisonPost`'s crash-loop-for-redelivery contract) or get formatted
/// into an RPC error reply by the Get Worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
