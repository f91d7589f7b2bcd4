use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("malformed billing event: {0}")]
    MalformedEvent(String),
    #[error("no subscription record for account")]
    AccountNotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(?self);
        let (status, body) = match &self {
            AppError::VerificationFailed | AppError::MalformedEvent(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::AccountNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            // Storage details stay in the log; the sender only sees a generic
            // retryable failure.
            AppError::Db(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
