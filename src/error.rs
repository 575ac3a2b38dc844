use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

// Error taxonomy for the poll service. Every variant is recoverable at the
// request boundary and maps to a single HTTP status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("poll not found: {0}")]
    PollNotFound(String),

    #[error("option not found: {0}")]
    OptionNotFound(String),

    #[error("already voted for option {0}")]
    DuplicateVote(String),

    #[error("poll {0} is no longer open")]
    PollClosed(String),

    #[error("poll {0} has expired")]
    PollExpired(String),

    #[error("{0}")]
    Validation(String),

    #[error("missing or invalid identity: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::PollNotFound(_) => "poll_not_found",
            AppError::OptionNotFound(_) => "option_not_found",
            AppError::DuplicateVote(_) => "duplicate_vote",
            AppError::PollClosed(_) => "poll_closed",
            AppError::PollExpired(_) => "poll_expired",
            AppError::Validation(_) => "validation",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::PollNotFound(_) | AppError::OptionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateVote(_) | AppError::PollClosed(_) => StatusCode::CONFLICT,
            AppError::PollExpired(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // 5xx details stay in the logs, not in the response body.
        let message = if self.status_code().is_server_error() {
            log::error!("request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message,
        })
    }
}
