use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::call::CallError;
use crate::core::handoff::TransferRejection;
use crate::livekit::LaunchError;

/// Errors returned by the HTTP handlers. Rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, "{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<TransferRejection> for AppError {
    fn from(rejection: TransferRejection) -> Self {
        match rejection {
            TransferRejection::NotConfigured => AppError::ServiceUnavailable(rejection.to_string()),
            other => AppError::Conflict(other.to_string()),
        }
    }
}

impl From<CallError> for AppError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Rejected(rejection) => rejection.into(),
            CallError::Closed(_) => AppError::Conflict(err.to_string()),
        }
    }
}

impl From<LaunchError> for AppError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Pending(_) => AppError::Conflict(err.to_string()),
            LaunchError::Room(_) | LaunchError::Realtime(_) => AppError::BadGateway(err.to_string()),
            LaunchError::Token(_) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handoff::HandoffState;

    #[test]
    fn test_transfer_rejection_status() {
        let conflict: AppError = TransferRejection::AlreadyInProgress(HandoffState::Dialing).into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let exhausted: AppError = TransferRejection::AttemptsExhausted(3).into();
        assert_eq!(exhausted.status_code(), StatusCode::CONFLICT);

        let unconfigured: AppError = TransferRejection::NotConfigured.into();
        assert_eq!(
            unconfigured.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_call_error_status() {
        let closed: AppError = CallError::Closed("room-1".into()).into();
        assert_eq!(closed.status_code(), StatusCode::CONFLICT);

        let rejected: AppError = CallError::Rejected(TransferRejection::Terminated).into();
        assert_eq!(rejected.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_launch_error_status() {
        let pending: AppError = LaunchError::Pending("room-1".into()).into();
        assert_eq!(pending.status_code(), StatusCode::CONFLICT);

        let room: AppError = LaunchError::Room("refused".into()).into();
        assert_eq!(room.status_code(), StatusCode::BAD_GATEWAY);
    }
}
