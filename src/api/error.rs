//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::audio::RecordingError;
use crate::recording::CommandError;

/// API error type that converts to JSON responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        match &err {
            CommandError::NotInMeeting => Self::conflict(err.to_string()),
            CommandError::Recording(RecordingError::Device(_)) => Self::unavailable(err.to_string()),
            CommandError::Recording(RecordingError::AlreadyRunning(_)) => {
                Self::conflict(err.to_string())
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceError;

    #[test]
    fn test_command_errors_map_to_status() {
        assert_eq!(
            ApiError::from(CommandError::NotInMeeting).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(CommandError::Recording(RecordingError::Device(
                DeviceError::NoDefaultInput
            )))
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(CommandError::Recording(RecordingError::StopTimeout)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
