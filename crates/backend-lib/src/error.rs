// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Room is still being created")]
    RoomNotReady,

    #[error("Member is not part of the room")]
    UnknownMember,

    #[error("Restaurant index {index} out of range (room has {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Restaurant lookup unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRoomId(_)
            | AppError::UnknownMember
            | AppError::IndexOutOfRange { .. }
            | AppError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            AppError::RoomNotReady => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidRoomId(_) => "ROOM_001",
            AppError::RoomNotFound(_) => "ROOM_002",
            AppError::RoomNotReady => "ROOM_003",
            AppError::UnknownMember => "MEMBER_001",
            AppError::IndexOutOfRange { .. } => "VOTE_001",
            AppError::InvalidOperation(_) => "OP_001",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_001",
            AppError::Internal(_) => "INT_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::InvalidRoomId(_) => "Invalid room id".to_string(),
            AppError::RoomNotFound(_) => "Room not found".to_string(),
            AppError::RoomNotReady => "Room is still being created".to_string(),
            AppError::UnknownMember => "Not a member of this room".to_string(),
            AppError::IndexOutOfRange { .. } => "Restaurant index out of range".to_string(),
            AppError::InvalidOperation(_) => "Invalid operation".to_string(),
            AppError::UpstreamUnavailable(_) => {
                "Restaurant lookup is temporarily unavailable".to_string()
            },
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
        }
    }

    /// Message sent back over the socket: detailed in development,
    /// sanitized in production.
    pub fn client_message(&self) -> String {
        if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.client_message();

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("Failed to send message".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_app_error_display() {
        let err = AppError::IndexOutOfRange { index: 7, count: 3 };
        assert_eq!(
            err.to_string(),
            "Restaurant index 7 out of range (room has 3)"
        );

        let err = AppError::RoomNotFound("AB12".to_string());
        assert_eq!(err.to_string(), "Room not found: AB12");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::RoomNotFound("AB12".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::UnknownMember.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::UpstreamUnavailable("query limit".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Internal("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_app_error_error_codes() {
        assert_eq!(AppError::InvalidRoomId("!".to_string()).error_code(), "ROOM_001");
        assert_eq!(AppError::UnknownMember.error_code(), "MEMBER_001");
        assert_eq!(
            AppError::IndexOutOfRange { index: 0, count: 0 }.error_code(),
            "VOTE_001"
        );
        assert_eq!(AppError::Internal("test".to_string()).error_code(), "INT_001");
    }

    #[test]
    fn test_app_error_into_response() {
        let error = AppError::RoomNotFound("AB12".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_from_send_error() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
        drop(rx);
        let send_err = tx.send(1).unwrap_err();
        let app_err: AppError = send_err.into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }
}
