//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use chatline_types::error::{ChatError, StoreError};
use chatline_types::ids::IdError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors from the conversation subsystem.
    Chat(ChatError),
    /// Validation error.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl From<IdError> for AppError {
    fn from(e: IdError) -> Self {
        AppError::Validation(format!("invalid identifier: {e}"))
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Chat(e) if e.is_not_found() => {
                (StatusCode::NOT_FOUND, "CONVERSATION_NOT_FOUND", "Conversation not found".to_string())
            }
            AppError::Chat(e @ ChatError::InvalidMessage(_)) => {
                (StatusCode::BAD_REQUEST, e.code(), e.to_string())
            }
            AppError::Chat(
                e @ (ChatError::DurableReadFailed(StoreError::Unavailable(_))
                | ChatError::DurableWriteFailed(StoreError::Unavailable(_))),
            ) => (StatusCode::SERVICE_UNAVAILABLE, e.code(), e.to_string()),
            AppError::Chat(e @ ChatError::CompletionFailed(_)) => {
                (StatusCode::BAD_GATEWAY, e.code(), e.to_string())
            }
            AppError::Chat(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::warn!(code, %message, "request failed");
        }
        ApiResponse::error(code, &message, uuid::Uuid::now_v7().to_string())
            .into_response_with(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            status_of(ChatError::DurableReadFailed(StoreError::NotFound).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ChatError::DurableWriteFailed(StoreError::NotFound).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn durable_outage_maps_to_503() {
        let err = ChatError::DurableWriteFailed(StoreError::Unavailable("disk".into()));
        assert_eq!(status_of(err.into()), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_input_maps_to_400() {
        assert_eq!(
            status_of(ChatError::InvalidMessage("empty".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(IdError::Empty.into()), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn parts_carry_chat_error_code() {
        let err = AppError::from(ChatError::DurableReadFailed(StoreError::Unavailable("x".into())));
        let (_, code, _) = err.parts();
        assert_eq!(code, "DURABLE_READ_FAILED");
    }
}
