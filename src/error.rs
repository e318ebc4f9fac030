//! Errors surfaced to HTTP clients.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::chat::MessageId;
use crate::store::StoreError;

/// Errors returned by the chat handlers.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The message is not rendered or no longer stored.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// The store rejected or failed the operation.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl ChatError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(err) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_from_store() {
        let err = ChatError::from(StoreError::NotFound(MessageId::from("a")));
        assert!(matches!(err, ChatError::NotFound(_)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_failures_map_to_gateway_codes() {
        assert_eq!(
            ChatError::from(StoreError::Unavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ChatError::from(StoreError::Closed).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
