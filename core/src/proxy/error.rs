//! Error types surfaced by the proxy pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of every non-2xx response sent to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEnvelope {
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Failure to obtain an arkose token
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("arkose token is empty")]
    Empty,

    #[error("arkose exchange failed: {0}")]
    Transport(String),

    #[error("arkose solver failed: {0}")]
    Solver(String),
}

impl TokenError {
    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Empty => "empty",
            TokenError::Transport(_) => "transport",
            TokenError::Solver(_) => "solver",
        }
    }
}

#[derive(Error, Debug)]
pub enum ProxyError {
    /// Inbound body could not be read or parsed
    #[error("{0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    /// Upstream answered with a non-OK status
    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Reading or decoding a buffered upstream body failed
    #[error("{0}")]
    Relay(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { status, .. } => *status,
            ProxyError::Token(_) | ProxyError::Transport(_) | ProxyError::Relay(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorEnvelope::new(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn envelope_of(response: Response) -> (StatusCode, ErrorEnvelope) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn upstream_status_is_mirrored() {
        let error = ProxyError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: r#"{"detail":"rate limited"}"#.to_string(),
        };
        let (status, envelope) = envelope_of(error.into_response()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(envelope.message, r#"{"detail":"rate limited"}"#);
    }

    #[tokio::test]
    async fn token_failures_collapse_to_500() {
        for error in [
            TokenError::Empty,
            TokenError::Transport("connection refused".to_string()),
            TokenError::Solver("exit status 1".to_string()),
        ] {
            let (status, envelope) = envelope_of(ProxyError::from(error).into_response()).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(!envelope.message.is_empty());
        }
    }

    #[tokio::test]
    async fn invalid_payload_is_400_with_diagnostic() {
        let error = ProxyError::InvalidPayload("expected value at line 1 column 1".to_string());
        let (status, envelope) = envelope_of(error.into_response()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(envelope.message, "expected value at line 1 column 1");
    }

    #[test]
    fn token_error_kinds() {
        assert_eq!(TokenError::Empty.kind(), "empty");
        assert_eq!(TokenError::Transport(String::new()).kind(), "transport");
        assert_eq!(TokenError::Solver(String::new()).kind(), "solver");
        assert_eq!(TokenError::Empty.to_string(), "arkose token is empty");
    }
}
