//! Server error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use proctor_core::{SessionError, SignalError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the proctor server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Server loop terminated with an I/O error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// Session lifecycle rejected the request
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Sample failed boundary validation
    #[error("invalid sample: {0}")]
    InvalidSample(#[from] SignalError),

    /// Attached frame could not be decoded
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Invalid message format
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Persistence collaborator failed
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl ServerError {
    /// Machine-readable code sent to HTTP and WebSocket clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::Session(e) => e.code(),
            Self::InvalidSample(_) => "INVALID_SAMPLE",
            Self::InvalidFrame(_) => "INVALID_FRAME",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
            Self::Bind { .. } | Self::Serve(_) | Self::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Session(SessionError::DuplicateSession(_)) => StatusCode::CONFLICT,
            Self::Session(SessionError::UnknownSession(_)) => StatusCode::NOT_FOUND,
            Self::Session(SessionError::AlreadyEnded(_)) => StatusCode::GONE,
            Self::InvalidSample(_) | Self::InvalidFrame(_) | Self::InvalidMessage(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Session(SessionError::LaneClosed(_))
            | Self::Bind { .. }
            | Self::Serve(_)
            | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for failed requests
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
