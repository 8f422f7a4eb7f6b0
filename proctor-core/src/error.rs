//! Error types for proctor-core

use thiserror::Error;

use crate::signal::SignalKind;

/// Top-level error type for proctor-core
#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Lifecycle errors surfaced synchronously to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session already active: {0}")]
    DuplicateSession(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session already ended: {0}")]
    AlreadyEnded(String),

    #[error("Session lane stopped unexpectedly: {0}")]
    LaneClosed(String),
}

impl SessionError {
    /// Stable machine-readable code used by the transport layer
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateSession(_) => "DUPLICATE_SESSION",
            Self::UnknownSession(_) => "UNKNOWN_SESSION",
            Self::AlreadyEnded(_) => "ALREADY_ENDED",
            Self::LaneClosed(_) => "LANE_CLOSED",
        }
    }
}

/// Errors raised while validating an inbound sample at the boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Unknown signal kind: {0}")]
    UnknownKind(String),

    #[error("Invalid value for {kind:?}: {reason}")]
    InvalidValue { kind: SignalKind, reason: String },

    #[error("Missing session id")]
    MissingSession,
}

/// Errors from the persistence collaborators
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Storage worker failed: {0}")]
    Worker(String),
}

/// Errors raised by engine configuration validation and loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_duplicate_displays_correctly() {
        let error = SessionError::DuplicateSession("s1".to_string());
        assert!(error.to_string().contains("already active"));
        assert!(error.to_string().contains("s1"));
    }

    #[test]
    fn session_error_unknown_displays_correctly() {
        let error = SessionError::UnknownSession("abc123".to_string());
        assert!(error.to_string().contains("Unknown session"));
        assert!(error.to_string().contains("abc123"));
    }

    #[test]
    fn session_error_codes_are_stable() {
        assert_eq!(
            SessionError::DuplicateSession("x".into()).code(),
            "DUPLICATE_SESSION"
        );
        assert_eq!(
            SessionError::UnknownSession("x".into()).code(),
            "UNKNOWN_SESSION"
        );
        assert_eq!(SessionError::AlreadyEnded("x".into()).code(), "ALREADY_ENDED");
    }

    #[test]
    fn signal_error_invalid_value_mentions_kind() {
        let error = SignalError::InvalidValue {
            kind: SignalKind::FaceCount,
            reason: "expected a non-negative integer".to_string(),
        };
        assert!(error.to_string().contains("FaceCount"));
        assert!(error.to_string().contains("non-negative"));
    }

    #[test]
    fn store_error_migration_displays_correctly() {
        let error = StoreError::Migration("v001_initial: syntax error".into());
        assert!(error.to_string().contains("v001_initial"));
    }

    #[test]
    fn proctor_error_converts_from_session_error() {
        let session_error = SessionError::UnknownSession("test".to_string());
        let error: ProctorError = session_error.into();
        assert!(matches!(error, ProctorError::Session(_)));
        assert!(error.to_string().contains("Session error"));
    }

    #[test]
    fn proctor_error_converts_from_store_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: ProctorError = StoreError::from(io_error).into();
        assert!(matches!(error, ProctorError::Store(StoreError::Io(_))));
    }
}
