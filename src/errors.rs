//! Error types for the RenderLite core

use thiserror::Error;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for the RenderLite core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("cancelled by user")]
    Cancelled,

    #[error("deployment error: {0}")]
    Deploy(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("bus error: {0}")]
    Bus(#[from] fred::error::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("shutdown error: {0}")]
    Shutdown(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable code, used by the ingress collaborators to
    /// map core failures onto API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Timeout { .. } => "TIMEOUT",
            Self::RuntimeUnavailable(_) => "RUNTIME_UNAVAILABLE",
            Self::Integrity(_) => "INTEGRITY_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Deploy(_) => "DEPLOY_ERROR",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Bus(_) => "BUS_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Shutdown(_) => "SHUTDOWN_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<bollard::errors::Error> for CoreError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, message,
            } => CoreError::Integrity(message),
            other => CoreError::RuntimeUnavailable(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(CoreError::Cancelled.code(), "CANCELLED");
        assert_eq!(
            CoreError::Timeout { operation: "clone".into(), seconds: 60 }.code(),
            "TIMEOUT"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = CoreError::Timeout { operation: "build".into(), seconds: 300 };
        assert_eq!(err.to_string(), "build timed out after 300s");
    }
}
