//! Error types for gateway operations

use thiserror::Error;

/// Stable error codes surfaced to tool clients.
pub mod codes {
    pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";
    pub const READONLY_VIOLATION: &str = "READONLY_VIOLATION";
    pub const SOURCE_NOT_FOUND: &str = "SOURCE_NOT_FOUND";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const MISSING_PARAMETER: &str = "MISSING_PARAMETER";
}

/// Gateway operation errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// DSN did not parse; message carries the redacted DSN and a sample
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    /// Failed to connect to a database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Driver, SSH or token authentication failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// SSH tunnel establishment failed
    #[error("SSH tunnel error: {0}")]
    TunnelFailed(String),

    /// Requested source id is not configured
    #[error("Unknown source '{id}'. Available sources: {available}")]
    SourceNotFound { id: String, available: String },

    /// Attempted write operation against a readonly source
    #[error("Source '{source_id}' is read-only; only {allowed} statements are permitted")]
    ReadOnlyViolation { source_id: String, allowed: String },

    /// Required tool parameter absent and no default declared
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// Tool argument failed validation or coercion
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Query execution failed in the driver
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// Connection was lost and could not be re-established
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// No live driver for this database type
    #[error("Unsupported database: {0}")]
    UnsupportedDatabase(String),

    /// Configuration document is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// sqlx driver error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// SSH transport error
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Wire error code for structured failure responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => codes::SOURCE_NOT_FOUND,
            Self::ReadOnlyViolation { .. } => codes::READONLY_VIOLATION,
            Self::MissingParameter(_) => codes::MISSING_PARAMETER,
            Self::InvalidArgument(_) | Self::InvalidDsn(_) => codes::INVALID_ARGUMENT,
            _ => codes::EXECUTION_ERROR,
        }
    }

    /// Whether the error is a client mistake rather than a backend failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::ReadOnlyViolation { .. }
                | Self::MissingParameter(_)
                | Self::InvalidArgument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = GatewayError::ReadOnlyViolation {
            source_id: "prod".into(),
            allowed: "select, with".into(),
        };
        assert_eq!(err.code(), codes::READONLY_VIOLATION);
        assert!(err.is_client_error());

        assert_eq!(
            GatewayError::ExecutionError("boom".into()).code(),
            codes::EXECUTION_ERROR
        );
        assert!(!GatewayError::ExecutionError("boom".into()).is_client_error());
    }

    #[test]
    fn test_source_not_found_lists_ids() {
        let err = GatewayError::SourceNotFound {
            id: "nope".into(),
            available: "main, replica".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("replica"));
    }
}
