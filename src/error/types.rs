//! Error types for the RFID authentication daemon.

use thiserror::Error;

/// Main error type for the daemon.
#[derive(Error, Debug)]
pub enum AuthdError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Socket-related errors.
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Client input that failed validation. No state is touched.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// Backing store unreachable or failing.
    #[error("Storage error: {kind}")]
    Storage { kind: StorageErrorKind },

    /// Alias rotation could not complete.
    #[error("Alias rotation error: {kind}")]
    Alias { kind: AliasErrorKind },

    /// Command dispatch errors.
    #[error("Command error: {kind}")]
    Command { kind: CommandErrorKind },

    /// Protocol errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// A request budget for this peer is spent.
    #[error("Rate limit exceeded for {scope}")]
    RateLimited { scope: String },

    /// Unexpected internal failure (e.g. the system RNG).
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Validation error kinds.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("Malformed identifier: {message}")]
    MalformedIdentifier { message: String },

    #[error("Malformed input for '{field}': {message}")]
    MalformedInput { field: String, message: String },

    #[error("Missing required parameter: {param}")]
    MissingParameter { param: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Storage error kinds.
#[derive(Error, Debug)]
pub enum StorageErrorKind {
    #[error("Connection pool unavailable: {message}")]
    PoolUnavailable { message: String },

    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    #[error("Schema initialization failed: {message}")]
    Schema { message: String },

    #[error("Operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Alias rotation error kinds.
#[derive(Error, Debug)]
pub enum AliasErrorKind {
    #[error("No unique alias found after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Tag {uid} is unknown or disabled")]
    TagUnavailable { uid: String },
}

/// Command error kinds.
#[derive(Error, Debug)]
pub enum CommandErrorKind {
    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out")]
    ConnectionTimeout,
}

impl AuthdError {
    /// Stable wire code for this error.
    ///
    /// Malformed client input keeps its own code; every storage or rotation
    /// fault collapses to `INTERNAL_ERROR`.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthdError::Validation {
                kind: ValidationErrorKind::MalformedIdentifier { .. },
            } => "MALFORMED_IDENTIFIER",
            AuthdError::Validation {
                kind: ValidationErrorKind::MalformedInput { .. },
            } => "MALFORMED_INPUT",
            AuthdError::Validation { .. } => "VALIDATION_ERROR",
            AuthdError::Command {
                kind: CommandErrorKind::UnknownCommand { .. },
            } => "UNKNOWN_COMMAND",
            AuthdError::Protocol { .. } => "PROTOCOL_ERROR",
            AuthdError::RateLimited { .. } => "RATE_LIMITED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is caused by the client rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthdError::Validation { .. }
                | AuthdError::Command {
                    kind: CommandErrorKind::UnknownCommand { .. }
                }
                | AuthdError::Protocol { .. }
                | AuthdError::RateLimited { .. }
        )
    }

    pub(crate) fn malformed(field: &str, message: impl Into<String>) -> Self {
        AuthdError::Validation {
            kind: ValidationErrorKind::MalformedInput {
                field: field.to_string(),
                message: message.into(),
            },
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        AuthdError::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn query(message: impl Into<String>) -> Self {
        AuthdError::Storage {
            kind: StorageErrorKind::QueryFailed {
                message: message.into(),
            },
        }
    }
}

impl From<rusqlite::Error> for AuthdError {
    fn from(e: rusqlite::Error) -> Self {
        AuthdError::query(e.to_string())
    }
}

impl From<r2d2::Error> for AuthdError {
    fn from(e: r2d2::Error) -> Self {
        AuthdError::Storage {
            kind: StorageErrorKind::PoolUnavailable {
                message: e.to_string(),
            },
        }
    }
}

/// Result type alias for daemon operations.
pub type AuthdResult<T> = Result<T, AuthdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AuthdError::malformed("hmac", "odd length");
        assert_eq!(err.error_code(), "MALFORMED_INPUT");
        assert!(err.is_client_error());

        let err = AuthdError::Validation {
            kind: ValidationErrorKind::MalformedIdentifier {
                message: "empty".to_string(),
            },
        };
        assert_eq!(err.error_code(), "MALFORMED_IDENTIFIER");

        let err = AuthdError::Alias {
            kind: AliasErrorKind::RetriesExhausted { attempts: 5 },
        };
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(!err.is_client_error());

        let err = AuthdError::RateLimited {
            scope: "challenges".to_string(),
        };
        assert_eq!(err.error_code(), "RATE_LIMITED");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_storage_error_display() {
        let err = AuthdError::query("disk I/O error");
        assert_eq!(err.to_string(), "Storage error: Query failed: disk I/O error");
    }
}
