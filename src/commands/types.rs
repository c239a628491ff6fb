//! Command types: parameters, results, and execution context.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{AuthdError, ValidationErrorKind};

/// Wrapper around command parameters with helper methods.
#[derive(Debug, Clone)]
pub struct CommandParams {
    inner: serde_json::Value,
}

impl CommandParams {
    /// Create new command parameters from a JSON value.
    pub fn new(value: serde_json::Value) -> Self {
        Self { inner: value }
    }

    /// Get the underlying JSON value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.inner
    }

    /// Deserialize the whole parameter object.
    ///
    /// Any shape mismatch is reported as malformed input.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, AuthdError> {
        serde_json::from_value(self.inner.clone())
            .map_err(|e| AuthdError::malformed("params", e.to_string()))
    }

    /// Get a required string parameter.
    pub fn get_string(&self, key: &str) -> Result<String, AuthdError> {
        self.inner
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| AuthdError::Validation {
                kind: ValidationErrorKind::MissingParameter {
                    param: key.to_string(),
                },
            })
    }

    /// Get an optional string parameter.
    pub fn get_optional_string(&self, key: &str) -> Option<String> {
        self.inner.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
    }

    /// Get an optional integer parameter.
    ///
    /// Present but non-integer values are rejected rather than ignored.
    pub fn get_optional_i64(&self, key: &str) -> Result<Option<i64>, AuthdError> {
        match self.inner.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or_else(|| AuthdError::Validation {
                kind: ValidationErrorKind::InvalidParameter {
                    param: key.to_string(),
                    message: "expected an integer".to_string(),
                },
            }),
        }
    }

    /// Require that a string parameter exists (for validation).
    pub fn require_string(&self, key: &str) -> Result<(), AuthdError> {
        if self.inner.get(key).and_then(|v| v.as_str()).is_some() {
            Ok(())
        } else {
            Err(AuthdError::Validation {
                kind: ValidationErrorKind::MissingParameter {
                    param: key.to_string(),
                },
            })
        }
    }
}

impl From<serde_json::Value> for CommandParams {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// Result of a successful command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Payload placed in the response envelope's `data` field.
    pub data: serde_json::Value,
}

impl CommandResult {
    /// Create a success result with data.
    pub fn success(data: serde_json::Value) -> Self {
        Self { data }
    }
}

/// Execution context for a command.
///
/// Contains metadata about the request and the connected peer.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique identifier for this request.
    pub request_id: Uuid,
    /// Remote address of the connected peer.
    pub peer: SocketAddr,
    /// When the request was received.
    pub received_at: DateTime<Utc>,
    /// The command being executed.
    pub command: String,
}

impl ExecutionContext {
    /// Create a new execution context.
    pub fn new(request_id: Uuid, peer: SocketAddr, command: String) -> Self {
        Self {
            request_id,
            peer,
            received_at: Utc::now(),
            command,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_context(command: &str) -> ExecutionContext {
    ExecutionContext::new(
        Uuid::new_v4(),
        SocketAddr::from(([127, 0, 0, 1], 40000)),
        command.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_command_params_get_string() {
        let params = CommandParams::new(serde_json::json!({
            "identifier": "C59B3706",
            "count": 42
        }));

        assert_eq!(params.get_string("identifier").unwrap(), "C59B3706");
        assert!(params.get_string("missing").is_err());
        assert!(params.require_string("count").is_err());
    }

    #[test]
    fn test_command_params_optional() {
        let params = CommandParams::new(serde_json::json!({
            "uid": "C59B3706",
            "limit": 5,
            "bad": "five"
        }));

        assert_eq!(params.get_optional_string("uid"), Some("C59B3706".to_string()));
        assert_eq!(params.get_optional_string("missing"), None);
        assert_eq!(params.get_optional_i64("limit").unwrap(), Some(5));
        assert_eq!(params.get_optional_i64("missing").unwrap(), None);
        assert!(params.get_optional_i64("bad").is_err());
    }

    #[test]
    fn test_parse_reports_malformed_input() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            identifier: String,
        }

        let params = CommandParams::new(serde_json::json!({ "identifier": 7 }));
        let err = params.parse::<Shape>().unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_INPUT");
    }
}
