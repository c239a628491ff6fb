//! Response types for the daemon protocol.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AuthdError, ValidationErrorKind};

/// Sanitize error messages before sending to clients.
///
/// This prevents information disclosure by replacing detailed error messages
/// with generic, user-friendly messages while preserving the error code.
fn sanitize_error_message(code: &str, _original: &str) -> String {
    match code {
        "MALFORMED_INPUT" => "Malformed input".to_string(),
        "MALFORMED_IDENTIFIER" => "Identifier is not well-formed hex".to_string(),
        "VALIDATION_ERROR" => "Invalid request parameters".to_string(),
        "UNKNOWN_COMMAND" => "Unknown command".to_string(),
        "PROTOCOL_ERROR" => "Malformed request".to_string(),
        "INTERNAL_ERROR" => "Internal server error".to_string(),
        "RATE_LIMITED" => "Too many requests".to_string(),
        "SERVER_BUSY" => "Server is at capacity".to_string(),
        _ => "An error occurred".to_string(),
    }
}

/// A response envelope from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request succeeded.
    pub success: bool,

    /// Unique identifier for this request/response pair.
    pub request_id: Uuid,

    /// Response data on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error details on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Error details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "MALFORMED_INPUT", "INTERNAL_ERROR").
    pub code: String,

    /// Human-readable error message.
    pub message: String,

    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Response {
    /// Create an error response for a failed command.
    ///
    /// Malformed input names the offending field in `details`.
    pub fn from_error(request_id: Uuid, error: &AuthdError) -> Self {
        let mut response = Self::error_with_id(request_id, error.error_code(), error.to_string());

        if let AuthdError::Validation {
            kind: ValidationErrorKind::MalformedInput { field, .. },
        } = error
        {
            if let Some(body) = response.error.as_mut() {
                body.details = Some(serde_json::json!({ "field": field }));
            }
        }

        response
    }

    /// Create a success response.
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4(),
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4(),
            data: None,
            error: Some(ErrorResponse {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Create a success response with a specific request ID.
    pub fn success_with_id(request_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            success: true,
            request_id,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response with a specific request ID.
    ///
    /// The error message is sanitized before being sent to the client to prevent
    /// information disclosure. The original error is logged server-side for debugging.
    pub fn error_with_id(
        request_id: Uuid,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let code_str = code.into();
        let original_message = message.into();

        // Log full error server-side for debugging
        debug!(
            request_id = %request_id,
            code = %code_str,
            message = %original_message,
            "Error response (sanitized for client)"
        );

        Self {
            success: false,
            request_id,
            data: None,
            error: Some(ErrorResponse {
                code: code_str.clone(),
                message: sanitize_error_message(&code_str, &original_message),
                details: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = Response::success(serde_json::json!({"result": "ok"}));
        assert!(response.success);
        assert!(response.data.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_response() {
        let response = Response::error("TEST_ERROR", "Something went wrong");
        assert!(!response.success);
        assert!(response.data.is_none());
        assert!(response.error.is_some());

        let error = response.error.unwrap();
        assert_eq!(error.code, "TEST_ERROR");
        assert_eq!(error.message, "Something went wrong");
    }

    #[test]
    fn test_response_serialization() {
        let response = Response::success(serde_json::json!({"key": "value"}));
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"request_id\""));
        assert!(!json.contains("\"error\"")); // Should be skipped when None
    }

    #[test]
    fn test_error_message_sanitized() {
        let id = Uuid::new_v4();
        let response = Response::error_with_id(id, "INTERNAL_ERROR", "database is locked at /var/lib/x");
        assert_eq!(response.request_id, id);

        let error = response.error.unwrap();
        assert_eq!(error.code, "INTERNAL_ERROR");
        assert_eq!(error.message, "Internal server error");
    }

    #[test]
    fn test_malformed_codes_kept() {
        let response = Response::error_with_id(Uuid::new_v4(), "MALFORMED_INPUT", "hmac: odd length");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "MALFORMED_INPUT");
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_from_error_names_field() {
        let err = AuthdError::malformed("hmac", "expected 32 bytes, got 4");
        let response = Response::from_error(Uuid::new_v4(), &err);

        let error = response.error.unwrap();
        assert_eq!(error.code, "MALFORMED_INPUT");
        assert_eq!(error.message, "Malformed input");
        assert_eq!(error.details.unwrap()["field"], "hmac");
    }
}
