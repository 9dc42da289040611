use serde_json::Value;
use thiserror::Error;

use crate::auth::StoreError;

/// Normalized classes of failure, used by front ends to decide how a
/// rejected operation is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad credentials or an expired/invalid session.
    Auth,
    /// Field-level input errors. The session is untouched.
    Validation,
    /// Connectivity loss or timeout. Never retried automatically.
    Network,
    Unknown,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{0}")]
    Auth(String),

    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Unknown(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Build an auth error from an error payload, using its `detail` message
    /// when the server supplied one.
    pub fn auth_from_payload(body: &str, fallback: &str) -> Self {
        ApiError::Auth(detail_message(body).unwrap_or_else(|| fallback.to_string()))
    }

    /// Build a validation error from a field-keyed error payload such as
    /// `{"email": ["already exists"]}`.
    ///
    /// The `email` field wins when present, then the first other field with a
    /// message, then `detail`, then `fallback`.
    pub fn validation_from_payload(body: &str, fallback: &str) -> Self {
        let payload: Option<Value> = serde_json::from_str(body).ok();
        let Some(Value::Object(fields)) = payload else {
            return ApiError::Validation {
                field: None,
                message: fallback.to_string(),
            };
        };

        let first_message = |value: &Value| -> Option<String> {
            match value {
                Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
                Value::String(s) => Some(s.clone()),
                _ => None,
            }
        };

        if let Some(message) = fields.get("email").and_then(first_message) {
            return ApiError::Validation {
                field: Some("email".to_string()),
                message,
            };
        }

        for (name, value) in fields.iter().filter(|(name, _)| name.as_str() != "detail") {
            if let Some(message) = first_message(value) {
                return ApiError::Validation {
                    field: Some(name.clone()),
                    message,
                };
            }
        }

        ApiError::Validation {
            field: None,
            message: fields
                .get("detail")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Auth(_) | ApiError::Unauthorized | ApiError::AccessDenied(_) => {
                ErrorKind::Auth
            }
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::NotFound(_)
            | ApiError::RateLimited
            | ApiError::ServerError(_)
            | ApiError::InvalidResponse(_)
            | ApiError::Storage(_)
            | ApiError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Message suitable for inline display next to a form or list.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Network error. Please check your connection.".to_string(),
            ApiError::Unauthorized => "Session expired. Please log in again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError::Storage(error.to_string())
    }
}

fn detail_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    payload
        .get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
}
