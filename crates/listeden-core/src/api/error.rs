use thiserror::Error;

use crate::models::AuthResult;

/// Message used when a non-2xx response carries no usable body.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Message used when a 2xx response carries no usable token.
pub const EMPTY_RESPONSE: &str = "empty response";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("empty response (status {status})")]
    EmptyResponse { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull a human-readable message out of an error body.
    ///
    /// JSON bodies are searched for `message`, then `error`; anything else is
    /// used verbatim.
    pub fn message_from_body(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return UNKNOWN_ERROR.to_string();
        }

        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
            for key in ["message", "error"] {
                if let Some(serde_json::Value::String(text)) = map.get(key) {
                    if !text.trim().is_empty() {
                        return Self::truncate_body(text.trim());
                    }
                }
            }
        }

        Self::truncate_body(trimmed)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        ApiError::Server {
            status: status.as_u16(),
            message: Self::message_from_body(body),
        }
    }

    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::EmptyResponse { status } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            ApiError::InvalidUrl(_) | ApiError::Decode(_) => None,
        }
    }
}

impl From<ApiError> for AuthResult {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Server { status, message } => AuthResult::error(message, Some(status)),
            ApiError::EmptyResponse { status } => AuthResult::error(EMPTY_RESPONSE, Some(status)),
            ApiError::Network(e) => AuthResult::error(format!("connection error: {}", e), None),
            ApiError::InvalidUrl(msg) | ApiError::Decode(msg) => AuthResult::error(msg, None),
        }
    }
}
