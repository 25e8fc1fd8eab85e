use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque session token issued by the auth service.
///
/// No expiry is modeled; the token is valid until the user logs out.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Login credential. Lives only for the duration of one request.
#[derive(Clone)]
pub struct Credential {
    /// Email or username
    pub identifier: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"***")
            .finish()
    }
}

/// Registration form payload.
#[derive(Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub secret: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Registration {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            secret: secret.into(),
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_name(mut self, first_name: Option<String>, last_name: Option<String>) -> Self {
        self.first_name = first_name;
        self.last_name = last_name;
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("secret", &"***")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

/// Outcome of a single login or register attempt, as observed by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AuthResult {
    /// Request in flight
    Loading,
    Success {
        token: SessionToken,
        message: String,
        user_id: Option<String>,
        username: Option<String>,
    },
    Error {
        message: String,
        /// HTTP status, absent for transport failures
        code: Option<u16>,
    },
}

impl AuthResult {
    pub fn error(message: impl Into<String>, code: Option<u16>) -> Self {
        AuthResult::Error {
            message: message.into(),
            code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success { .. })
    }

    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            AuthResult::Success { token, .. } => Some(token),
            _ => None,
        }
    }

    /// User-facing text for a notification or error banner.
    pub fn message(&self) -> Option<&str> {
        match self {
            AuthResult::Loading => None,
            AuthResult::Success { message, .. } | AuthResult::Error { message, .. } => {
                Some(message.as_str())
            }
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<&'a str>,
}

impl<'a> From<&'a Registration> for RegisterRequest<'a> {
    fn from(registration: &'a Registration) -> Self {
        Self {
            username: &registration.username,
            email: &registration.email,
            secret: &registration.secret,
            first_name: registration.first_name.as_deref(),
            last_name: registration.last_name.as_deref(),
        }
    }
}

/// Body of a successful login or register response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// Backends send the user id as a string or a number; anything else is dropped.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(id) => Some(id),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

impl From<AuthResponse> for AuthResult {
    fn from(response: AuthResponse) -> Self {
        AuthResult::Success {
            token: SessionToken::new(response.token),
            message: response.message,
            user_id: response.user_id,
            username: response.username,
        }
    }
}
