//! Data models for the listeden auth flow.
//!
//! - `Credential`, `Registration`: in-flight request payloads, never persisted
//! - `SessionToken`: the opaque bearer credential owned by the token store
//! - `AuthResult`: observable outcome of a login or register attempt
//! - Wire types for the `/api/auth/*` endpoints

pub mod auth;

pub use auth::{AuthResponse, AuthResult, Credential, LoginRequest, RegisterRequest, Registration, SessionToken};
