//! REST API client module for the listeden backend.
//!
//! This module provides the `ApiClient`, which exchanges credentials for a
//! session token on `/api/auth/*` and attaches the stored token as a JWT
//! bearer credential on every request it sends.

pub mod client;
pub mod error;

pub use client::{ApiClient, DEFAULT_BASE_URL};
pub use error::ApiError;
