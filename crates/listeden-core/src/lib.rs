//! Core library for listeden.
//!
//! Provides the token-authenticated API client, the session token store and
//! the session controller that ties them together, plus app configuration.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
mod test_support;
