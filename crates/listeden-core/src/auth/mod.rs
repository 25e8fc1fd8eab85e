//! Authentication module for managing the session token lifecycle.
//!
//! This module provides:
//! - `TokenStore`: single-slot token persistence (file, OS keychain, memory)
//! - `SessionController`: login/register/logout state machine on top of the
//!   store and the `ApiClient`
//!
//! The stored token has no expiry; it lives until logout.

pub mod error;
pub mod session;
pub mod token_store;

pub use error::{SessionError, StorageError};
pub use session::{SessionController, SessionState, Submission};
pub use token_store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore, AUTH_TOKEN_KEY};
