use thiserror::Error;

/// Failure of the token persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Token storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token storage contents are invalid: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Token storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors returned by `SessionController` actions.
///
/// Login/register failures are not errors here; they arrive as
/// `AuthResult::Error`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("An authentication request is already in progress")]
    Busy,

    #[error("Already logged in")]
    AlreadyAuthenticated,

    #[error("Logged in, but the session token could not be saved: {0}")]
    Persist(#[source] StorageError),

    #[error("Failed to clear the session token: {0}")]
    Storage(#[source] StorageError),
}
