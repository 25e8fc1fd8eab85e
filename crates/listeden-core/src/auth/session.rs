use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::{SessionError, StorageError, TokenStore};
use crate::api::ApiClient;
use crate::models::{AuthResult, Credential, Registration, SessionToken};

/// Authentication state of the single application session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    Unauthenticated,
    /// A login or register request is in flight
    Authenticating,
    Authenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }
}

/// What the user submitted from the login or register form.
#[derive(Debug, Clone)]
pub enum Submission {
    Login(Credential),
    Register(Registration),
}

impl From<Credential> for Submission {
    fn from(credential: Credential) -> Self {
        Submission::Login(credential)
    }
}

impl From<Registration> for Submission {
    fn from(registration: Registration) -> Self {
        Submission::Register(registration)
    }
}

/// Resets the state to `Unauthenticated` if a submit is dropped mid-flight.
struct AuthenticatingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
    armed: bool,
}

impl AuthenticatingGuard<'_> {
    fn complete(mut self, next: SessionState) {
        self.armed = false;
        self.state.send_replace(next);
    }
}

impl Drop for AuthenticatingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Authentication request abandoned");
            self.state.send_replace(SessionState::Unauthenticated);
        }
    }
}

/// Drives the session lifecycle: login/register, token persistence, logout.
///
/// The token store is the source of truth for "logged in"; the controller is
/// its only writer. State changes are published on a watch channel so a UI
/// can follow them with [`SessionController::subscribe`].
///
/// Every step that touches the store and then publishes a state holds
/// `op_lock`, so a state derived from a read can never overwrite the outcome
/// of a submit or logout that finished in the meantime.
pub struct SessionController {
    client: ApiClient,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
    last_result: watch::Sender<Option<AuthResult>>,
    op_lock: Mutex<()>,
    /// Token from a successful login that the store refused to save
    pending: Mutex<Option<SessionToken>>,
}

impl SessionController {
    pub fn new(client: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            store,
            state: watch::Sender::new(SessionState::Unauthenticated),
            last_result: watch::Sender::new(None),
            op_lock: Mutex::new(()),
            pending: Mutex::new(None),
        }
    }

    /// The HTTP client, for authenticated requests made on the user's behalf
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Last published state, without touching the store
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Follow `Loading` and the final `AuthResult` of each attempt
    pub fn subscribe_results(&self) -> watch::Receiver<Option<AuthResult>> {
        self.last_result.subscribe()
    }

    /// Whether a token is held in memory because persisting it failed
    pub async fn has_pending_token(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Work out the session state from the token store.
    ///
    /// A store read failure is treated as logged out.
    pub async fn current_state(&self) -> SessionState {
        if self.state() == SessionState::Authenticating {
            return SessionState::Authenticating;
        }

        let _op = self.op_lock.lock().await;
        if let Err(e) = self.flush_pending().await {
            debug!(error = %e, "Session token still only held in memory");
            return self.settle(SessionState::Authenticated);
        }

        let derived = match self.store.read().await {
            Ok(Some(_)) => SessionState::Authenticated,
            Ok(None) => SessionState::Unauthenticated,
            Err(e) => {
                warn!(error = %e, "Failed to read session token, treating as logged out");
                SessionState::Unauthenticated
            }
        };
        self.settle(derived)
    }

    /// Log in or register.
    ///
    /// Rejected with `Busy` while another attempt is in flight and with
    /// `AlreadyAuthenticated` once a session exists. Login failures come back
    /// as `Ok(AuthResult::Error { .. })` and leave the store untouched.
    pub async fn submit(&self, submission: impl Into<Submission>) -> Result<AuthResult, SessionError> {
        let submission = submission.into();
        let guard = self.begin()?;
        self.last_result.send_replace(Some(AuthResult::Loading));

        let result = match &submission {
            Submission::Login(credential) => {
                self.client
                    .login(&credential.identifier, &credential.secret)
                    .await
            }
            Submission::Register(registration) => self.client.register(registration).await,
        };
        drop(submission);
        self.last_result.send_replace(Some(result.clone()));

        let token = match &result {
            AuthResult::Success { token, .. } => token.clone(),
            _ => {
                guard.complete(SessionState::Unauthenticated);
                return Ok(result);
            }
        };

        let _op = self.op_lock.lock().await;
        match self.store.save(&token).await {
            Ok(()) => {
                info!("Session established");
                guard.complete(SessionState::Authenticated);
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "Logged in but failed to persist session token");
                *self.pending.lock().await = Some(token);
                guard.complete(SessionState::Authenticated);
                Err(SessionError::Persist(e))
            }
        }
    }

    /// Clear the stored token and return to `Unauthenticated`.
    pub async fn logout(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Authenticating {
            return Err(SessionError::Busy);
        }

        let _op = self.op_lock.lock().await;
        if self.state() == SessionState::Authenticating {
            return Err(SessionError::Busy);
        }
        self.store.clear().await.map_err(SessionError::Storage)?;
        self.pending.lock().await.take();
        self.settle(SessionState::Unauthenticated);
        self.last_result.send_replace(None);
        info!("Logged out");
        Ok(())
    }

    /// Try again to persist a token whose save failed after login.
    pub async fn retry_persist(&self) -> Result<(), SessionError> {
        let _op = self.op_lock.lock().await;
        self.flush_pending().await.map_err(SessionError::Persist)
    }

    async fn flush_pending(&self) -> Result<(), StorageError> {
        let mut pending = self.pending.lock().await;
        if let Some(token) = pending.as_ref() {
            self.store.save(token).await?;
            info!("Pending session token persisted");
            *pending = None;
        }
        Ok(())
    }

    /// Compare-and-swap `Unauthenticated -> Authenticating`.
    fn begin(&self) -> Result<AuthenticatingGuard<'_>, SessionError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| match *state {
            SessionState::Unauthenticated => {
                *state = SessionState::Authenticating;
                true
            }
            SessionState::Authenticating => {
                outcome = Err(SessionError::Busy);
                false
            }
            SessionState::Authenticated => {
                outcome = Err(SessionError::AlreadyAuthenticated);
                false
            }
        });

        outcome.map(|()| AuthenticatingGuard {
            state: &self.state,
            armed: true,
        })
    }

    /// Move to `next` unless an attempt is in flight; returns the resulting state.
    fn settle(&self, next: SessionState) -> SessionState {
        let mut settled = next;
        self.state.send_if_modified(|state| {
            if *state == SessionState::Authenticating {
                settled = SessionState::Authenticating;
                return false;
            }
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        settled
    }
}
