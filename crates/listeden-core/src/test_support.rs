//! Test doubles shared by the unit tests.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::auth::{MemoryTokenStore, StorageError, TokenStore};
use crate::models::SessionToken;

/// In-memory store whose operations can be switched to fail or stall.
#[derive(Debug, Default)]
pub struct FlakyTokenStore {
    inner: MemoryTokenStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    next_delay: Mutex<Option<Duration>>,
    stalled: Notify,
}

impl FlakyTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails.
    pub fn broken() -> Self {
        let store = Self::default();
        store.set_fail_reads(true);
        store.set_fail_writes(true);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Controls both `save` and `clear`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the next operation of any kind sleep for `delay` before running.
    pub fn stall_next(&self, delay: Duration) {
        *self.next_delay.lock().unwrap() = Some(delay);
    }

    /// Resolves once the stalled operation has started.
    pub async fn stalled(&self) {
        self.stalled.notified().await;
    }

    async fn pause(&self) {
        let delay = self.next_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            self.stalled.notify_one();
            tokio::time::sleep(delay).await;
        }
    }

    /// Peek at the stored value regardless of the failure switches.
    pub async fn stored(&self) -> Option<SessionToken> {
        self.inner.read().await.unwrap_or(None)
    }

    fn denied() -> StorageError {
        StorageError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "storage unavailable"))
    }
}

#[async_trait]
impl TokenStore for FlakyTokenStore {
    async fn save(&self, token: &SessionToken) -> Result<(), StorageError> {
        self.pause().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::denied());
        }
        self.inner.save(token).await
    }

    async fn read(&self) -> Result<Option<SessionToken>, StorageError> {
        self.pause().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::denied());
        }
        self.inner.read().await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.pause().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::denied());
        }
        self.inner.clear().await
    }
}
