//! Session persistence and per-sender serialization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::state::SessionState;

/// Where conversation state lives between messages.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// State for `sender`, or the default when none is stored.
    async fn load(&self, sender: &str) -> SessionState;

    async fn save(&self, sender: &str, state: SessionState);
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, sender: &str) -> SessionState {
        self.sessions
            .read()
            .await
            .get(sender)
            .cloned()
            .unwrap_or_default()
    }

    async fn save(&self, sender: &str, state: SessionState) {
        // Idle sessions with no sticky site carry nothing worth keeping.
        let mut sessions = self.sessions.write().await;
        if state == SessionState::default() {
            sessions.remove(sender);
        } else {
            sessions.insert(sender.to_string(), state);
        }
    }
}

/// One async mutex per sender. Holding the guard for the whole
/// load → transition → effect → save cycle keeps a sender's messages
/// strictly ordered while different senders proceed in parallel.
#[derive(Default)]
pub struct SenderLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SenderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, sender: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(sender.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::state::UserFlow;
    use std::time::Duration;

    #[tokio::test]
    async fn load_defaults_and_save_roundtrip() {
        let store = InMemorySessionStore::new();
        assert_eq!(store.load("alice").await, SessionState::default());

        let state = SessionState {
            flow: UserFlow::CheckMenu,
            ..Default::default()
        };
        store.save("alice", state.clone()).await;
        assert_eq!(store.load("alice").await, state);
        assert_eq!(store.load("bob").await, SessionState::default());

        store.save("alice", SessionState::default()).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn same_sender_waits_other_sender_does_not() {
        let locks = Arc::new(SenderLocks::new());
        let held = locks.acquire("alice").await;

        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire("bob")).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire("alice")).await;
        assert!(same.is_err());

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire("alice")).await;
        assert!(again.is_ok());
    }
}
