
use crate::models::{Role, Turn};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, role: Role, content: impl Into<String>) {
        let ordinal = self.turns.len();
        self.turns.push(Turn {
            role,
            content: content.into(),
            ordinal,
            created_at: Utc::now(),
        });
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    log: ConversationLog,
    // Set by reset while it holds the lock; waiters must re-resolve the id.
    retired: bool,
}

/// Exclusive access to one session's log until dropped.
pub struct SessionGuard {
    session_id: String,
    slot: OwnedMutexGuard<SessionSlot>,
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log(&self) -> &ConversationLog {
        &self.slot.log
    }

    pub fn snapshot(&self) -> ConversationLog {
        self.slot.log.clone()
    }

    pub fn append_turn(&mut self, role: Role, content: impl Into<String>) {
        self.slot.log.push(role, content);
    }

    /// Appends a human question and its answer back to back.
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.slot.log.push(Role::Human, question);
        self.slot.log.push(Role::Assistant, answer);
    }
}

/// Process-wide map from session id to conversation log. Share it via `Arc`.
#[derive(Default)]
pub struct ConversationStore {
    sessions: Mutex<HashMap<String, Arc<AsyncMutex<SessionSlot>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, session_id: &str) -> Arc<AsyncMutex<SessionSlot>> {
        let mut sessions = self.sessions.lock();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(SessionSlot::default()))),
        )
    }

    /// Waits for exclusive access to the session, creating it if needed.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        loop {
            let slot = self.slot(session_id).lock_owned().await;
            if !slot.retired {
                return SessionGuard {
                    session_id: session_id.to_string(),
                    slot,
                };
            }
        }
    }

    pub async fn get_or_create(&self, session_id: &str) -> ConversationLog {
        self.lock(session_id).await.snapshot()
    }

    pub async fn append_turn(&self, session_id: &str, role: Role, content: impl Into<String>) {
        self.lock(session_id).await.append_turn(role, content);
    }

    /// Snapshot of an existing session without creating it.
    pub async fn history(&self, session_id: &str) -> Option<ConversationLog> {
        let existing = self.sessions.lock().get(session_id).cloned();
        let slot = existing?.lock_owned().await;
        if slot.retired {
            None
        } else {
            Some(slot.log.clone())
        }
    }

    /// Waits for any in-flight holder of the session, then drops its log.
    pub async fn reset(&self, session_id: &str) -> bool {
        let existing = self.sessions.lock().get(session_id).cloned();
        let Some(slot) = existing else {
            return false;
        };

        let mut guard = Arc::clone(&slot).lock_owned().await;
        if guard.retired {
            return false;
        }
        guard.retired = true;

        let mut sessions = self.sessions.lock();
        if sessions
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            sessions.remove(session_id);
        }
        debug!(session_id, turns = guard.log.len(), "session reset");
        true
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
