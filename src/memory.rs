//! Per-session conversation history with FIFO eviction.
//!
//! The manager keeps an ordered turn log per session on top of a
//! [`TurnStore`] backend. Sessions are created lazily on first append and
//! removed by an explicit clear; the core never expires them on its own.
//!
//! Concurrent appends to the same session are serialized through a
//! per-session async mutex, so two in-flight answers for one session can
//! never interleave their user/assistant turn pairs. Appends to different
//! sessions are not ordered relative to each other.
//!
//! When a session grows past `max_turns`, the oldest turns are evicted
//! first, rounded so the surviving log still opens with a user turn and
//! the user/assistant alternation is preserved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;
use crate::models::{Role, Turn};
use crate::store::TurnStore;

pub struct ConversationManager {
    store: Arc<dyn TurnStore>,
    max_turns: usize,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn TurnStore>, max_turns: usize) -> Self {
        Self {
            store,
            max_turns: max_turns.max(2),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Append one turn, evicting oldest turns past `max_turns`.
    pub async fn append(&self, session_id: &str, turn: &Turn) -> Result<()> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        self.store.append_turn(session_id, turn).await?;
        self.evict_overflow(session_id).await
    }

    /// Append a user/assistant pair under a single lock acquisition, so
    /// concurrent answers for the same session cannot interleave pairs.
    pub async fn append_exchange(&self, session_id: &str, user: &Turn, assistant: &Turn) -> Result<()> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        self.store.append_turn(session_id, user).await?;
        self.store.append_turn(session_id, assistant).await?;
        self.evict_overflow(session_id).await
    }

    /// Most recent `max_turns` turns, oldest first.
    pub async fn history(&self, session_id: &str, max_turns: usize) -> Result<Vec<Turn>> {
        self.store.list_turns(session_id, Some(max_turns)).await
    }

    /// Remove all turns for the session. Idempotent.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        self.store.clear_session(session_id).await
    }

    async fn evict_overflow(&self, session_id: &str) -> Result<()> {
        let count = self.store.count_turns(session_id).await?;
        if count <= self.max_turns {
            return Ok(());
        }
        let mut overflow = count - self.max_turns;

        // Round the cut so the surviving log opens with a user turn,
        // keeping the user/assistant alternation intact.
        let turns = self.store.list_turns(session_id, None).await?;
        if turns
            .get(overflow)
            .map(|t| t.role == Role::Assistant)
            .unwrap_or(false)
        {
            overflow += 1;
        }

        self.store.remove_oldest(session_id, overflow).await
    }
}

/// Render turns as `Role: text` lines for the prompt template.
pub fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", role, t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
