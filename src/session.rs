//! Per-chat session state
//!
//! Sessions live in memory only and are forgotten after a period of
//! inactivity or when the registry reaches its capacity.

use moka::future::Cache;
use std::time::Duration;

/// What the next free-text message in a chat means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    #[default]
    Idle,
    /// Next text or forwarded message names a user to create
    AwaitingNewUsername,
    /// Next text names a user whose config is wanted (typed-name flow)
    AwaitingAdminConfigUsername,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    pub mode: ChatMode,
    /// Username the current action works on; logged and dropped when the
    /// chat returns to the menu
    pub pending_username: Option<String>,
    /// The chat's single menu message, edited in place
    pub menu_message_id: Option<i32>,
}

/// Bounded, expiring map of chat id to session
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<i64, ChatSession>,
}

impl SessionRegistry {
    pub fn new(max_sessions: u64, idle_ttl: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle_ttl)
            .build();
        Self { sessions }
    }

    /// Current session, or a fresh idle one
    pub async fn get(&self, chat_id: i64) -> ChatSession {
        self.sessions.get(&chat_id).await.unwrap_or_default()
    }

    pub async fn update<F>(&self, chat_id: i64, f: F) -> ChatSession
    where
        F: FnOnce(&mut ChatSession),
    {
        let mut session = self.get(chat_id).await;
        f(&mut session);
        self.sessions.insert(chat_id, session.clone()).await;
        session
    }

    pub async fn set_mode(&self, chat_id: i64, mode: ChatMode) {
        self.update(chat_id, |s| {
            s.mode = mode;
            s.pending_username = None;
        })
        .await;
    }

    /// Back to idle; the menu message stays tracked
    pub async fn clear_mode(&self, chat_id: i64) {
        self.set_mode(chat_id, ChatMode::Idle).await;
    }

    pub async fn menu_message_id(&self, chat_id: i64) -> Option<i32> {
        self.get(chat_id).await.menu_message_id
    }

    pub async fn set_menu_message_id(&self, chat_id: i64, message_id: i32) {
        self.update(chat_id, |s| s.menu_message_id = Some(message_id)).await;
    }

    pub fn len(&self) -> u64 {
        self.sessions.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
