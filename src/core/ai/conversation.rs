use super::models::ConversationTurn;
use async_trait::async_trait;
use thiserror::Error;

/// Observed default cap on stored turns per user.
pub const DEFAULT_MAX_HISTORY: usize = 40;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation store error: {0}")]
    Backend(String),
}

/// Per-user ordered conversation history.
///
/// Keys are opaque user identifiers (for WhatsApp, the sender's phone
/// number). Turns are only ever appended or evicted from the front; past
/// turns are never edited in place.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the user's turns in insertion order, creating an empty
    /// history on first access.
    async fn get(&self, user_id: &str) -> Result<Vec<ConversationTurn>, StoreError>;

    /// Appends turns to the end of the user's history.
    async fn append(&self, user_id: &str, turns: Vec<ConversationTurn>) -> Result<(), StoreError>;

    /// Keeps only the newest `max_len` turns, evicting the oldest first.
    async fn truncate(&self, user_id: &str, max_len: usize) -> Result<(), StoreError>;

    /// Forgets the user entirely.
    async fn clear(&self, user_id: &str) -> Result<(), StoreError>;
}
