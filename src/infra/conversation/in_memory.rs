// In-memory implementation of ConversationStore.
//
// History lives only as long as the process. A restart forgets every
// conversation, which is an accepted limitation of the bot.

use crate::core::ai::{ConversationStore, ConversationTurn, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

/// Maps user id -> ordered turns.
///
/// **DashMap:**
/// A concurrent HashMap shared by every in-flight turn. Each operation locks
/// only the shard holding that user.
pub struct InMemoryConversationStore {
    histories: DashMap<String, Vec<ConversationTurn>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            histories: DashMap::new(),
        }
    }

    /// Number of users with a stored history.
    #[cfg(test)]
    pub fn user_count(&self) -> usize {
        self.histories.len()
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, user_id: &str) -> Result<Vec<ConversationTurn>, StoreError> {
        Ok(self
            .histories
            .entry(user_id.to_string())
            .or_default()
            .clone())
    }

    async fn append(&self, user_id: &str, turns: Vec<ConversationTurn>) -> Result<(), StoreError> {
        self.histories
            .entry(user_id.to_string())
            .or_default()
            .extend(turns);
        Ok(())
    }

    async fn truncate(&self, user_id: &str, max_len: usize) -> Result<(), StoreError> {
        if let Some(mut history) = self.histories.get_mut(user_id) {
            let excess = history.len().saturating_sub(max_len);
            if excess > 0 {
                // Oldest first; the newest `max_len` keep their order.
                history.drain(..excess);
            }
        }
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        self.histories.remove(user_id);
        Ok(())
    }
}
