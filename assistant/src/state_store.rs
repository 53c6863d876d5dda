//! Persistence for per-user conversation state.
//!
//! The conversation machine is resumable across process restarts because
//! every transition is persisted here before its replies are sent. State
//! lives under `users/{id}/conversation` as a tagged JSON object; an
//! absent or empty record means [`ConversationState::Idle`].
//!
//! Loading is deliberately forgiving: a record that no longer decodes
//! (say, after a deploy changed a flow's shape) is logged and treated as
//! idle instead of wedging the user's conversation forever.

use crate::machine::state::ConversationState;
use crate::paths;
use mealflow_core::store::{DurableStore, StoreError};
use mealflow_core::ActorId;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Typed view over the conversation-state records.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn DurableStore>,
}

impl StateStore {
    /// Creates a state store over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Loads an actor's conversation state, falling back to idle for
    /// absent, empty, or undecodable records.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] when the read itself fails.
    pub async fn load(&self, actor: ActorId) -> Result<ConversationState, StoreError> {
        let record = self.store.get(paths::conversation(actor)).await?;
        let Some(value) = record else {
            return Ok(ConversationState::Idle);
        };
        // A cleared conversation is stored as an empty object.
        if value.as_object().is_some_and(Map::is_empty) {
            return Ok(ConversationState::Idle);
        }
        match serde_json::from_value(value) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(%actor, error = %e, "undecodable conversation state, resetting to idle");
                Ok(ConversationState::Idle)
            },
        }
    }

    /// Persists an actor's conversation state. Idle is stored as an empty
    /// record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on write failure, [`StoreError::Serialization`]
    /// if the state does not serialize (not expected in practice).
    pub async fn save(&self, actor: ActorId, state: &ConversationState) -> Result<(), StoreError> {
        let value = if matches!(state, ConversationState::Idle) {
            Value::Object(Map::new())
        } else {
            serde_json::to_value(state).map_err(|e| StoreError::Serialization(e.to_string()))?
        };
        self.store.set(paths::conversation(actor), value).await
    }

    /// Shallow-merges raw fields into an actor's conversation record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on write failure.
    pub async fn merge(&self, actor: ActorId, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.store.update(paths::conversation(actor), fields).await
    }

    /// Clears an actor's conversation back to idle.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on write failure.
    pub async fn clear(&self, actor: ActorId) -> Result<(), StoreError> {
        self.save(actor, &ConversationState::Idle).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::machine::state::SearchTarget;
    use mealflow_testing::InMemoryStore;
    use serde_json::json;

    fn state_store() -> (Arc<InMemoryStore>, StateStore) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), StateStore::new(store))
    }

    #[tokio::test]
    async fn absent_and_cleared_records_load_as_idle() {
        let (_, states) = state_store();
        let actor = ActorId(1);
        assert_eq!(states.load(actor).await.unwrap(), ConversationState::Idle);

        let mid_flow = ConversationState::AwaitingSearchQuery { target: SearchTarget::Vendor };
        states.save(actor, &mid_flow).await.unwrap();
        assert_eq!(states.load(actor).await.unwrap(), mid_flow);

        states.clear(actor).await.unwrap();
        assert_eq!(states.load(actor).await.unwrap(), ConversationState::Idle);
    }

    #[tokio::test]
    async fn undecodable_state_resets_to_idle_instead_of_failing() {
        let (store, states) = state_store();
        let actor = ActorId(2);
        store
            .set(paths::conversation(actor), json!({"flow": "from_a_future_version"}))
            .await
            .unwrap();
        assert_eq!(states.load(actor).await.unwrap(), ConversationState::Idle);
    }
}
