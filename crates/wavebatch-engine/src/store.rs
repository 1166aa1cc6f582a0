use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::warn;

/// Success payloads of completed operations, keyed by operation id.
///
/// Each id is written once, by the orchestrator, after the operation's task
/// has finished. Tasks dispatched afterwards read it during resolution.
#[derive(Clone, Default)]
pub struct ResultStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payload. Returns false (and keeps the first value) if the id
    /// was already written.
    pub async fn publish(&self, id: &str, payload: Value) -> bool {
        let mut map = self.inner.write().await;
        if map.contains_key(id) {
            warn!(op_id = %id, "Result already published, ignoring second write");
            return false;
        }
        map.insert(id.to_string(), payload);
        true
    }

    /// Read access for resolution.
    pub async fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.inner.read().await
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_write_wins() {
        let store = ResultStore::new();
        assert!(store.publish("op1", json!({"result": 1})).await);
        assert!(!store.publish("op1", json!({"result": 2})).await);
        assert_eq!(store.read().await["op1"], json!({"result": 1}));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = ResultStore::new();
        let other = store.clone();
        store.publish("a", json!(1)).await;
        assert!(other.read().await.contains_key("a"));
    }
}
