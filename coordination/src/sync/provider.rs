//! Persistence boundary for resolved state

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::SwarmResult;
use crate::types::StateVersion;

/// External store the synchronizer persists resolved state to
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn put(&self, state_key: &str, version: &StateVersion) -> SwarmResult<()>;

    async fn get(&self, state_key: &str) -> SwarmResult<Option<StateVersion>>;
}

/// Process-local provider
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    entries: RwLock<HashMap<String, StateVersion>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl MemoryProvider for InMemoryProvider {
    async fn put(&self, state_key: &str, version: &StateVersion) -> SwarmResult<()> {
        self.entries
            .write()
            .await
            .insert(state_key.to_string(), version.clone());
        Ok(())
    }

    async fn get(&self, state_key: &str) -> SwarmResult<Option<StateVersion>> {
        Ok(self.entries.read().await.get(state_key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateValue;

    #[tokio::test]
    async fn test_put_then_get() {
        let provider = InMemoryProvider::new();
        assert!(provider.get("cfg").await.unwrap().is_none());

        let version = StateVersion::new("cfg", StateValue::plain("v1"), 1, 100, "a");
        provider.put("cfg", &version).await.unwrap();
        assert_eq!(provider.get("cfg").await.unwrap(), Some(version));
        assert_eq!(provider.len().await, 1);
    }
}
