//! Map of last-write-wins registers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Crdt, LwwRegister};
use crate::types::AgentId;

/// String-keyed map whose entries merge independently as [`LwwRegister`]s
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwMap {
    entries: BTreeMap<String, LwwRegister>,
}

impl LwwMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
        timestamp: u64,
        writer: &AgentId,
    ) {
        let key = key.into();
        match self.entries.get_mut(&key) {
            Some(register) => register.set(value, timestamp, writer),
            None => {
                self.entries
                    .insert(key, LwwRegister::new(value, timestamp, writer.clone()));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key).map(|r| &r.value)
    }

    /// Entries in key order
    pub fn entries(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.entries.iter().map(|(k, r)| (k, &r.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Crdt for LwwMap {
    fn merge(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (key, theirs) in &other.entries {
            let merged = match entries.get(key) {
                Some(ours) => ours.merge(theirs),
                None => theirs.clone(),
            };
            entries.insert(key.clone(), merged);
        }
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_merge_independently() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");

        let mut left = LwwMap::new();
        left.set("mode", json!("fast"), 10, &a);
        left.set("limit", json!(5), 30, &a);

        let mut right = LwwMap::new();
        right.set("mode", json!("safe"), 20, &b);
        right.set("limit", json!(9), 15, &b);

        let merged = left.merge(&right);
        assert_eq!(merged.get("mode"), Some(&json!("safe")));
        assert_eq!(merged.get("limit"), Some(&json!(5)));
        assert_eq!(merged.len(), 2);
    }
}
