//! Observed-remove set

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::Crdt;
use crate::types::AgentId;

/// Unique identity of one `add` operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub replica: AgentId,
    pub counter: u64,
}

/// Set where a remove only cancels the adds it has observed.
///
/// A concurrent add of the same element carries a fresh tag and therefore
/// survives the remove (add-wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrSet {
    /// Live tags per element. Never contains a tombstoned tag or an empty entry.
    adds: BTreeMap<String, BTreeSet<Tag>>,
    tombstones: BTreeSet<Tag>,
    /// Highest tag counter issued per replica
    counters: BTreeMap<AgentId, u64>,
}

impl OrSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, element: &str, replica: &AgentId) -> Tag {
        let counter = self.counters.entry(replica.clone()).or_insert(0);
        *counter += 1;
        let tag = Tag {
            replica: replica.clone(),
            counter: *counter,
        };
        self.adds
            .entry(element.to_string())
            .or_default()
            .insert(tag.clone());
        tag
    }

    /// Remove every observed instance of `element`. Returns whether it was present.
    pub fn remove(&mut self, element: &str) -> bool {
        match self.adds.remove(element) {
            Some(tags) => {
                self.tombstones.extend(tags);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, element: &str) -> bool {
        self.adds.contains_key(element)
    }

    /// Current members in sorted order
    pub fn elements(&self) -> Vec<String> {
        self.adds.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty()
    }
}

impl Crdt for OrSet {
    fn merge(&self, other: &Self) -> Self {
        let tombstones: BTreeSet<Tag> = self.tombstones.union(&other.tombstones).cloned().collect();

        let mut adds: BTreeMap<String, BTreeSet<Tag>> = BTreeMap::new();
        for (element, tags) in self.adds.iter().chain(other.adds.iter()) {
            let live = tags.iter().filter(|t| !tombstones.contains(t)).cloned();
            adds.entry(element.clone()).or_default().extend(live);
        }
        adds.retain(|_, tags| !tags.is_empty());

        let mut counters = self.counters.clone();
        for (replica, n) in &other.counters {
            let slot = counters.entry(replica.clone()).or_insert(0);
            *slot = (*slot).max(*n);
        }

        Self {
            adds,
            tombstones,
            counters,
        }
    }
}
