//! Response collection for control-plane requests
//!
//! A collection is opened before requests go out and closed when its guard
//! drops, so an abandoned caller future never leaves a slot behind. The
//! slot map sits behind a `std::sync::Mutex` that is never held across an
//! `.await`.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::types::AgentId;

struct Slot<T> {
    expected: HashSet<AgentId>,
    seen: HashSet<AgentId>,
    tx: mpsc::UnboundedSender<T>,
}

/// Open collections keyed by `K`
pub(crate) struct Collectors<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
}

impl<K: Eq + Hash + Clone, T> Collectors<K, T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Slot<T>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start accepting responses from `expected` under `key`
    pub fn open(
        &self,
        key: K,
        expected: HashSet<AgentId>,
    ) -> (CollectorGuard<'_, K, T>, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            key.clone(),
            Slot {
                expected,
                seen: HashSet::new(),
                tx,
            },
        );
        (
            CollectorGuard {
                collectors: self,
                key,
            },
            rx,
        )
    }

    /// Stop waiting on an agent that could not be reached
    pub fn forget(&self, key: &K, agent: &AgentId) {
        if let Some(slot) = self.lock().get_mut(key) {
            slot.expected.remove(agent);
        }
    }

    /// Accept the first response per expected agent. Returns whether it was kept.
    pub fn submit(&self, key: &K, from: &AgentId, item: T) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return false;
        };
        if !slot.expected.contains(from) || !slot.seen.insert(from.clone()) {
            return false;
        }
        slot.tx.send(item).is_ok()
    }

    #[cfg(test)]
    pub fn open_count(&self) -> usize {
        self.lock().len()
    }

    fn close(&self, key: &K) {
        self.lock().remove(key);
    }
}

/// Removes its collection on drop
pub(crate) struct CollectorGuard<'a, K: Eq + Hash + Clone, T> {
    collectors: &'a Collectors<K, T>,
    key: K,
}

impl<K: Eq + Hash + Clone, T> Drop for CollectorGuard<'_, K, T> {
    fn drop(&mut self) {
        self.collectors.close(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_response_wins_and_guard_cleans_up() {
        let collectors: Collectors<String, u32> = Collectors::new();
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        let key = "p-1".to_string();
        {
            let (_guard, mut rx) = collectors.open(key.clone(), [a.clone()].into_iter().collect());
            assert!(collectors.submit(&key, &a, 1));
            assert!(!collectors.submit(&key, &a, 2));
            assert!(!collectors.submit(&key, &b, 3));
            assert_eq!(rx.try_recv().unwrap(), 1);
            assert!(rx.try_recv().is_err());
            assert_eq!(collectors.open_count(), 1);
        }
        assert_eq!(collectors.open_count(), 0);
        assert!(!collectors.submit(&key, &a, 4));
    }
}
