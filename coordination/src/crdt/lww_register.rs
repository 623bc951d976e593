//! Last-write-wins register

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::Crdt;
use crate::types::AgentId;

/// Register holding the value of the latest write.
///
/// Writes are ordered by `(timestamp, writer, canonical value)`, so two
/// writes with the same timestamp still resolve the same way on every
/// replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister {
    pub value: serde_json::Value,
    /// Write time in milliseconds
    pub timestamp: u64,
    pub writer: AgentId,
}

impl LwwRegister {
    pub fn new(value: serde_json::Value, timestamp: u64, writer: AgentId) -> Self {
        Self {
            value,
            timestamp,
            writer,
        }
    }

    /// Record a local write. Stale writes are ignored.
    pub fn set(&mut self, value: serde_json::Value, timestamp: u64, writer: &AgentId) {
        let candidate = Self::new(value, timestamp, writer.clone());
        if candidate.write_order(self) == Ordering::Greater {
            *self = candidate;
        }
    }

    fn write_order(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.writer.cmp(&other.writer))
            .then_with(|| self.value.to_string().cmp(&other.value.to_string()))
    }
}

impl Crdt for LwwRegister {
    fn merge(&self, other: &Self) -> Self {
        if other.write_order(self) == Ordering::Greater {
            other.clone()
        } else {
            self.clone()
        }
    }
}
