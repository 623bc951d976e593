//! Versioned state replicated across agents

use serde::{Deserialize, Serialize};

use super::agent::AgentId;
use crate::crdt::{CrdtType, CrdtValue, VectorClock};

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Value held under a state key.
///
/// `Crdt` values declare their merge semantics; `Plain` values can only be
/// resolved by ordering (LWW or causal dominance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Plain(serde_json::Value),
    Crdt(CrdtValue),
}

impl StateValue {
    pub fn plain(value: impl Into<serde_json::Value>) -> Self {
        Self::Plain(value.into())
    }

    /// Declared CRDT type, if any
    pub fn crdt_type(&self) -> Option<CrdtType> {
        match self {
            Self::Plain(_) => None,
            Self::Crdt(value) => Some(value.crdt_type()),
        }
    }

    /// Stable encoding used for deterministic tie-breaks and divergence checks.
    ///
    /// `serde_json` maps are ordered and CRDT internals use ordered
    /// collections, so equal values always encode identically.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Observable value, with CRDTs collapsed to what a reader would see
    pub fn observed(&self) -> serde_json::Value {
        match self {
            Self::Plain(value) => value.clone(),
            Self::Crdt(value) => value.observed(),
        }
    }
}

/// One agent's version of a state key.
///
/// `version` is monotonically non-decreasing per `state_key` on any single
/// agent; divergence across agents is expected and resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVersion {
    pub state_key: String,
    pub value: StateValue,
    pub version: u64,
    /// Write time in milliseconds
    pub timestamp: u64,
    pub agent_id: AgentId,
    #[serde(default)]
    pub clock: VectorClock,
}

impl StateVersion {
    pub fn new(
        state_key: impl Into<String>,
        value: StateValue,
        version: u64,
        timestamp: u64,
        agent_id: impl Into<AgentId>,
    ) -> Self {
        Self {
            state_key: state_key.into(),
            value,
            version,
            timestamp,
            agent_id: agent_id.into(),
            clock: VectorClock::new(),
        }
    }

    pub fn with_clock(mut self, clock: VectorClock) -> Self {
        self.clock = clock;
        self
    }

    /// Produce the next local version written by `agent_id`
    pub fn next(&self, value: StateValue, timestamp: u64, agent_id: &AgentId) -> Self {
        let mut clock = self.clock.clone();
        clock.increment(agent_id);
        Self {
            state_key: self.state_key.clone(),
            value,
            version: self.version + 1,
            timestamp,
            agent_id: agent_id.clone(),
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::GCounter;

    #[test]
    fn test_next_bumps_version_and_clock() {
        let a = AgentId::new("a");
        let v1 = StateVersion::new("cfg", StateValue::plain("x"), 1, 100, a.clone());
        let v2 = v1.next(StateValue::plain("y"), 120, &a);

        assert_eq!(v2.version, 2);
        assert_eq!(v2.clock.get(&a), 1);
        assert_eq!(v2.state_key, "cfg");
    }

    #[test]
    fn test_crdt_type_detection() {
        let plain = StateValue::plain(serde_json::json!({"k": 1}));
        assert_eq!(plain.crdt_type(), None);

        let counter = StateValue::Crdt(CrdtValue::GCounter(GCounter::new()));
        assert_eq!(counter.crdt_type(), Some(CrdtType::GCounter));
    }

    #[test]
    fn test_canonical_is_key_order_independent() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(
            StateValue::Plain(a).canonical(),
            StateValue::Plain(b).canonical()
        );
    }
}
