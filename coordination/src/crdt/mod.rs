//! Conflict-free replicated data types
//!
//! Every type here implements [`Crdt::merge`] as a pure function that is
//! commutative, associative, and idempotent, so replicas converge no matter
//! the order or multiplicity in which states are exchanged.
//!
//! | Type | Merge |
//! |------|-------|
//! | [`GCounter`] | per-agent max, value is the sum |
//! | [`PNCounter`] | increments and decrements merged independently |
//! | [`LwwRegister`] | later timestamp wins |
//! | [`OrSet`] | union of add tags minus tombstoned tags |
//! | [`LwwMap`] | per-key [`LwwRegister`] merge |
//!
//! [`VectorClock`] is not a value type but shares the same merge algebra and
//! is used by the conflict resolver to detect causal order.

pub mod g_counter;
pub mod lww_map;
pub mod lww_register;
pub mod or_set;
pub mod pn_counter;
pub mod vector_clock;

use serde::{Deserialize, Serialize};

pub use g_counter::GCounter;
pub use lww_map::LwwMap;
pub use lww_register::LwwRegister;
pub use or_set::{OrSet, Tag};
pub use pn_counter::PNCounter;
pub use vector_clock::{ClockOrdering, VectorClock};

/// A state-based CRDT
pub trait Crdt: Clone {
    /// Least upper bound of `self` and `other`
    fn merge(&self, other: &Self) -> Self;

    /// Merge `other` into `self` in place
    fn merge_from(&mut self, other: &Self) {
        *self = self.merge(other);
    }
}

/// Declared CRDT type of a replicated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrdtType {
    GCounter,
    PnCounter,
    LwwRegister,
    OrSet,
    LwwMap,
}

impl std::fmt::Display for CrdtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GCounter => write!(f, "g_counter"),
            Self::PnCounter => write!(f, "pn_counter"),
            Self::LwwRegister => write!(f, "lww_register"),
            Self::OrSet => write!(f, "or_set"),
            Self::LwwMap => write!(f, "lww_map"),
        }
    }
}

/// Any supported CRDT, tagged with its type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "snake_case")]
pub enum CrdtValue {
    GCounter(GCounter),
    PnCounter(PNCounter),
    LwwRegister(LwwRegister),
    OrSet(OrSet),
    LwwMap(LwwMap),
}

impl CrdtValue {
    pub fn crdt_type(&self) -> CrdtType {
        match self {
            Self::GCounter(_) => CrdtType::GCounter,
            Self::PnCounter(_) => CrdtType::PnCounter,
            Self::LwwRegister(_) => CrdtType::LwwRegister,
            Self::OrSet(_) => CrdtType::OrSet,
            Self::LwwMap(_) => CrdtType::LwwMap,
        }
    }

    /// Merge two values of the same type; `None` when the types differ
    pub fn merge(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::GCounter(a), Self::GCounter(b)) => Some(Self::GCounter(a.merge(b))),
            (Self::PnCounter(a), Self::PnCounter(b)) => Some(Self::PnCounter(a.merge(b))),
            (Self::LwwRegister(a), Self::LwwRegister(b)) => Some(Self::LwwRegister(a.merge(b))),
            (Self::OrSet(a), Self::OrSet(b)) => Some(Self::OrSet(a.merge(b))),
            (Self::LwwMap(a), Self::LwwMap(b)) => Some(Self::LwwMap(a.merge(b))),
            _ => None,
        }
    }

    /// What a reader of the replicated value sees
    pub fn observed(&self) -> serde_json::Value {
        match self {
            Self::GCounter(c) => serde_json::Value::from(c.value()),
            Self::PnCounter(c) => serde_json::Value::from(c.value()),
            Self::LwwRegister(r) => r.value.clone(),
            Self::OrSet(s) => serde_json::Value::from(s.elements()),
            Self::LwwMap(m) => serde_json::Value::Object(
                m.entries()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        }
    }
}
