//! Conflict resolution between divergent state versions
//!
//! Every strategy orders versions by a total key, so the result depends only
//! on the set of versions and never on the order they arrived in.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::crdt::{ClockOrdering, Crdt, CrdtValue, VectorClock};
use crate::types::{StateValue, StateVersion};

/// How to pick a winner among conflicting versions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Latest timestamp wins
    Lww,
    /// Causally latest wins; concurrent versions fall back to LWW
    VectorClock,
    /// Merge values that share a CRDT type; anything else falls back to LWW
    #[default]
    CrdtAware,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lww => write!(f, "lww"),
            Self::VectorClock => write!(f, "vector_clock"),
            Self::CrdtAware => write!(f, "crdt_aware"),
        }
    }
}

/// LWW order: timestamp, then version, then agent id, then canonical value,
/// then canonical clock. Only identical versions compare equal.
fn lww_order(a: &StateVersion, b: &StateVersion) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
        .then_with(|| a.value.canonical().cmp(&b.value.canonical()))
        .then_with(|| a.clock.canonical().cmp(&b.clock.canonical()))
}

/// Stateless resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `versions` into one. `None` only for an empty input.
    pub fn resolve(
        &self,
        versions: &[StateVersion],
        strategy: ResolutionStrategy,
    ) -> Option<StateVersion> {
        match strategy {
            ResolutionStrategy::Lww => Self::last_writer(versions.iter()),
            ResolutionStrategy::VectorClock => Self::causal(versions),
            ResolutionStrategy::CrdtAware => {
                Self::crdt_merge(versions).or_else(|| Self::last_writer(versions.iter()))
            }
        }
    }

    fn last_writer<'a>(versions: impl Iterator<Item = &'a StateVersion>) -> Option<StateVersion> {
        versions.max_by(|a, b| lww_order(a, b)).cloned()
    }

    /// Versions whose clock is after or equal to every other clock. If that
    /// set is empty some versions are concurrent, and all of them compete
    /// under LWW.
    fn causal(versions: &[StateVersion]) -> Option<StateVersion> {
        let maximal: Vec<&StateVersion> = versions
            .iter()
            .filter(|v| {
                versions.iter().all(|w| {
                    matches!(
                        v.clock.compare(&w.clock),
                        ClockOrdering::After | ClockOrdering::Equal
                    )
                })
            })
            .collect();
        if maximal.is_empty() {
            Self::last_writer(versions.iter())
        } else {
            Self::last_writer(maximal.into_iter())
        }
    }

    /// Merge when every version holds the same CRDT type
    fn crdt_merge(versions: &[StateVersion]) -> Option<StateVersion> {
        let first = versions.first()?;
        let crdt_type = first.value.crdt_type()?;
        if versions
            .iter()
            .any(|v| v.value.crdt_type() != Some(crdt_type))
        {
            return None;
        }

        let mut merged: Option<CrdtValue> = None;
        let mut clock = VectorClock::new();
        for version in versions {
            if let StateValue::Crdt(value) = &version.value {
                merged = match merged {
                    None => Some(value.clone()),
                    Some(acc) => acc.merge(value),
                };
            }
            clock.merge_from(&version.clock);
        }

        let winner = Self::last_writer(versions.iter())?;
        Some(StateVersion {
            state_key: winner.state_key.clone(),
            value: StateValue::Crdt(merged?),
            version: versions.iter().map(|v| v.version).max().unwrap_or(winner.version),
            timestamp: winner.timestamp,
            agent_id: winner.agent_id.clone(),
            clock,
        })
    }
}
