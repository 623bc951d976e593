//! Coordination-free agreement through CRDT merge
//!
//! The proposal payload carries a CRDT value for a state key. It is merged
//! into the coordinator's replica of that key and the merged state is
//! pushed to every live agent. There is no vote: a well-formed proposal is
//! always approved.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ConsensusAlgorithm, ConsensusContext};
use crate::coordinator::SwarmMessage;
use crate::crdt::CrdtValue;
use crate::error::{SwarmError, SwarmResult};
use crate::resolver::{ConflictResolver, ResolutionStrategy};
use crate::types::{
    now_millis, AgentId, AlgorithmKind, ConsensusResult, Decision, Proposal, StateValue,
    StateVersion, VoteTally,
};

/// Writer recorded for merges that did not name an agent
pub const COORDINATOR_WRITER: &str = "coordinator";

/// Expected proposal payload
///
/// ```json
/// { "state_key": "visits", "value": { "type": "g_counter", "state": { "counts": { "a": 3 } } } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CrdtPayload {
    pub state_key: String,
    pub value: CrdtValue,
    /// Agent that produced the value
    #[serde(default)]
    pub agent_id: Option<AgentId>,
}

/// CRDT merge as a consensus algorithm
#[derive(Debug, Default)]
pub struct CrdtConsensus {
    replicas: Mutex<HashMap<String, StateVersion>>,
    resolver: ConflictResolver,
}

impl CrdtConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current merged replica for a key
    pub async fn replica(&self, state_key: &str) -> Option<StateVersion> {
        self.replicas.lock().await.get(state_key).cloned()
    }

    /// Merge `payload` into the replica and return the merged version
    async fn merge(&self, proposal: &Proposal, payload: CrdtPayload) -> SwarmResult<StateVersion> {
        let writer = payload
            .agent_id
            .unwrap_or_else(|| AgentId::new(COORDINATOR_WRITER));
        let mut replicas = self.replicas.lock().await;
        let current = replicas.get(&payload.state_key);

        let incoming_type = payload.value.crdt_type();
        if let Some(current_type) = current.and_then(|c| c.value.crdt_type()) {
            if current_type != incoming_type {
                return Err(SwarmError::malformed(
                    &proposal.proposal_id,
                    format!(
                        "state '{}' holds {}, proposal carries {}",
                        payload.state_key, current_type, incoming_type
                    ),
                ));
            }
        }

        let base = current.cloned().unwrap_or_else(|| {
            StateVersion::new(
                payload.state_key.clone(),
                StateValue::Crdt(payload.value.clone()),
                0,
                0,
                writer.clone(),
            )
        });
        let incoming = base.next(StateValue::Crdt(payload.value), now_millis(), &writer);
        let merged = self
            .resolver
            .resolve(&[base, incoming.clone()], ResolutionStrategy::CrdtAware)
            .unwrap_or(incoming);
        replicas.insert(payload.state_key, merged.clone());
        Ok(merged)
    }
}

#[async_trait]
impl ConsensusAlgorithm for CrdtConsensus {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Crdt
    }

    async fn propose(
        &self,
        ctx: &ConsensusContext,
        proposal: Arc<Proposal>,
    ) -> SwarmResult<ConsensusResult> {
        let payload: CrdtPayload = serde_json::from_value(proposal.payload.clone()).map_err(|e| {
            SwarmError::malformed(&proposal.proposal_id, format!("invalid CRDT payload: {}", e))
        })?;
        let crdt_type = payload.value.crdt_type();
        let merged = self.merge(&proposal, payload).await?;

        let delivered = ctx
            .coordinator
            .broadcast_system(SwarmMessage::StateUpdate(merged.clone()))
            .await;
        debug!(
            state_key = %merged.state_key,
            version = merged.version,
            delivered,
            "CRDT state merged"
        );

        let participants = ctx.coordinator.active_agents().await;
        Ok(ConsensusResult::new(
            proposal.proposal_id.clone(),
            AlgorithmKind::Crdt,
            Decision::Approved,
            VoteTally::default(),
            participants,
        )
        .with_metadata("state_key", merged.state_key.clone())
        .with_metadata("crdt_type", crdt_type.to_string())
        .with_metadata("version", merged.version)
        .with_metadata("value", merged.value.observed())
        .with_metadata("delivered", delivered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{GCounter, LwwRegister};

    fn counter(agent: &str, n: u64) -> CrdtValue {
        let mut counter = GCounter::new();
        counter.increment(&AgentId::new(agent), n);
        CrdtValue::GCounter(counter)
    }

    fn payload(key: &str, value: CrdtValue) -> CrdtPayload {
        CrdtPayload {
            state_key: key.to_string(),
            value,
            agent_id: None,
        }
    }

    #[tokio::test]
    async fn test_merges_accumulate_per_key() {
        let crdt = CrdtConsensus::new();
        let proposal = Proposal::new(serde_json::Value::Null);

        crdt.merge(&proposal, payload("visits", counter("a", 3))).await.unwrap();
        crdt.merge(&proposal, payload("visits", counter("b", 4))).await.unwrap();
        let merged = crdt.merge(&proposal, payload("visits", counter("a", 2))).await.unwrap();

        assert_eq!(merged.value.observed(), serde_json::json!(7));
        assert_eq!(merged.version, 3);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_malformed() {
        let crdt = CrdtConsensus::new();
        let proposal = Proposal::new(serde_json::Value::Null);
        crdt.merge(&proposal, payload("cfg", counter("a", 1))).await.unwrap();

        let register = CrdtValue::LwwRegister(LwwRegister::new(
            serde_json::json!("v1"),
            100,
            AgentId::new("a"),
        ));
        let err = crdt.merge(&proposal, payload("cfg", register)).await.unwrap_err();
        assert!(matches!(err, SwarmError::MalformedProposal { .. }));
    }

    #[test]
    fn test_payload_parses_from_json() {
        let json = serde_json::json!({
            "state_key": "visits",
            "value": { "type": "g_counter", "state": { "counts": { "a": 3 } } }
        });
        let parsed: CrdtPayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.value.crdt_type(), crate::crdt::CrdtType::GCounter);
    }
}
