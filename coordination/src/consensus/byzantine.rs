//! Byzantine fault tolerant voting
//!
//! The same proposal is voted on over several rounds. An agent that answers
//! differently in two rounds is flagged malicious; an agent that skips a
//! round is excluded. Only agents that answered every round identically are
//! tallied, and approval needs `2f + 1` of them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::{ConsensusAlgorithm, ConsensusContext};
use crate::config::ByzantineConfig;
use crate::error::{SwarmError, SwarmResult};
use crate::events::SwarmEvent;
use crate::types::{AgentId, AlgorithmKind, ConsensusResult, Decision, Proposal, VoteChoice, VoteTally};

/// How one agent behaved across the rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterClass {
    /// Same choice every round
    Consistent(VoteChoice),
    /// Two rounds disagree
    Inconsistent,
    /// Missed at least one round
    Silent,
}

/// Classify one agent's per-round answers
pub fn classify(choices: &[Option<VoteChoice>]) -> VoterClass {
    let mut first: Option<VoteChoice> = None;
    let mut silent = choices.is_empty();
    for choice in choices {
        match (choice, first) {
            (None, _) => silent = true,
            (Some(c), None) => first = Some(*c),
            (Some(c), Some(f)) if *c != f => return VoterClass::Inconsistent,
            _ => {}
        }
    }
    match first {
        Some(choice) if !silent => VoterClass::Consistent(choice),
        _ => VoterClass::Silent,
    }
}

/// Tolerated faults for `n` agents: configured, or the most `3f + 1 ≤ n` allows
pub fn fault_tolerance(config: &ByzantineConfig, n: usize) -> usize {
    config.fault_tolerance.unwrap_or(n.saturating_sub(1) / 3)
}

/// Multi-round voting that tolerates up to `f` lying agents
#[derive(Debug, Clone)]
pub struct ByzantineConsensus {
    config: ByzantineConfig,
}

impl ByzantineConsensus {
    pub fn new(config: ByzantineConfig) -> Self {
        Self { config }
    }
}

impl Default for ByzantineConsensus {
    fn default() -> Self {
        Self::new(ByzantineConfig::default())
    }
}

#[async_trait]
impl ConsensusAlgorithm for ByzantineConsensus {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Byzantine
    }

    async fn propose(
        &self,
        ctx: &ConsensusContext,
        proposal: Arc<Proposal>,
    ) -> SwarmResult<ConsensusResult> {
        let participants = ctx.coordinator.responsive_agents().await;
        let n = participants.len();
        let f = fault_tolerance(&self.config, n);
        let need = 3 * f + 1;
        if n == 0 || n < need {
            return Err(SwarmError::insufficient("byzantine", n, need));
        }

        let rounds = self.config.rounds;
        let mut answers: BTreeMap<AgentId, Vec<Option<VoteChoice>>> = participants
            .iter()
            .map(|id| (id.clone(), Vec::with_capacity(rounds as usize)))
            .collect();
        let mut round_timed_out = false;
        let mut completed = 0u32;

        for round in 1..=rounds {
            let window = ctx.share_window(&proposal, rounds - round + 1);
            if window.is_zero() {
                break;
            }
            let collection = ctx
                .coordinator
                .collect_votes(proposal.clone(), round, &participants, window)
                .await;
            round_timed_out |= collection.timed_out;
            completed = round;

            let by_agent: BTreeMap<&AgentId, VoteChoice> = collection
                .votes
                .iter()
                .map(|vote| (&vote.agent_id, vote.choice))
                .collect();
            for (id, history) in answers.iter_mut() {
                history.push(by_agent.get(id).copied());
            }
        }

        let mut tally = VoteTally::default();
        let mut consistent = Vec::new();
        let mut malicious = Vec::new();
        let mut excluded = Vec::new();
        for (id, history) in &answers {
            match classify(history) {
                VoterClass::Consistent(choice) => {
                    tally.add(choice);
                    consistent.push(id.clone());
                }
                VoterClass::Inconsistent => malicious.push(id.clone()),
                VoterClass::Silent => excluded.push(id.clone()),
            }
        }

        for id in &malicious {
            warn!(agent_id = %id, proposal_id = %proposal.proposal_id, "Agent voted inconsistently");
            ctx.coordinator
                .event_bus()
                .publish(SwarmEvent::AgentFlaggedMalicious {
                    agent_id: id.clone(),
                    proposal_id: proposal.proposal_id.clone(),
                    timestamp: Utc::now(),
                });
        }

        let required = 2 * f + 1;
        let decision = if completed < rounds {
            // Consistency across every round is unproven; nothing is tallied
            warn!(
                proposal_id = %proposal.proposal_id,
                completed,
                rounds,
                "Byzantine rounds cut short by the deadline"
            );
            tally = VoteTally::default();
            consistent.clear();
            Decision::Timeout
        } else if tally.votes_for >= required && tally.meets(proposal.threshold) {
            Decision::Approved
        } else if round_timed_out && consistent.len() < required {
            Decision::Timeout
        } else {
            Decision::Rejected
        };
        debug!(
            proposal_id = %proposal.proposal_id,
            f,
            completed,
            consistent = consistent.len(),
            malicious = malicious.len(),
            %decision,
            "Byzantine tally"
        );

        let to_json = |ids: &[AgentId]| -> Vec<String> { ids.iter().map(|id| id.to_string()).collect() };
        Ok(ConsensusResult::new(
            proposal.proposal_id.clone(),
            AlgorithmKind::Byzantine,
            decision,
            tally,
            consistent,
        )
        .with_metadata("fault_tolerance", f)
        .with_metadata("required_approvals", required)
        .with_metadata("rounds", completed)
        .with_metadata("rounds_required", rounds)
        .with_metadata("malicious", to_json(&malicious))
        .with_metadata("excluded", to_json(&excluded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VoteChoice::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&[Some(For), Some(For), Some(For)]),
            VoterClass::Consistent(For)
        );
        assert_eq!(
            classify(&[Some(For), Some(Against), Some(For)]),
            VoterClass::Inconsistent
        );
        assert_eq!(classify(&[Some(For), None, Some(For)]), VoterClass::Silent);
        assert_eq!(classify(&[None, None, None]), VoterClass::Silent);
        // Equivocation outranks silence
        assert_eq!(
            classify(&[Some(For), None, Some(Against)]),
            VoterClass::Inconsistent
        );
    }

    #[test]
    fn test_fault_tolerance_derivation() {
        let config = ByzantineConfig::default();
        assert_eq!(fault_tolerance(&config, 1), 0);
        assert_eq!(fault_tolerance(&config, 4), 1);
        assert_eq!(fault_tolerance(&config, 6), 1);
        assert_eq!(fault_tolerance(&config, 7), 2);

        let fixed = ByzantineConfig {
            fault_tolerance: Some(2),
            ..ByzantineConfig::default()
        };
        assert_eq!(fault_tolerance(&fixed, 4), 2);
    }
}
