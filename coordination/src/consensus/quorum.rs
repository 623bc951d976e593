//! Threshold voting over every responsive agent

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ConsensusAlgorithm, ConsensusContext};
use crate::error::{SwarmError, SwarmResult};
use crate::types::{AlgorithmKind, ConsensusResult, Decision, Proposal, VoteTally};

/// One round of voting; approved when `votes_for / (for + against) ≥ threshold`
#[derive(Debug, Clone, Copy, Default)]
pub struct QuorumConsensus;

impl QuorumConsensus {
    pub fn new() -> Self {
        Self
    }
}

/// Decide from a possibly incomplete tally.
///
/// With every vote in, the threshold alone decides. With `missing` votes
/// outstanding the outcome is fixed only if no way of casting them could
/// change it; otherwise the round times out.
pub fn decide(tally: VoteTally, missing: usize, threshold: f64) -> Decision {
    if missing == 0 {
        return if tally.meets(threshold) {
            Decision::Approved
        } else {
            Decision::Rejected
        };
    }

    let all_against = VoteTally {
        votes_against: tally.votes_against + missing,
        ..tally
    };
    let all_for = VoteTally {
        votes_for: tally.votes_for + missing,
        ..tally
    };
    let all_abstain = VoteTally {
        abstain: tally.abstain + missing,
        ..tally
    };

    if all_against.meets(threshold) && all_abstain.meets(threshold) {
        Decision::Approved
    } else if !all_for.meets(threshold) && !all_abstain.meets(threshold) {
        Decision::Rejected
    } else {
        Decision::Timeout
    }
}

#[async_trait]
impl ConsensusAlgorithm for QuorumConsensus {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Quorum
    }

    async fn propose(
        &self,
        ctx: &ConsensusContext,
        proposal: Arc<Proposal>,
    ) -> SwarmResult<ConsensusResult> {
        let participants = ctx.coordinator.responsive_agents().await;
        if participants.is_empty() {
            return Err(SwarmError::insufficient("quorum", 0, 1));
        }

        let collection = ctx
            .coordinator
            .collect_votes(proposal.clone(), 1, &participants, ctx.round_window(&proposal))
            .await;
        let tally = VoteTally::from_votes(&collection.votes);
        let missing = participants.len() - collection.votes.len();
        let decision = decide(tally, missing, proposal.threshold);
        debug!(
            proposal_id = %proposal.proposal_id,
            votes = collection.votes.len(),
            missing,
            %decision,
            "Quorum tallied"
        );

        let mut result = ConsensusResult::new(
            proposal.proposal_id.clone(),
            AlgorithmKind::Quorum,
            decision,
            tally,
            participants,
        )
        .with_metadata("threshold", proposal.threshold)
        .with_metadata("missing", missing);
        if let Some(rate) = tally.approval_rate() {
            result = result.with_metadata("approval_rate", rate);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(votes_for: usize, votes_against: usize, abstain: usize) -> VoteTally {
        VoteTally {
            votes_for,
            votes_against,
            abstain,
        }
    }

    #[test]
    fn test_complete_tally_uses_threshold() {
        assert_eq!(decide(tally(3, 1, 0), 0, 0.51), Decision::Approved);
        assert_eq!(decide(tally(2, 2, 0), 0, 0.51), Decision::Rejected);
        assert_eq!(decide(tally(3, 1, 5), 0, 0.75), Decision::Approved);
        assert_eq!(decide(tally(0, 0, 4), 0, 0.0), Decision::Rejected);
    }

    #[test]
    fn test_partial_tally_decides_only_when_fixed() {
        // 4 of 5 voted For; even an Against from the last cannot drop below 0.51
        assert_eq!(decide(tally(4, 0, 0), 1, 0.51), Decision::Approved);
        // 3 Against of 5; the remaining two cannot reach 0.51
        assert_eq!(decide(tally(0, 3, 0), 2, 0.51), Decision::Rejected);
        // 2 For 1 Against with 2 outstanding could go either way
        assert_eq!(decide(tally(2, 1, 0), 2, 0.51), Decision::Timeout);
    }

    #[test]
    fn test_unanimity_with_missing_vote_times_out() {
        assert_eq!(decide(tally(3, 0, 0), 1, 1.0), Decision::Timeout);
    }
}
