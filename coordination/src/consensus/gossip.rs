//! Epidemic vote propagation
//!
//! Each agent starts out knowing only its own vote. Every round the
//! coordinator hands each agent `fanout` random peers; the agent pushes its
//! view to them over the topology and reports the view it began the round
//! with. An agent forms a local decision once it has heard from a majority
//! of the swarm. The run converges when the share of agents holding the most
//! common decision reaches `convergence_threshold`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::{ConsensusAlgorithm, ConsensusContext};
use crate::config::GossipConfig;
use crate::coordinator::{GossipView, SwarmMessage};
use crate::error::{SwarmError, SwarmResult};
use crate::types::{AgentId, AlgorithmKind, ConsensusResult, Decision, Proposal, VoteTally};

/// What one agent concludes from the votes it has heard of
fn local_decision(view: &GossipView, n: usize, threshold: f64) -> Option<Decision> {
    if view.len() * 2 <= n {
        return None;
    }
    let mut tally = VoteTally::default();
    for choice in view.values() {
        tally.add(*choice);
    }
    Some(if tally.meets(threshold) {
        Decision::Approved
    } else {
        Decision::Rejected
    })
}

/// Modal decision and the share of agents holding it
fn agreement(decisions: &[Option<Decision>]) -> Option<(Decision, f64)> {
    let mut counts: BTreeMap<u8, (Decision, usize)> = BTreeMap::new();
    for decision in decisions.iter().flatten() {
        let key = match decision {
            Decision::Approved => 0,
            Decision::Rejected => 1,
            Decision::Timeout => 2,
        };
        counts.entry(key).or_insert((*decision, 0)).1 += 1;
    }
    counts
        .into_values()
        .max_by_key(|(_, count)| *count)
        .map(|(decision, count)| (decision, count as f64 / decisions.len() as f64))
}

/// Pick up to `fanout` distinct peers for every participant, never itself
pub fn assign_peers<R: Rng + ?Sized>(
    participants: &[AgentId],
    fanout: usize,
    rng: &mut R,
) -> Vec<(AgentId, Vec<AgentId>)> {
    participants
        .iter()
        .map(|sender| {
            let others: Vec<&AgentId> = participants.iter().filter(|p| *p != sender).collect();
            let peers = others
                .choose_multiple(rng, fanout)
                .map(|peer| (*peer).clone())
                .collect();
            (sender.clone(), peers)
        })
        .collect()
}

/// Gossip-based agreement
#[derive(Debug, Clone)]
pub struct GossipConsensus {
    config: GossipConfig,
}

impl GossipConsensus {
    pub fn new(config: GossipConfig) -> Self {
        Self { config }
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Default for GossipConsensus {
    fn default() -> Self {
        Self::new(GossipConfig::default())
    }
}

#[async_trait]
impl ConsensusAlgorithm for GossipConsensus {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Gossip
    }

    async fn propose(
        &self,
        ctx: &ConsensusContext,
        proposal: Arc<Proposal>,
    ) -> SwarmResult<ConsensusResult> {
        let participants = ctx.coordinator.responsive_agents().await;
        if participants.is_empty() {
            return Err(SwarmError::insufficient("gossip", 0, 1));
        }
        let n = participants.len();
        let mut rng = self.rng();

        // The last round only reports what the final exchange delivered
        let total = self.config.max_rounds.saturating_add(1);
        let mut latest: BTreeMap<AgentId, GossipView> = BTreeMap::new();
        let mut messages = 0;
        let mut exchanges = 0;
        let mut best = None;
        let mut timed_out = false;

        for round in 1..=total {
            let window = ctx.share_window(&proposal, total - round + 1);
            if window.is_zero() {
                timed_out = true;
                break;
            }
            let assignments = if round < total {
                assign_peers(&participants, self.config.fanout, &mut rng)
            } else {
                participants.iter().map(|id| (id.clone(), Vec::new())).collect()
            };

            let collection = ctx
                .coordinator
                .gossip_round(proposal.clone(), round, assignments, window)
                .await;
            timed_out |= collection.timed_out;
            for (agent, report) in collection.reports {
                messages += report.pushed;
                latest.insert(agent, report.view);
            }
            exchanges = round - 1;

            let decisions: Vec<Option<Decision>> = participants
                .iter()
                .map(|id| {
                    latest
                        .get(id)
                        .and_then(|view| local_decision(view, n, proposal.threshold))
                })
                .collect();
            best = agreement(&decisions);
            debug!(
                proposal_id = %proposal.proposal_id,
                round,
                share = best.map_or(0.0, |(_, share)| share),
                "Gossip round measured"
            );
            if best.is_some_and(|(_, share)| share >= self.config.convergence_threshold) {
                break;
            }
        }
        ctx.coordinator
            .broadcast_system(SwarmMessage::GossipDone {
                proposal_id: proposal.proposal_id.clone(),
            })
            .await;

        let (decision, convergence, converged) = match best {
            Some((decision, share)) if share >= self.config.convergence_threshold => {
                (decision, share, true)
            }
            Some((_, share)) => (Decision::Timeout, share, false),
            None => (Decision::Timeout, 0.0, false),
        };
        if !converged {
            warn!(
                proposal_id = %proposal.proposal_id,
                exchanges,
                convergence,
                timed_out,
                "Gossip did not converge"
            );
        }

        // Every vote that reached anyone, counted once per voter
        let mut heard = GossipView::new();
        for view in latest.values() {
            for (origin, choice) in view {
                heard.entry(origin.clone()).or_insert(*choice);
            }
        }
        let mut tally = VoteTally::default();
        for choice in heard.values() {
            tally.add(*choice);
        }
        let silent: BTreeSet<String> = participants
            .iter()
            .filter(|id| !heard.contains_key(*id))
            .map(|id| id.to_string())
            .collect();
        let reporters: Vec<AgentId> = participants
            .into_iter()
            .filter(|id| latest.contains_key(id))
            .collect();

        Ok(ConsensusResult::new(
            proposal.proposal_id.clone(),
            AlgorithmKind::Gossip,
            decision,
            tally,
            reporters,
        )
        .with_metadata("rounds", exchanges)
        .with_metadata("converged", converged)
        .with_metadata("convergence", convergence)
        .with_metadata("messages", messages)
        .with_metadata("fanout", self.config.fanout)
        .with_metadata("silent", silent.into_iter().collect::<Vec<_>>()))
    }
}
