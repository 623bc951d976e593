//! Pluggable consensus
//!
//! Every algorithm implements [`ConsensusAlgorithm`] and is registered with
//! the [`ConsensusManager`] under its [`AlgorithmKind`]. The manager owns
//! validation, deadlines, statistics, and events; algorithms only decide.
//!
//! | Algorithm | Participation | Decision |
//! |-----------|---------------|----------|
//! | Quorum | responsive agents | approval rate ≥ threshold |
//! | Raft | majority alive | leader commits to a majority |
//! | Byzantine | n ≥ 3f + 1 | 2f + 1 consistent approvals over three rounds |
//! | Gossip | responsive agents | modal decision after epidemic spread |
//! | CRDT | none | always merges |

pub mod byzantine;
pub mod crdt;
pub mod gossip;
mod manager;
pub mod quorum;
pub mod raft;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::coordinator::SharedCoordinator;
use crate::error::SwarmResult;
use crate::types::{AlgorithmKind, ConsensusResult, Proposal};

pub use byzantine::ByzantineConsensus;
pub use crdt::CrdtConsensus;
pub use gossip::GossipConsensus;
pub use manager::ConsensusManager;
pub use quorum::QuorumConsensus;
pub use raft::{LogEntry, RaftConsensus, RaftNodeView, RaftRole};
pub use stats::AlgorithmStats;

/// What an algorithm run may use
#[derive(Debug, Clone)]
pub struct ConsensusContext {
    pub coordinator: SharedCoordinator,
    pub started: Instant,
    /// Hard end of the run; the manager cancels the algorithm here
    pub deadline: Instant,
}

impl ConsensusContext {
    pub fn new(coordinator: SharedCoordinator, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            coordinator,
            started,
            deadline: started + timeout,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Window for one vote round: the proposal's round timeout, cut at the deadline
    pub fn round_window(&self, proposal: &Proposal) -> Duration {
        proposal.timeout.min(self.remaining())
    }

    /// Window for the next of `rounds_left` rounds: an equal share of what
    /// remains, with one share held back for the tally, capped at the
    /// proposal's round timeout
    pub fn share_window(&self, proposal: &Proposal, rounds_left: u32) -> Duration {
        (self.remaining() / rounds_left.saturating_add(1)).min(proposal.timeout)
    }
}

/// A consensus strategy
#[async_trait]
pub trait ConsensusAlgorithm: Send + Sync {
    fn kind(&self) -> AlgorithmKind;

    /// Drive `proposal` to a terminal result. `Decision::Timeout` is a valid
    /// outcome; errors are reserved for unmet preconditions.
    async fn propose(
        &self,
        ctx: &ConsensusContext,
        proposal: Arc<Proposal>,
    ) -> SwarmResult<ConsensusResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwarmConfig;
    use crate::coordinator::SwarmCoordinator;
    use crate::events::EventBus;

    fn context(timeout: Duration) -> ConsensusContext {
        let coordinator = SwarmCoordinator::new(SwarmConfig::default(), EventBus::new().shared())
            .unwrap()
            .shared();
        ConsensusContext::new(coordinator, timeout)
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_window_splits_the_deadline() {
        let ctx = context(Duration::from_secs(4));
        let proposal = Proposal::new(serde_json::json!({})).with_timeout(Duration::from_secs(5));

        // Three rounds plus the held-back share
        assert_eq!(ctx.share_window(&proposal, 3), Duration::from_secs(1));
        assert_eq!(ctx.round_window(&proposal), Duration::from_secs(4));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(ctx.share_window(&proposal, 1), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_window_capped_by_round_timeout() {
        let ctx = context(Duration::from_secs(60));
        let proposal = Proposal::new(serde_json::json!({})).with_timeout(Duration::from_millis(200));
        assert_eq!(ctx.share_window(&proposal, 3), Duration::from_millis(200));
    }
}
