//! Consensus manager - algorithm registry, deadlines, and statistics

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn, Instrument};

use super::stats::AlgorithmStats;
use super::{ConsensusAlgorithm, ConsensusContext};
use crate::coordinator::SharedCoordinator;
use crate::error::{SwarmError, SwarmResult};
use crate::events::SwarmEvent;
use crate::otel;
use crate::types::{AlgorithmKind, ConsensusResult, Decision, Proposal, VoteTally};

type StatsTable = Arc<Mutex<BTreeMap<AlgorithmKind, AlgorithmStats>>>;

/// Dispatches proposals to registered algorithms
pub struct ConsensusManager {
    coordinator: SharedCoordinator,
    algorithms: RwLock<HashMap<AlgorithmKind, Arc<dyn ConsensusAlgorithm>>>,
    stats: StatsTable,
}

impl ConsensusManager {
    pub fn new(coordinator: SharedCoordinator) -> Self {
        Self {
            coordinator,
            algorithms: RwLock::new(HashMap::new()),
            stats: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Register (or replace) the implementation for `kind`
    pub fn register_algorithm(&self, kind: AlgorithmKind, algorithm: Arc<dyn ConsensusAlgorithm>) {
        if algorithm.kind() != kind {
            warn!(
                registered_as = %kind,
                implements = %algorithm.kind(),
                "Algorithm registered under a different kind"
            );
        }
        self.algorithms
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, algorithm);
    }

    pub fn is_registered(&self, kind: AlgorithmKind) -> bool {
        self.algorithms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&kind)
    }

    fn algorithm(&self, kind: AlgorithmKind) -> SwarmResult<Arc<dyn ConsensusAlgorithm>> {
        self.algorithms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .ok_or_else(|| SwarmError::AlgorithmNotRegistered(kind.to_string()))
    }

    /// Run `proposal` through `kind`, bounded by `timeout` (or the configured default).
    ///
    /// The run is spawned, so dropping the returned future does not cancel it;
    /// the run still ends at the deadline and still updates statistics.
    pub async fn request_consensus(
        &self,
        proposal: Proposal,
        kind: AlgorithmKind,
        timeout: Option<Duration>,
    ) -> SwarmResult<ConsensusResult> {
        proposal.validate()?;
        let algorithm = self.algorithm(kind)?;
        let timeout = timeout.unwrap_or_else(|| self.coordinator.config().default_consensus_timeout());

        let proposal = Arc::new(proposal);
        let proposal_id = proposal.proposal_id.clone();
        let participants = self.coordinator.responsive_agents().await.len();
        let ctx = ConsensusContext::new(self.coordinator.clone(), timeout);
        let stats = self.stats.clone();
        let event_bus = self.coordinator.event_bus().clone();
        let pending_id = proposal_id.clone();

        info!(proposal_id = %proposal_id, algorithm = %kind, participants, "Consensus started");
        event_bus.publish(SwarmEvent::ConsensusStarted {
            proposal_id: proposal_id.clone(),
            algorithm: kind,
            participants,
            timestamp: Utc::now(),
        });

        let run = tokio::spawn(async move {
            let span = otel::consensus_span(proposal_id.as_str(), &kind.to_string(), participants);
            let outcome = tokio::time::timeout_at(
                ctx.deadline,
                algorithm.propose(&ctx, proposal.clone()).instrument(span.clone()),
            )
            .await;
            let elapsed = ctx.started.elapsed();

            let result = match outcome {
                Ok(result) => result,
                Err(_) => Ok(ConsensusResult::new(
                    proposal_id.clone(),
                    kind,
                    Decision::Timeout,
                    VoteTally::default(),
                    Vec::new(),
                )
                .with_metadata("reason", "deadline")),
            }
            .map(|result| result.with_duration(elapsed));

            let mut table = stats.lock().unwrap_or_else(|e| e.into_inner());
            let entry = table.entry(kind).or_default();
            match &result {
                Ok(result) => {
                    entry.record(result);
                    drop(table);
                    let duration_ms = elapsed.as_millis() as u64;
                    otel::record_consensus_result(
                        &span,
                        &result.decision.to_string(),
                        result.votes_for,
                        result.votes_against,
                        duration_ms,
                    );
                    info!(
                        proposal_id = %proposal_id,
                        algorithm = %kind,
                        decision = %result.decision,
                        votes_for = result.votes_for,
                        votes_against = result.votes_against,
                        duration_ms,
                        "Consensus completed"
                    );
                    event_bus.publish(SwarmEvent::ConsensusCompleted {
                        proposal_id: proposal_id.clone(),
                        algorithm: kind,
                        decision: result.decision,
                        votes_for: result.votes_for,
                        votes_against: result.votes_against,
                        abstain: result.abstain,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    entry.record_error();
                    drop(table);
                    warn!(proposal_id = %proposal_id, algorithm = %kind, error = %e, "Consensus failed");
                }
            }
            result
        });

        match run.await {
            Ok(result) => result,
            Err(e) => {
                warn!(proposal_id = %pending_id, error = %e, "Consensus task aborted");
                Err(SwarmError::ConsensusTimeout {
                    proposal_id: pending_id,
                    elapsed_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Statistics for one algorithm
    pub fn stats(&self, kind: AlgorithmKind) -> AlgorithmStats {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Statistics for every algorithm that has run
    pub fn all_stats(&self) -> BTreeMap<AlgorithmKind, AlgorithmStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl std::fmt::Debug for ConsensusManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<AlgorithmKind> = self
            .algorithms
            .read()
            .map(|a| a.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("ConsensusManager")
            .field("algorithms", &kinds)
            .finish()
    }
}
