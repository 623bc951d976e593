//! State synchronization across the swarm
//!
//! A sync asks every active agent for its copy of a key, waits for a quorum
//! of answers within the configured window, and resolves the answers (plus
//! whatever the provider and the local log hold) into one version. That
//! version is pushed back to every agent, kept in the local log for delta
//! sync, and persisted through the [`MemoryProvider`].
//!
//! When the inputs disagree the resolved version is bumped one past the
//! highest version seen, so every agent adopts it over its own copy.

mod provider;

pub use provider::{InMemoryProvider, MemoryProvider};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use crate::coordinator::{SharedCoordinator, StateQuery, SwarmMessage};
use crate::error::{SwarmError, SwarmResult};
use crate::events::SwarmEvent;
use crate::otel;
use crate::resolver::ConflictResolver;
use crate::types::{StateVersion, SwarmId};

/// Outcome of one full synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub resolved: StateVersion,
    /// Agents that answered within the window
    pub responders: usize,
    pub required: usize,
    /// Inputs disagreed on the value
    pub divergent: bool,
    /// Highest minus lowest version among the inputs
    pub version_gap: u64,
    /// Agents the resolved version was pushed to
    pub delivered: usize,
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// How a set of versions for one key disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Divergence {
    pub divergent: bool,
    pub version_gap: u64,
    pub max_version: u64,
}

impl Divergence {
    /// Inputs diverge when they carry more than one distinct value
    pub fn detect(versions: &[StateVersion]) -> Self {
        let Some(max_version) = versions.iter().map(|v| v.version).max() else {
            return Self::default();
        };
        let min_version = versions.iter().map(|v| v.version).min().unwrap_or(max_version);
        let values: BTreeSet<String> = versions.iter().map(|v| v.value.canonical()).collect();
        Self {
            divergent: values.len() > 1,
            version_gap: max_version - min_version,
            max_version,
        }
    }
}

/// Full and delta synchronization of keyed state
pub struct StateSynchronizer {
    coordinator: SharedCoordinator,
    provider: Arc<dyn MemoryProvider>,
    resolver: ConflictResolver,
    /// Resolved versions, newest per key
    log: RwLock<BTreeMap<String, StateVersion>>,
}

impl StateSynchronizer {
    pub fn new(coordinator: SharedCoordinator, provider: Arc<dyn MemoryProvider>) -> Self {
        Self {
            coordinator,
            provider,
            resolver: ConflictResolver::new(),
            log: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn MemoryProvider> {
        &self.provider
    }

    /// Last resolved version of a key
    pub async fn resolved(&self, state_key: &str) -> Option<StateVersion> {
        self.log.read().await.get(state_key).cloned()
    }

    fn check_swarm(&self, swarm_id: SwarmId) -> SwarmResult<()> {
        if swarm_id != self.coordinator.swarm_id() {
            return Err(SwarmError::UnknownSwarm(swarm_id));
        }
        Ok(())
    }

    /// Resolve `state_key` across the swarm
    pub async fn synchronize(&self, swarm_id: SwarmId, state_key: &str) -> SwarmResult<StateVersion> {
        self.synchronize_with_report(swarm_id, state_key)
            .await
            .map(|report| report.resolved)
    }

    /// Like [`synchronize`](Self::synchronize) but report what happened
    pub async fn synchronize_with_report(
        &self,
        swarm_id: SwarmId,
        state_key: &str,
    ) -> SwarmResult<SyncReport> {
        self.check_swarm(swarm_id)?;
        let started = Instant::now();
        let sync = &self.coordinator.config().sync;
        let participants = self.coordinator.active_agents().await;
        let required = sync.required_responders(participants.len());
        let span = otel::sync_span(state_key, required);

        async {
            let collection = self
                .coordinator
                .collect_states(StateQuery::Key(state_key.to_string()), &participants, sync.window())
                .await;
            let responders = collection.responses.len();
            if responders < required {
                warn!(state_key, responders, required, "State sync missed its quorum");
                return Err(SwarmError::SyncTimeout {
                    state_key: state_key.to_string(),
                    responded: responders,
                    required,
                });
            }

            let mut candidates: Vec<StateVersion> = collection
                .versions()
                .filter(|v| v.state_key == state_key)
                .cloned()
                .collect();
            match self.provider.get(state_key).await {
                Ok(Some(stored)) => candidates.push(stored),
                Ok(None) => {}
                Err(e) => warn!(state_key, error = %e, "Provider read failed during sync"),
            }
            if let Some(logged) = self.resolved(state_key).await {
                candidates.push(logged);
            }
            if candidates.is_empty() {
                return Err(SwarmError::StateNotFound(state_key.to_string()));
            }

            let divergence = Divergence::detect(&candidates);
            let mut resolved = self
                .resolver
                .resolve(&candidates, sync.strategy)
                .ok_or_else(|| SwarmError::StateNotFound(state_key.to_string()))?;
            if divergence.divergent {
                resolved.version = divergence.max_version + 1;
                info!(
                    state_key,
                    candidates = candidates.len(),
                    version_gap = divergence.version_gap,
                    resolved_version = resolved.version,
                    "Divergent state resolved"
                );
            }

            let delivered = self
                .coordinator
                .broadcast_system(SwarmMessage::StateUpdate(resolved.clone()))
                .await;
            self.record(resolved.clone()).await;

            let (persisted, persist_error) = match self.provider.put(state_key, &resolved).await {
                Ok(()) => (true, None),
                Err(e) => {
                    warn!(state_key, error = %e, "Failed to persist resolved state");
                    self.coordinator
                        .event_bus()
                        .publish(SwarmEvent::PersistFailed {
                            state_key: state_key.to_string(),
                            error: e.to_string(),
                            timestamp: Utc::now(),
                        });
                    (false, Some(e.to_string()))
                }
            };

            let duration = started.elapsed();
            let duration_ms = duration.as_millis() as u64;
            otel::record_sync_result(
                &tracing::Span::current(),
                responders,
                divergence.divergent,
                resolved.version,
                duration_ms,
            );
            debug!(state_key, version = resolved.version, delivered, "State synchronized");
            self.coordinator
                .event_bus()
                .publish(SwarmEvent::StateSynchronized {
                    state_key: state_key.to_string(),
                    version: resolved.version,
                    responders,
                    divergent: divergence.divergent,
                    duration_ms,
                    timestamp: Utc::now(),
                });

            Ok(SyncReport {
                resolved,
                responders,
                required,
                divergent: divergence.divergent,
                version_gap: divergence.version_gap,
                delivered,
                persisted,
                persist_error,
                duration,
            })
        }
        .instrument(span)
        .await
    }

    /// Synchronize several keys concurrently
    pub async fn synchronize_all(
        &self,
        swarm_id: SwarmId,
        state_keys: &[String],
    ) -> Vec<(String, SwarmResult<StateVersion>)> {
        let runs = state_keys
            .iter()
            .map(|key| async move { (key.clone(), self.synchronize(swarm_id, key).await) });
        join_all(runs).await
    }

    /// Every key changed after `since_version`, resolved, ordered by key.
    ///
    /// Read-only: nothing is pushed to agents or persisted.
    pub async fn delta_sync(
        &self,
        swarm_id: SwarmId,
        since_version: u64,
    ) -> SwarmResult<Vec<StateVersion>> {
        self.check_swarm(swarm_id)?;
        let sync = &self.coordinator.config().sync;
        let participants = self.coordinator.active_agents().await;
        let required = sync.required_responders(participants.len());

        let collection = self
            .coordinator
            .collect_states(StateQuery::Since(since_version), &participants, sync.window())
            .await;
        let responders = collection.responses.len();
        if responders < required {
            return Err(SwarmError::SyncTimeout {
                state_key: format!("*>{}", since_version),
                responded: responders,
                required,
            });
        }

        let mut by_key: BTreeMap<String, Vec<StateVersion>> = BTreeMap::new();
        for version in collection.versions().filter(|v| v.version > since_version) {
            by_key
                .entry(version.state_key.clone())
                .or_default()
                .push(version.clone());
        }
        for (key, logged) in self.log.read().await.iter() {
            if logged.version > since_version {
                by_key.entry(key.clone()).or_default().push(logged.clone());
            }
        }

        let changes: Vec<StateVersion> = by_key
            .into_values()
            .filter_map(|versions| self.resolver.resolve(&versions, sync.strategy))
            .collect();
        debug!(since_version, responders, changes = changes.len(), "Delta sync");
        Ok(changes)
    }

    /// Keep the newest resolved version per key
    async fn record(&self, version: StateVersion) {
        let mut log = self.log.write().await;
        match log.get(&version.state_key) {
            Some(existing) if existing.version > version.version => {}
            _ => {
                log.insert(version.state_key.clone(), version);
            }
        }
    }
}

impl std::fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSynchronizer").finish_non_exhaustive()
    }
}
