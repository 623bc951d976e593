//! Swarm configuration
//!
//! Every field has a default, can be overridden by a `SWARM_*` environment
//! variable, and can be loaded from TOML. Durations are stored as
//! milliseconds so the TOML form stays flat.
//!
//! ```toml
//! topology = "mesh"
//! heartbeat_interval_ms = 1000
//!
//! [raft]
//! election_timeout_ms = 150
//!
//! [gossip]
//! fanout = 3
//! seed = 7
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SwarmError, SwarmResult};
use crate::resolver::ResolutionStrategy;
use crate::topology::{TopologyKind, DEFAULT_BRANCHING};

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Top-level configuration for one swarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Initial topology strategy
    pub topology: TopologyKind,
    /// Fan-out of the hierarchical tree
    pub branching_factor: usize,
    /// Expected heartbeat period; health degrades at 1×, 2×, 3× this interval
    pub heartbeat_interval_ms: u64,
    /// How often the background monitor scans heartbeats
    pub heartbeat_scan_interval_ms: u64,
    /// Bounded mailbox size per agent
    pub mailbox_capacity: usize,
    /// Timeout applied when a caller does not pass one
    pub default_consensus_timeout_ms: u64,
    pub raft: RaftConfig,
    pub byzantine: ByzantineConfig,
    pub gossip: GossipConfig,
    pub sync: SyncConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            topology: TopologyKind::Mesh,
            branching_factor: DEFAULT_BRANCHING,
            heartbeat_interval_ms: 1_000,
            heartbeat_scan_interval_ms: 1_000,
            mailbox_capacity: 256,
            default_consensus_timeout_ms: 5_000,
            raft: RaftConfig::default(),
            byzantine: ByzantineConfig::default(),
            gossip: GossipConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl SwarmConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `SWARM_*` environment variables onto this config.
    /// Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(kind) = env_parse::<TopologyKind>("SWARM_TOPOLOGY") {
            self.topology = kind;
        }
        if let Some(n) = env_parse("SWARM_BRANCHING_FACTOR") {
            self.branching_factor = n;
        }
        if let Some(ms) = env_parse("SWARM_HEARTBEAT_INTERVAL_MS") {
            self.heartbeat_interval_ms = ms;
        }
        if let Some(ms) = env_parse("SWARM_HEARTBEAT_SCAN_INTERVAL_MS") {
            self.heartbeat_scan_interval_ms = ms;
        }
        if let Some(n) = env_parse("SWARM_MAILBOX_CAPACITY") {
            self.mailbox_capacity = n;
        }
        if let Some(ms) = env_parse("SWARM_CONSENSUS_TIMEOUT_MS") {
            self.default_consensus_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("SWARM_RAFT_ELECTION_TIMEOUT_MS") {
            self.raft.election_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("SWARM_RAFT_HEARTBEAT_INTERVAL_MS") {
            self.raft.heartbeat_interval_ms = ms;
        }
        if let Some(seed) = env_parse("SWARM_RAFT_SEED") {
            self.raft.seed = Some(seed);
        }
        if let Some(f) = env_parse("SWARM_BYZANTINE_FAULT_TOLERANCE") {
            self.byzantine.fault_tolerance = Some(f);
        }
        if let Some(n) = env_parse("SWARM_GOSSIP_FANOUT") {
            self.gossip.fanout = n;
        }
        if let Some(n) = env_parse("SWARM_GOSSIP_MAX_ROUNDS") {
            self.gossip.max_rounds = n;
        }
        if let Some(t) = env_parse("SWARM_GOSSIP_CONVERGENCE_THRESHOLD") {
            self.gossip.convergence_threshold = t;
        }
        if let Some(seed) = env_parse("SWARM_GOSSIP_SEED") {
            self.gossip.seed = Some(seed);
        }
        if let Some(q) = env_parse("SWARM_SYNC_QUORUM") {
            self.sync.sync_quorum = q;
        }
        if let Some(ms) = env_parse("SWARM_SYNC_WINDOW_MS") {
            self.sync.window_ms = ms;
        }
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(s: &str) -> SwarmResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| SwarmError::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> SwarmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SwarmError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SwarmResult<()> {
        if self.branching_factor == 0 {
            return Err(SwarmError::config("branching_factor must be at least 1"));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_scan_interval_ms == 0 {
            return Err(SwarmError::config("heartbeat intervals must be non-zero"));
        }
        if self.mailbox_capacity == 0 {
            return Err(SwarmError::config("mailbox_capacity must be non-zero"));
        }
        if self.default_consensus_timeout_ms == 0 {
            return Err(SwarmError::config("default_consensus_timeout_ms must be non-zero"));
        }
        self.raft.validate()?;
        self.byzantine.validate()?;
        self.gossip.validate()?;
        self.sync.validate()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_scan_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_scan_interval_ms)
    }

    pub fn default_consensus_timeout(&self) -> Duration {
        Duration::from_millis(self.default_consensus_timeout_ms)
    }
}

/// Raft timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Base election timeout; each node draws from `[base, 2·base)`
    pub election_timeout_ms: u64,
    /// Leader heartbeat period; must be well below the election timeout
    pub heartbeat_interval_ms: u64,
    /// Period of the background ticker and of leader polling in `propose`
    pub tick_interval_ms: u64,
    /// Fixed seed for election timeouts
    pub seed: Option<u64>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_ms: 150,
            heartbeat_interval_ms: 50,
            tick_interval_ms: 10,
            seed: None,
        }
    }
}

impl RaftConfig {
    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    /// Upper bound of the randomized election timeout
    pub fn election_timeout_max(&self) -> Duration {
        self.election_timeout() * 2
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn validate(&self) -> SwarmResult<()> {
        if self.election_timeout_ms == 0 || self.heartbeat_interval_ms == 0 || self.tick_interval_ms == 0 {
            return Err(SwarmError::config("raft intervals must be non-zero"));
        }
        if self.heartbeat_interval_ms >= self.election_timeout_ms {
            return Err(SwarmError::config(
                "raft heartbeat_interval_ms must be below election_timeout_ms",
            ));
        }
        Ok(())
    }
}

/// Byzantine voting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByzantineConfig {
    /// Tolerated faulty agents; derived as `(n - 1) / 3` when unset
    pub fault_tolerance: Option<usize>,
    /// Voting rounds used to detect equivocation
    pub rounds: u32,
}

impl Default for ByzantineConfig {
    fn default() -> Self {
        Self {
            fault_tolerance: None,
            rounds: 3,
        }
    }
}

impl ByzantineConfig {
    fn validate(&self) -> SwarmResult<()> {
        if self.rounds < 2 {
            return Err(SwarmError::config("byzantine rounds must be at least 2"));
        }
        Ok(())
    }
}

/// Gossip propagation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    pub fanout: usize,
    pub max_rounds: u32,
    /// Fraction of agents that must hold the modal decision
    pub convergence_threshold: f64,
    /// Fixed RNG seed for reproducible peer selection
    pub seed: Option<u64>,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            max_rounds: 5,
            convergence_threshold: 0.95,
            seed: None,
        }
    }
}

impl GossipConfig {
    fn validate(&self) -> SwarmResult<()> {
        if self.fanout == 0 || self.max_rounds == 0 {
            return Err(SwarmError::config("gossip fanout and max_rounds must be non-zero"));
        }
        if !(self.convergence_threshold > 0.0 && self.convergence_threshold <= 1.0) {
            return Err(SwarmError::config(format!(
                "gossip convergence_threshold {} outside (0, 1]",
                self.convergence_threshold
            )));
        }
        Ok(())
    }
}

/// State synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fraction of active agents that must respond
    pub sync_quorum: f64,
    /// Response collection window
    pub window_ms: u64,
    pub strategy: ResolutionStrategy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_quorum: 0.5,
            window_ms: 2_000,
            strategy: ResolutionStrategy::CrdtAware,
        }
    }
}

impl SyncConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Responders needed out of `active` agents
    pub fn required_responders(&self, active: usize) -> usize {
        if active == 0 {
            return 0;
        }
        ((self.sync_quorum * active as f64).ceil() as usize).clamp(1, active)
    }

    fn validate(&self) -> SwarmResult<()> {
        if !(self.sync_quorum > 0.0 && self.sync_quorum <= 1.0) {
            return Err(SwarmError::config(format!(
                "sync_quorum {} outside (0, 1]",
                self.sync_quorum
            )));
        }
        if self.window_ms == 0 {
            return Err(SwarmError::config("sync window_ms must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SwarmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gossip.fanout, 3);
        assert_eq!(config.gossip.max_rounds, 5);
        assert_eq!(config.heartbeat_scan_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SwarmConfig::from_toml_str(
            r#"
            topology = "ring"
            heartbeat_interval_ms = 250

            [gossip]
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.topology, TopologyKind::Ring);
        assert_eq!(config.heartbeat_interval_ms, 250);
        assert_eq!(config.gossip.seed, Some(42));
        assert_eq!(config.gossip.fanout, 3);
        assert_eq!(config.raft, RaftConfig::default());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = SwarmConfig::default();
        config.sync.sync_quorum = 1.5;
        assert!(matches!(config.validate(), Err(SwarmError::Config { .. })));

        let mut config = SwarmConfig::default();
        config.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.raft.heartbeat_interval_ms = config.raft.election_timeout_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_required_responders() {
        let sync = SyncConfig::default();
        assert_eq!(sync.required_responders(0), 0);
        assert_eq!(sync.required_responders(1), 1);
        assert_eq!(sync.required_responders(5), 3);
        assert_eq!(sync.required_responders(4), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        std::fs::write(&path, "branching_factor = 4\n[sync]\nsync_quorum = 0.75\n").unwrap();

        let config = SwarmConfig::load(&path).unwrap();
        assert_eq!(config.branching_factor, 4);
        assert_eq!(config.sync.sync_quorum, 0.75);

        assert!(SwarmConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
