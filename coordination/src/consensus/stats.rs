//! Per-algorithm outcome statistics

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ConsensusResult, Decision};

/// Running totals for one algorithm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmStats {
    /// Runs that produced a result
    pub count: u64,
    pub approved: u64,
    pub rejected: u64,
    pub timeouts: u64,
    /// Runs that ended in an error (precondition not met, task failure)
    pub errors: u64,
    pub total_duration: Duration,
}

impl AlgorithmStats {
    pub fn record(&mut self, result: &ConsensusResult) {
        self.count += 1;
        self.total_duration += result.duration;
        match result.decision {
            Decision::Approved => self.approved += 1,
            Decision::Rejected => self.rejected += 1,
            Decision::Timeout => self.timeouts += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Fraction of results that were approvals
    pub fn approval_rate(&self) -> Option<f64> {
        (self.count > 0).then(|| self.approved as f64 / self.count as f64)
    }

    pub fn mean_duration(&self) -> Option<Duration> {
        u32::try_from(self.count)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.total_duration / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlgorithmKind, ProposalId, VoteTally};

    fn result(decision: Decision, ms: u64) -> ConsensusResult {
        ConsensusResult::new(
            ProposalId::from("p"),
            AlgorithmKind::Quorum,
            decision,
            VoteTally::default(),
            Vec::new(),
        )
        .with_duration(Duration::from_millis(ms))
    }

    #[test]
    fn test_rates_and_means() {
        let mut stats = AlgorithmStats::default();
        assert_eq!(stats.approval_rate(), None);
        assert_eq!(stats.mean_duration(), None);

        stats.record(&result(Decision::Approved, 10));
        stats.record(&result(Decision::Approved, 20));
        stats.record(&result(Decision::Rejected, 30));
        stats.record(&result(Decision::Timeout, 40));
        stats.record_error();

        assert_eq!(stats.count, 4);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.approval_rate(), Some(0.5));
        assert_eq!(stats.mean_duration(), Some(Duration::from_millis(25)));
    }
}
