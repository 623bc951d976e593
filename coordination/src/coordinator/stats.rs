//! Message rate and delivery latency tracking

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Sliding window for the message rate
const RATE_WINDOW: Duration = Duration::from_secs(1);
/// Weight of the newest sample in the latency average
const LATENCY_ALPHA: f64 = 0.2;

#[derive(Debug, Default)]
struct StatsInner {
    sent: VecDeque<Instant>,
    total_sent: u64,
    total_received: u64,
    ewma_latency_us: Option<f64>,
}

/// Counters feeding adaptive topology evaluation
#[derive(Debug, Default)]
pub struct MessageStats {
    inner: Mutex<StatsInner>,
}

impl MessageStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_sent(&self, at: Instant) {
        let mut inner = self.lock();
        inner.sent.push_back(at);
        inner.total_sent += 1;
        while let Some(front) = inner.sent.front() {
            if at.saturating_duration_since(*front) > RATE_WINDOW {
                inner.sent.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record_delivery(&self, latency: Duration) {
        let mut inner = self.lock();
        inner.total_received += 1;
        let sample = latency.as_secs_f64() * 1e6;
        inner.ewma_latency_us = Some(match inner.ewma_latency_us {
            None => sample,
            Some(prev) => prev + LATENCY_ALPHA * (sample - prev),
        });
    }

    /// Messages per second over the last window
    pub fn rate(&self, now: Instant) -> f64 {
        let inner = self.lock();
        let recent = inner
            .sent
            .iter()
            .filter(|t| now.saturating_duration_since(**t) <= RATE_WINDOW)
            .count();
        recent as f64 / RATE_WINDOW.as_secs_f64()
    }

    /// Smoothed mailbox latency; zero before the first delivery
    pub fn avg_latency(&self) -> Duration {
        self.lock()
            .ewma_latency_us
            .map(|us| Duration::from_secs_f64(us.max(0.0) / 1e6))
            .unwrap_or_default()
    }

    pub fn snapshot(&self, now: Instant) -> MessageStatsSnapshot {
        let rate = self.rate(now);
        let avg_latency = self.avg_latency();
        let inner = self.lock();
        MessageStatsSnapshot {
            total_sent: inner.total_sent,
            total_received: inner.total_received,
            message_rate: rate,
            avg_latency,
        }
    }
}

/// Point-in-time view of message statistics
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MessageStatsSnapshot {
    pub total_sent: u64,
    pub total_received: u64,
    pub message_rate: f64,
    pub avg_latency: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_uses_sliding_window() {
        let stats = MessageStats::new();
        let start = Instant::now();
        for i in 0..50 {
            stats.record_sent(start + Duration::from_millis(i * 10));
        }
        let end = start + Duration::from_millis(490);
        assert_eq!(stats.rate(end), 50.0);
        assert_eq!(stats.rate(end + Duration::from_secs(5)), 0.0);
        assert_eq!(stats.snapshot(end).total_sent, 50);
    }

    #[test]
    fn test_latency_is_smoothed() {
        let stats = MessageStats::new();
        assert_eq!(stats.avg_latency(), Duration::ZERO);
        stats.record_delivery(Duration::from_millis(10));
        assert_eq!(stats.avg_latency(), Duration::from_millis(10));
        stats.record_delivery(Duration::from_millis(20));
        let avg = stats.avg_latency();
        assert!(avg > Duration::from_millis(11) && avg < Duration::from_millis(13));
    }
}
