//! Per-session request accounting.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Sentinel for "not reported yet".
const UNKNOWN: i64 = -1;

/// Counters describing traffic on one session.
#[derive(Debug)]
pub struct ConnectionStats {
    requests_sent: AtomicU64,
    requests_failed: AtomicU64,
    bytes_received: AtomicU64,
    rate_limit_remaining: AtomicI64,
    rate_limit_reset: AtomicI64,
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Requests handed to the transport
    pub requests_sent: u64,
    /// Requests that failed in transport or were rejected
    pub requests_failed: u64,
    /// Response body bytes received
    pub bytes_received: u64,
    /// Remaining calls in the current rate limit window
    pub rate_limit_remaining: Option<i64>,
    /// Unix seconds when the window resets
    pub rate_limit_reset: Option<i64>,
}

impl ConnectionStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            rate_limit_remaining: AtomicI64::new(UNKNOWN),
            rate_limit_reset: AtomicI64::new(UNKNOWN),
        }
    }

    /// Records a request leaving.
    pub fn record_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed request.
    pub fn record_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a received body.
    pub fn record_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records the rate limit headers of a response.
    pub fn record_rate_limit(&self, remaining: Option<i64>, reset: Option<i64>) {
        if let Some(remaining) = remaining {
            self.rate_limit_remaining.store(remaining, Ordering::Relaxed);
        }
        if let Some(reset) = reset {
            self.rate_limit_reset.store(reset, Ordering::Relaxed);
        }
    }

    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let known = |v: i64| (v != UNKNOWN).then_some(v);
        StatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            rate_limit_remaining: known(self.rate_limit_remaining.load(Ordering::Relaxed)),
            rate_limit_reset: known(self.rate_limit_reset.load(Ordering::Relaxed)),
        }
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accounting() {
        let stats = ConnectionStats::new();
        assert_eq!(stats.snapshot().rate_limit_remaining, None);

        stats.record_sent();
        stats.record_sent();
        stats.record_failed();
        stats.record_received(200);
        stats.record_rate_limit(Some(14), None);

        let snap = stats.snapshot();
        assert_eq!(snap.requests_sent, 2);
        assert_eq!(snap.requests_failed, 1);
        assert_eq!(snap.bytes_received, 200);
        assert_eq!(snap.rate_limit_remaining, Some(14));
        assert_eq!(snap.rate_limit_reset, None);
    }
}
