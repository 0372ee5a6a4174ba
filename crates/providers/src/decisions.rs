use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// A single provider attempt record (§4.3 "observable side effects").
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub attempt: u32,
    pub outcome: DecisionOutcome,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Success,
    RateLimited,
    Error,
}

/// Thread-safe ring buffer of recent provider attempts.
///
/// Uses `parking_lot::Mutex` for low-overhead synchronisation. The buffer
/// evicts the oldest entry when it reaches capacity, keeping only the most
/// recent decisions for the `doctor`/diagnostics surface.
pub struct DecisionLog {
    inner: Mutex<VecDeque<Decision>>,
    capacity: usize,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a new decision. If the buffer is at capacity the oldest
    /// entry is evicted first.
    pub fn record(&self, decision: Decision) {
        let mut buf = self.inner.lock();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(decision);
    }

    /// Return the `limit` most recent decisions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Decision> {
        let buf = self.inner.lock();
        buf.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_decision(index: u64) -> Decision {
        Decision {
            timestamp: Utc::now(),
            provider: "primary".into(),
            model: "test-model".into(),
            attempt: 0,
            outcome: DecisionOutcome::Success,
            latency_ms: index,
        }
    }

    #[test]
    fn ring_buffer_stores_up_to_capacity() {
        let log = DecisionLog::new(3);
        for i in 0..5 {
            log.record(make_decision(i));
        }

        let recent = log.recent(10);
        assert_eq!(recent.len(), 3, "should keep at most 3 entries");
        assert_eq!(recent[0].latency_ms, 4);
        assert_eq!(recent[1].latency_ms, 3);
        assert_eq!(recent[2].latency_ms, 2);
    }

    #[test]
    fn ring_buffer_recent_respects_limit() {
        let log = DecisionLog::new(100);
        for i in 0..50 {
            log.record(make_decision(i));
        }

        let recent = log.recent(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].latency_ms, 49);
        assert_eq!(recent[4].latency_ms, 45);
    }

    #[test]
    fn ring_buffer_empty() {
        let log = DecisionLog::new(10);
        let recent = log.recent(5);
        assert!(recent.is_empty());
    }
}
