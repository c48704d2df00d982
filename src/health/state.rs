//! Chain RPC health state machine.
//!
//! # State Transitions
//! ```text
//! Unknown/Healthy → Unhealthy: consecutive failures >= unhealthy_threshold
//! Unknown/Unhealthy → Healthy: consecutive successes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - Unknown counts as healthy until the first verdict
//! - Counters reset on state transition

use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Point-in-time view for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Latest block seen by the last successful probe.
    pub latest_block: Option<u64>,
}

#[derive(Debug)]
pub struct HealthTracker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    /// 0 until the first successful probe.
    latest_block: AtomicU64,
    healthy_threshold: u32,
    unhealthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(healthy_threshold: u32, unhealthy_threshold: u32) -> Self {
        Self {
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            latest_block: AtomicU64::new(0),
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    pub fn state(&self) -> HealthState {
        self.state.load(Ordering::Relaxed).into()
    }

    /// True when Healthy or Unknown.
    pub fn is_healthy(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    /// Report a successful probe. Returns true on a transition to Healthy.
    pub fn mark_success(&self, latest_block: u64) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.latest_block.store(latest_block, Ordering::Relaxed);

        if self.state() == HealthState::Healthy {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= self.healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Report a failed probe. Returns true on a transition to Unhealthy.
    pub fn mark_failure(&self) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.state() == HealthState::Unhealthy {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let latest_block = self.latest_block.load(Ordering::Relaxed);
        HealthSnapshot {
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            consecutive_successes: self.consecutive_successes.load(Ordering::Relaxed),
            latest_block: (latest_block > 0).then_some(latest_block),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_is_healthy() {
        let tracker = HealthTracker::new(2, 3);
        assert_eq!(tracker.state(), HealthState::Unknown);
        assert!(tracker.is_healthy());
        assert_eq!(tracker.snapshot().latest_block, None);
    }

    #[test]
    fn test_hysteresis() {
        let tracker = HealthTracker::new(2, 3);

        assert!(!tracker.mark_failure());
        assert!(!tracker.mark_failure());
        assert!(tracker.mark_failure());
        assert_eq!(tracker.state(), HealthState::Unhealthy);

        // One success is not enough to recover
        assert!(!tracker.mark_success(100));
        assert!(!tracker.is_healthy());
        assert!(tracker.mark_success(101));
        assert_eq!(tracker.state(), HealthState::Healthy);
        assert_eq!(tracker.snapshot().latest_block, Some(101));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let tracker = HealthTracker::new(1, 2);
        tracker.mark_success(1);
        tracker.mark_failure();
        tracker.mark_success(2);
        assert!(!tracker.mark_failure());
        assert!(tracker.is_healthy());
    }
}
