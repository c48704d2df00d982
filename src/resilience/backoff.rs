//! Delay between retry attempts.

use rand::Rng;
use std::time::Duration;

use crate::config::BackoffStrategy;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` counts failed attempts so far, starting at 1.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Delay after the `attempt`-th failure under `strategy`.
pub fn delay_for(strategy: BackoffStrategy, attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    match strategy {
        BackoffStrategy::Fixed => Duration::from_millis(base_ms),
        BackoffStrategy::Exponential => calculate_backoff(attempt, base_ms, max_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);
    }

    #[test]
    fn test_fixed_ignores_attempt() {
        for attempt in 1..5 {
            assert_eq!(
                delay_for(BackoffStrategy::Fixed, attempt, 1000, 10_000),
                Duration::from_millis(1000)
            );
        }
    }
}
