//! Retry delay computation.

use std::time::Duration;

use rand::prelude::*;

/// Delay before retry number `attempt` (1-indexed attempt that just failed).
///
/// Doubles from `range.0` per attempt up to `range.1`, then subtracts up to
/// 20% jitter so concurrent retries spread out.
pub fn retry_delay(attempt: u32, range: (u64, u64)) -> Duration {
    let (base, cap) = range;
    let shift = attempt.saturating_sub(1).min(32);
    let exponential = base.saturating_mul(1u64 << shift).min(cap);

    let jitter = if exponential >= 5 {
        thread_rng().gen_range(0..=exponential / 5)
    } else {
        0
    };

    Duration::from_millis(exponential - jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within(delay: Duration, low: u64, high: u64) -> bool {
        let ms = delay.as_millis() as u64;
        low <= ms && ms <= high
    }

    #[test]
    fn test_first_retry_uses_base() {
        for _ in 0..50 {
            assert!(within(retry_delay(1, (1000, 60000)), 800, 1000));
        }
    }

    #[test]
    fn test_delay_doubles() {
        for _ in 0..50 {
            assert!(within(retry_delay(3, (1000, 60000)), 3200, 4000));
        }
    }

    #[test]
    fn test_delay_is_capped() {
        for _ in 0..50 {
            assert!(within(retry_delay(40, (1000, 60000)), 48000, 60000));
        }
    }

    #[test]
    fn test_zero_range() {
        assert_eq!(retry_delay(2, (0, 0)), Duration::ZERO);
    }
}
