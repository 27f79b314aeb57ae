//! Capped exponential backoff

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::constants::{BASE_DELAY, MAX_DELAY};

/// Exponential backoff: `min(base * 2^retry_index, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    /// Upper bound for any single delay.
    #[serde(with = "humantime_serde")]
    pub cap: Duration,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            base: BASE_DELAY,
            cap: MAX_DELAY,
        }
    }
}

impl BackoffSchedule {
    /// Schedule with the given base and ceiling.
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before retry number `retry_index` (0-based). Saturates at the cap
    /// for any index, however large.
    pub fn delay(&self, retry_index: u32) -> Duration {
        2u32.checked_pow(retry_index)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Total sleep spent across `retries` retries.
    pub fn total(&self, retries: u32) -> Duration {
        (0..retries).map(|i| self.delay(i)).sum()
    }
}

/// Default schedule: 1s, 2s, 4s, 8s, 8s, ...
pub fn retry_delay(retry_index: u32) -> Duration {
    BackoffSchedule::default().delay(retry_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1000)]
    #[case(1, 2000)]
    #[case(2, 4000)]
    #[case(3, 8000)]
    #[case(4, 8000)]
    #[case(31, 8000)]
    #[case(32, 8000)]
    #[case(u32::MAX, 8000)]
    fn default_schedule(#[case] index: u32, #[case] millis: u64) {
        assert_eq!(retry_delay(index), Duration::from_millis(millis));
    }

    #[test]
    fn total_of_three_retries() {
        assert_eq!(
            BackoffSchedule::default().total(3),
            Duration::from_millis(7000)
        );
    }

    proptest! {
        #[test]
        fn delay_is_monotonic_and_capped(index in 0u32..200) {
            let schedule = BackoffSchedule::default();
            let current = schedule.delay(index);
            let next = schedule.delay(index + 1);
            prop_assert!(next >= current);
            prop_assert!(current <= schedule.cap);
            prop_assert!(current >= schedule.base);
        }

        #[test]
        fn custom_schedule_never_exceeds_cap(
            base_ms in 1u64..5_000,
            extra_ms in 0u64..60_000,
            index in 0u32..64,
        ) {
            let schedule = BackoffSchedule::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(base_ms + extra_ms),
            );
            prop_assert!(schedule.delay(index) <= schedule.cap);
        }
    }
}
