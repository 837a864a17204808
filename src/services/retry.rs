use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Bounds how often the upload loop resumes after a transient failure.
///
/// Each 500/503 while sending counts as one attempt. The delay before the
/// n-th status query is `initial_backoff * 2^(n-1)`, capped at `max_backoff`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Whether the `attempt`-th transient failure (1-based) may still be resumed.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay to wait after the `attempt`-th transient failure (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let p = policy();
        assert_eq!(p.backoff_for(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for(3), Duration::from_millis(400));
        assert_eq!(p.backoff_for(4), Duration::from_millis(800));
        assert_eq!(p.backoff_for(5), Duration::from_millis(1000));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        let p = RetryPolicy {
            max_backoff: Duration::MAX,
            ..policy()
        };
        assert_eq!(p.backoff_for(u32::MAX), Duration::from_millis(100) * (1u32 << 31));
        assert_eq!(policy().backoff_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn attempt_budget() {
        let p = policy();
        assert!(p.allows(1));
        assert!(p.allows(3));
        assert!(!p.allows(4));

        let none = RetryPolicy {
            max_attempts: 0,
            ..policy()
        };
        assert!(!none.allows(1));
    }

    #[test]
    fn zero_backoff_stays_zero() {
        let p = RetryPolicy {
            initial_backoff: Duration::ZERO,
            ..policy()
        };
        assert_eq!(p.backoff_for(7), Duration::ZERO);
    }
}
