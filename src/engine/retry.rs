use crate::config::RetryConfig;
use std::time::Duration;

/// Bounded exponential backoff for transient source conflicts
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.initial_delay(),
            max: config.max_delay(),
            multiplier: config.multiplier.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, for tests and local snapshots
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff {
            current: self.base,
            max: self.max,
            multiplier: self.multiplier,
        }
    }
}

pub(crate) struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_exponentially_grows() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base: Duration::from_millis(10),
            max: Duration::from_millis(40),
            multiplier: 2.0,
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20));
        assert_eq!(backoff.next_delay(), Duration::from_millis(40));
        assert_eq!(backoff.next_delay(), Duration::from_millis(40));
    }

    #[test]
    fn policy_from_config() {
        let config = RetryConfig {
            max_attempts: 0,
            initial_delay_ms: 5,
            max_delay_ms: 50,
            multiplier: 0.5,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base, Duration::from_millis(5));
        assert_eq!(policy.multiplier, 1.0);
    }

    #[test]
    fn immediate_never_sleeps() {
        let mut backoff = RetryPolicy::immediate(3).backoff();
        assert_eq!(backoff.next_delay(), Duration::ZERO);
        assert_eq!(backoff.next_delay(), Duration::ZERO);
    }
}
