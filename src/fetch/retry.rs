//! Retry policy for reads

use std::time::Duration;

use crate::error::FetchError;

/// How many times a read is attempted and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt; doubles for each one after
    pub base_delay: Duration,
    /// Whether 4xx answers (other than 408/429) are retried like any other failure
    pub retry_client_errors: bool,
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and base delay
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
            retry_client_errors: true,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Set whether client errors are retried
    pub fn with_client_error_retries(mut self, enabled: bool) -> Self {
        self.retry_client_errors = enabled;
        self
    }

    /// Total attempts, never less than one
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed)
    ///
    /// `base_delay * 2^(attempt - 1)`, saturating instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(multiplier)
    }

    /// Whether another attempt should follow failed attempt `attempt`
    pub fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        if attempt >= self.max_attempts() {
            return false;
        }
        match error {
            FetchError::Cancelled | FetchError::Encode(_) => false,
            err if err.is_client_error() => self.retry_client_errors,
            _ => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> FetchError {
        FetchError::Http {
            status,
            status_text: String::new(),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert!(policy.retry_client_errors);
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(100, Duration::MAX / 2);
        assert_eq!(policy.delay_after(3), Duration::MAX);
        assert_eq!(policy.delay_after(80), Duration::MAX);
    }

    #[test]
    fn test_should_retry_stops_at_attempt_limit() {
        let policy = RetryPolicy::default();
        let err = http(500);
        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 2));
        assert!(!policy.should_retry(&err, 3));
    }

    #[test]
    fn test_client_errors_follow_policy_flag() {
        let uniform = RetryPolicy::default();
        assert!(uniform.should_retry(&http(404), 1));

        let strict = RetryPolicy::default().with_client_error_retries(false);
        assert!(!strict.should_retry(&http(404), 1));
        assert!(!strict.should_retry(&http(401), 1));
        assert!(strict.should_retry(&http(429), 1));
        assert!(strict.should_retry(&http(503), 1));
    }

    #[test]
    fn test_cancelled_is_never_retried() {
        assert!(!RetryPolicy::default().should_retry(&FetchError::Cancelled, 1));
    }

    #[test]
    fn test_zero_attempts_still_makes_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(&http(500), 1));
    }
}
