use std::time::Duration;

/// Exponential backoff for rate-limited requests: the delay before retry
/// `n` (0-based) is `base * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total requests allowed, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay: Duration::from_secs(1) }
    }
}

/// A `Retry-After` longer than this many times the longest computed delay
/// is clamped.
pub const RETRY_AFTER_CAP_FACTOR: u32 = 4;

impl Backoff {
    /// `max_retries` retries after the first request.
    pub fn with_retries(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_retries.saturating_add(1), base_delay }
    }

    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }

    /// Upper bound on any single wait, `Retry-After` included.
    pub fn max_delay(&self) -> Duration {
        self.delay(self.max_attempts.saturating_sub(2)).saturating_mul(RETRY_AFTER_CAP_FACTOR)
    }

    /// Delay to wait after failed attempt `attempt` (1-based), or `None`
    /// once attempts are exhausted. A server-provided `Retry-After` wins
    /// when it is longer, up to [`Self::max_delay`].
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let computed = self.delay(attempt.saturating_sub(1));
        Some(retry_after.map_or(computed, |ra| ra.min(self.max_delay()).max(computed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_attempts_run_out() {
        let b = Backoff { max_attempts: 4, base_delay: Duration::from_millis(100) };
        let delays: Vec<_> = (1..=4).map(|a| b.next_delay(a, None)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(200)),
                Some(Duration::from_millis(400)),
                None,
            ]
        );
    }

    #[test]
    fn longer_retry_after_wins() {
        let b = Backoff { max_attempts: 5, base_delay: Duration::from_millis(100) };
        assert_eq!(b.next_delay(1, Some(Duration::from_secs(2))), Some(Duration::from_secs(2)));
        assert_eq!(b.next_delay(3, Some(Duration::from_millis(10))), Some(Duration::from_millis(400)));
    }

    #[test]
    fn retry_after_is_clamped() {
        let b = Backoff { max_attempts: 5, base_delay: Duration::from_millis(100) };
        // longest computed wait is 800ms before the fifth attempt
        assert_eq!(b.max_delay(), Duration::from_millis(3200));
        assert_eq!(b.next_delay(1, Some(Duration::from_secs(3600))), Some(Duration::from_millis(3200)));
    }

    #[test]
    fn retries_count_after_the_first_request() {
        let b = Backoff::with_retries(2, Duration::from_millis(1));
        assert_eq!(b.max_attempts, 3);
        assert!(b.next_delay(2, None).is_some());
        assert!(b.next_delay(3, None).is_none());
        assert_eq!(Backoff::with_retries(0, Duration::from_millis(1)).next_delay(1, None), None);
    }
}
