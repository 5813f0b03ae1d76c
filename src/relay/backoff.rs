use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, the first one included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th consecutive failure: base, 2*base, 4*base ...
    /// capped at `max_delay`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Attempt counter for one operation (one delivery, one fetch).
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    next_retry_at: Option<Instant>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            next_retry_at: None,
        }
    }

    /// How long until the next attempt is allowed. Zero when no retry is
    /// pending.
    pub fn time_until_ready(&self, now: Instant) -> Duration {
        self.next_retry_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Start the next attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.next_retry_at = None;
        self.attempts
    }

    /// Record a transient failure of the current attempt. A server-provided
    /// `hint` wins when it is longer than the computed delay; both are
    /// capped at the policy maximum.
    pub fn record_failure(&mut self, now: Instant, hint: Option<Duration>) -> RetryDecision {
        if self.attempts >= self.policy.max_attempts {
            self.next_retry_at = None;
            return RetryDecision::GiveUp;
        }
        let computed = self.policy.delay_after(self.attempts);
        let delay = hint
            .map_or(computed, |h| h.max(computed))
            .min(self.policy.max_delay);
        self.next_retry_at = Some(now + delay);
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=8).map(|n| policy.delay_after(n)).collect();
        assert_eq!(
            delays,
            vec![secs(1), secs(2), secs(4), secs(8), secs(16), secs(32), secs(60), secs(60)]
        );
    }

    #[test]
    fn test_huge_attempt_counts_do_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(u32::MAX), secs(60));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut state = RetryState::new(RetryPolicy::default());
        let now = Instant::now();
        let mut decisions = Vec::new();
        for _ in 0..5 {
            state.begin_attempt();
            decisions.push(state.record_failure(now, None));
        }
        assert_eq!(
            decisions,
            vec![
                RetryDecision::RetryAfter(secs(1)),
                RetryDecision::RetryAfter(secs(2)),
                RetryDecision::RetryAfter(secs(4)),
                RetryDecision::RetryAfter(secs(8)),
                RetryDecision::GiveUp,
            ]
        );
        assert_eq!(state.attempts, 5);
    }

    #[test]
    fn test_hint_extends_but_never_exceeds_cap() {
        let mut state = RetryState::new(RetryPolicy::default());
        let now = Instant::now();
        state.begin_attempt();
        assert_eq!(
            state.record_failure(now, Some(secs(7))),
            RetryDecision::RetryAfter(secs(7))
        );
        state.begin_attempt();
        // Shorter hint than the computed 2s is ignored.
        assert_eq!(
            state.record_failure(now, Some(Duration::from_millis(100))),
            RetryDecision::RetryAfter(secs(2))
        );
        state.begin_attempt();
        assert_eq!(
            state.record_failure(now, Some(secs(600))),
            RetryDecision::RetryAfter(secs(60))
        );
    }

    #[test]
    fn test_time_until_ready() {
        let mut state = RetryState::new(RetryPolicy::default());
        let now = Instant::now();
        assert_eq!(state.time_until_ready(now), Duration::ZERO);
        state.begin_attempt();
        state.record_failure(now, None);
        assert_eq!(state.next_retry_at, Some(now + secs(1)));
        assert_eq!(state.time_until_ready(now), secs(1));
        assert_eq!(state.time_until_ready(now + Duration::from_millis(400)), Duration::from_millis(600));
        assert_eq!(state.time_until_ready(now + secs(5)), Duration::ZERO);
        state.begin_attempt();
        assert_eq!(state.time_until_ready(now), Duration::ZERO);
    }
}
