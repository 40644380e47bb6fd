//! Reconnect pacing for the event source engine.
//!
//! A policy sees the attempt number, the previous delay, and any server
//! hint (`Retry-After` header or SSE `retry:` field) and decides whether
//! and when to reconnect.

use std::time::Duration;

/// Reconnect policy contract.
pub trait BackoffPolicy: Send + Sync {
    /// Delay before reconnect attempt `attempt` (1-based).
    fn next_delay(
        &self,
        attempt: u32,
        previous_delay: Duration,
        server_hint: Option<Duration>,
    ) -> Duration;

    /// Whether to reconnect at all for this attempt.
    fn should_reconnect(
        &self,
        attempt: u32,
        previous_delay: Duration,
        server_hint: Option<Duration>,
    ) -> bool {
        let _ = (attempt, previous_delay, server_hint);
        true
    }
}

/// Fixed delay between attempts; a server hint overrides the delay.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self { delay: Duration::from_secs(1) }
    }
}

impl BackoffPolicy for FixedBackoff {
    fn next_delay(
        &self,
        _attempt: u32,
        _previous_delay: Duration,
        server_hint: Option<Duration>,
    ) -> Duration {
        server_hint.unwrap_or(self.delay)
    }
}

/// Exponential backoff with a cap and deterministic jitter; a server
/// hint overrides the computed delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base delay in milliseconds for the first attempt.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor in `[0.0, 1.0]`.
    pub jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self { base_delay_ms: 500, max_delay_ms: 30_000, jitter_factor: 0.1 }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(
        &self,
        attempt: u32,
        _previous_delay: Duration,
        server_hint: Option<Duration>,
    ) -> Duration {
        if let Some(hint) = server_hint {
            return hint;
        }
        let exponent = attempt.saturating_sub(1).min(10);
        let delay_ms = self.base_delay_ms.saturating_mul(1 << exponent);
        let capped_ms = delay_ms.min(self.max_delay_ms);

        let jitter_range = (capped_ms as f64 * self.jitter_factor) as u64;
        let jittered_ms = if jitter_range > 0 {
            // Deterministic jitter based on the attempt number.
            capped_ms.saturating_add((attempt as u64 * 7) % jitter_range)
        } else {
            capped_ms
        };
        Duration::from_millis(jittered_ms)
    }
}

/// Never reconnects: the first failure is terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReconnect;

impl BackoffPolicy for NeverReconnect {
    fn next_delay(
        &self,
        _attempt: u32,
        _previous_delay: Duration,
        _server_hint: Option<Duration>,
    ) -> Duration {
        Duration::ZERO
    }

    fn should_reconnect(
        &self,
        _attempt: u32,
        _previous_delay: Duration,
        _server_hint: Option<Duration>,
    ) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_honors_hint() {
        let policy = FixedBackoff::default();
        assert_eq!(policy.next_delay(1, Duration::ZERO, None), Duration::from_secs(1));
        assert_eq!(
            policy.next_delay(1, Duration::ZERO, Some(Duration::from_millis(2500))),
            Duration::from_millis(2500)
        );
        assert!(policy.should_reconnect(99, Duration::ZERO, None));
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let policy =
            ExponentialBackoff { base_delay_ms: 100, max_delay_ms: 350, jitter_factor: 0.0 };
        assert_eq!(policy.next_delay(1, Duration::ZERO, None), Duration::from_millis(100));
        assert_eq!(policy.next_delay(2, Duration::ZERO, None), Duration::from_millis(200));
        assert_eq!(policy.next_delay(3, Duration::ZERO, None), Duration::from_millis(350));
        assert_eq!(policy.next_delay(8, Duration::ZERO, None), Duration::from_millis(350));
    }

    #[test]
    fn test_exponential_hint_overrides() {
        let policy = ExponentialBackoff::default();
        assert_eq!(
            policy.next_delay(5, Duration::ZERO, Some(Duration::from_millis(42))),
            Duration::from_millis(42)
        );
    }

    #[test]
    fn test_exponential_jitter_bounded() {
        let policy =
            ExponentialBackoff { base_delay_ms: 1000, max_delay_ms: 60_000, jitter_factor: 0.5 };
        for attempt in 1..6 {
            let base = 1000u64 << (attempt - 1);
            let delay = policy.next_delay(attempt as u32, Duration::ZERO, None);
            assert!(delay >= Duration::from_millis(base));
            assert!(delay < Duration::from_millis(base + base / 2 + 1));
        }
    }

    #[test]
    fn test_never_reconnect() {
        let policy = NeverReconnect;
        assert!(!policy.should_reconnect(1, Duration::ZERO, None));
    }
}
