use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::error::LiveError;

/// One scheduled reconnection attempt.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 1-based attempt counter
    pub attempt_number: u32,
    /// Delay that was (or will be) slept before redialing
    pub delay: Duration,
    /// When the attempt was recorded
    pub timestamp: DateTime<Utc>,
}

/// Observability snapshot of the backoff state.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStats {
    pub total_attempts: u32,
    pub remaining_attempts: u32,
    pub average_delay: Duration,
}

/// Exponential reconnect backoff: `base * 2^n` capped at `max_delay`.
///
/// With jitter disabled the delay sequence is exactly reproducible, which
/// the reconnect tests rely on.
#[derive(Debug)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    jitter: bool,
    attempts: u32,
    recorded_delays: Vec<Duration>,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32, jitter: bool) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            jitter,
            attempts: 0,
            recorded_delays: Vec::new(),
        }
    }

    pub fn from_config(cfg: &ConnectionConfig) -> Self {
        Self::new(
            Duration::from_millis(cfg.base_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
            cfg.max_attempts,
            cfg.jitter,
        )
    }

    /// Whether another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Delay the next attempt would use, without recording it.
    pub fn next_delay(&self) -> Result<Duration, LiveError> {
        if !self.can_retry() {
            return Err(LiveError::RetryExhausted {
                attempts: self.attempts,
            });
        }
        Ok(self.delay_for(self.attempts))
    }

    /// Record an attempt and return its schedule. Does not sleep.
    pub fn record_attempt(&mut self) -> RetryAttempt {
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        self.recorded_delays.push(delay);

        RetryAttempt {
            attempt_number: self.attempts,
            delay,
            timestamp: Utc::now(),
        }
    }

    /// Record an attempt, sleep its delay, then return the record.
    ///
    /// The only suspension point in this type. Callers that need
    /// cancellation wrap this in `tokio::select!`.
    pub async fn wait(&mut self) -> Result<RetryAttempt, LiveError> {
        if !self.can_retry() {
            return Err(LiveError::RetryExhausted {
                attempts: self.attempts,
            });
        }

        let attempt = self.record_attempt();
        tokio::time::sleep(attempt.delay).await;
        Ok(attempt)
    }

    /// Clear the attempt history for a fresh connection cycle.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.recorded_delays.clear();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn stats(&self) -> BackoffStats {
        let average_delay = if self.recorded_delays.is_empty() {
            Duration::ZERO
        } else {
            let total: Duration = self.recorded_delays.iter().sum();
            total / self.recorded_delays.len() as u32
        };

        BackoffStats {
            total_attempts: self.attempts,
            remaining_attempts: self.max_attempts.saturating_sub(self.attempts),
            average_delay,
        }
    }

    fn delay_for(&self, attempt_index: u32) -> Duration {
        // Shift saturates well before u64 overflow; the cap applies anyway.
        let factor = 1u64 << attempt_index.min(31);
        let base_ms = self.base_delay.as_millis() as u64;
        let capped = base_ms
            .saturating_mul(factor)
            .min(self.max_delay.as_millis() as u64);

        let ms = if self.jitter && capped > 0 {
            // +-25% spread
            let spread = capped / 4;
            let low = capped - spread;
            rand::thread_rng().gen_range(low..=capped + spread)
        } else {
            capped
        };

        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64, attempts: u32) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            attempts,
            false,
        )
    }

    #[test]
    fn test_delay_sequence_doubles_until_cap() {
        let mut p = policy(100, 1000, 6);

        let delays: Vec<u64> = (0..6)
            .map(|_| p.record_attempt().delay.as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_can_retry_boundary() {
        let mut p = policy(10, 100, 3);

        assert!(p.can_retry());
        p.record_attempt();
        p.record_attempt();
        assert!(p.can_retry());
        p.record_attempt();
        assert!(!p.can_retry(), "third attempt spends the budget");
    }

    #[test]
    fn test_next_delay_fails_when_exhausted() {
        let mut p = policy(10, 100, 1);
        p.record_attempt();

        match p.next_delay() {
            Err(LiveError::RetryExhausted { attempts }) => assert_eq!(attempts, 1),
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_clears_attempts() {
        let mut p = policy(10, 100, 2);
        p.record_attempt();
        p.record_attempt();
        assert!(!p.can_retry());

        p.reset();
        assert!(p.can_retry());
        assert_eq!(p.stats().total_attempts, 0);
        assert_eq!(p.record_attempt().delay, Duration::from_millis(10));
    }

    #[test]
    fn test_stats_average() {
        let mut p = policy(100, 10_000, 4);
        p.record_attempt(); // 100
        p.record_attempt(); // 200
        p.record_attempt(); // 400

        let stats = p.stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.remaining_attempts, 1);
        assert_eq!(stats.average_delay.as_millis(), 233);
    }

    #[test]
    fn test_attempt_numbers_are_one_based() {
        let mut p = policy(10, 100, 3);
        assert_eq!(p.record_attempt().attempt_number, 1);
        assert_eq!(p.record_attempt().attempt_number, 2);
    }

    #[tokio::test]
    async fn test_wait_returns_attempt_record() {
        let mut p = policy(1, 10, 2);

        let attempt = p.wait().await.unwrap();
        assert_eq!(attempt.attempt_number, 1);
        assert_eq!(attempt.delay, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_wait_fails_when_exhausted() {
        let mut p = policy(1, 10, 0);
        assert!(matches!(
            p.wait().await,
            Err(LiveError::RetryExhausted { .. })
        ));
    }
}
