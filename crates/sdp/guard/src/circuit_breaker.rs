//! Process-wide circuit breaker for deployments.
//!
//! After `failure_threshold` failed attempts the breaker opens and every new
//! attempt is refused. It resets on its own once `reset_timeout` has passed
//! since the *last* failure; the reset happens lazily inside
//! [`CircuitBreaker::allow_attempt`]. Any success closes it immediately.
//!
//! All mutations happen under one mutex so concurrent callers never lose an
//! update.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use sdp_types::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::Result;

#[derive(Debug, Default)]
struct BreakerInner {
    failure_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the breaker, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub open: bool,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    /// When an open breaker will next admit an attempt.
    pub resets_at: Option<DateTime<Utc>>,
}

/// Global guard against repeated deployment failures.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(BreakerInner::default()),
            clock,
        })
    }

    fn reset_timeout(&self) -> Duration {
        Duration::seconds(i64::try_from(self.config.reset_timeout_secs).unwrap_or(i64::MAX))
    }

    /// Whether a new attempt may start. Resets an open breaker whose
    /// timeout has elapsed.
    pub fn allow_attempt(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.failure_count < self.config.failure_threshold {
            return true;
        }

        let now = self.clock.now();
        let elapsed = inner
            .last_failure_at
            .map(|at| now - at)
            .unwrap_or_else(Duration::zero);

        if elapsed >= self.reset_timeout() {
            info!(
                failures = inner.failure_count,
                elapsed_secs = elapsed.num_seconds(),
                "Circuit breaker reset after timeout"
            );
            *inner = BreakerInner::default();
            true
        } else {
            debug!(
                failures = inner.failure_count,
                "Circuit breaker open, refusing attempt"
            );
            false
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(now);

        if inner.failure_count == self.config.failure_threshold {
            inner.opened_at = Some(now);
            warn!(
                failures = inner.failure_count,
                reset_timeout_secs = self.config.reset_timeout_secs,
                "Circuit breaker opening due to failures"
            );
        } else {
            debug!(failures = inner.failure_count, "Deployment failure recorded");
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.failure_count > 0 {
            info!(
                previous_failures = inner.failure_count,
                "Circuit breaker closed after success"
            );
        }
        *inner = BreakerInner::default();
    }

    /// Force the breaker closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(failures = inner.failure_count, "Circuit breaker reset by operator");
        *inner = BreakerInner::default();
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn state(&self) -> CircuitBreakerState {
        let inner = self.inner.lock();
        let tripped = inner.failure_count >= self.config.failure_threshold;
        let resets_at = if tripped {
            inner.last_failure_at.map(|at| at + self.reset_timeout())
        } else {
            None
        };
        let open = resets_at.map(|at| self.clock.now() < at).unwrap_or(false);
        CircuitBreakerState {
            open,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_at: inner.last_failure_at,
            opened_at: inner.opened_at,
            resets_at,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sdp_types::ManualClock;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout_secs: 300,
        }
    }

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cb = CircuitBreaker::with_clock(test_config(), clock.clone()).unwrap();
        (cb, clock)
    }

    #[test]
    fn initially_closed() {
        let (cb, _) = breaker();
        assert!(cb.allow_attempt());
        assert!(!cb.is_open());
    }

    #[test]
    fn opens_after_threshold() {
        let (cb, _) = breaker();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow_attempt());
        cb.record_failure();
        assert!(!cb.allow_attempt());
        assert!(cb.is_open());
        assert!(cb.state().opened_at.is_some());
    }

    #[test]
    fn resets_after_timeout_since_last_failure() {
        let (cb, clock) = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        clock.advance(Duration::seconds(299));
        assert!(!cb.allow_attempt());

        clock.advance(Duration::seconds(1));
        assert!(cb.allow_attempt());
        assert_eq!(cb.state().failure_count, 0);
    }

    #[test]
    fn failure_while_open_extends_cooldown() {
        let (cb, clock) = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        clock.advance(Duration::seconds(200));
        cb.record_failure();
        clock.advance(Duration::seconds(200));
        assert!(!cb.allow_attempt());
        clock.advance(Duration::seconds(100));
        assert!(cb.allow_attempt());
    }

    #[test]
    fn success_clears_failures() {
        let (cb, _) = breaker();
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow_attempt());
    }

    #[test]
    fn operator_reset() {
        let (cb, _) = breaker();
        for _ in 0..3 {
            cb.record_failure();
        }
        cb.reset();
        assert!(cb.allow_attempt());
    }

    #[test]
    fn concurrent_failures_are_not_lost() {
        let clock = Arc::new(ManualClock::default());
        let cb = Arc::new(
            CircuitBreaker::with_clock(
                CircuitBreakerConfig {
                    failure_threshold: 1000,
                    reset_timeout_secs: 60,
                },
                clock,
            )
            .unwrap(),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cb.record_failure();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.state().failure_count, 400);
    }

    proptest! {
        #[test]
        fn refuses_until_timeout_then_admits(
            threshold in 1u32..10,
            extra in 0u32..5,
            waited in 0i64..600,
        ) {
            let clock = Arc::new(ManualClock::default());
            let cb = CircuitBreaker::with_clock(
                CircuitBreakerConfig { failure_threshold: threshold, reset_timeout_secs: 300 },
                clock.clone(),
            ).unwrap();
            for _ in 0..(threshold + extra) {
                cb.record_failure();
            }
            clock.advance(Duration::seconds(waited));
            prop_assert_eq!(cb.allow_attempt(), waited >= 300);
        }
    }
}
