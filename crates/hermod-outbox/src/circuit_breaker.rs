//! Per-sink circuit breaker wrapping the publisher's write calls.
//!
//! `CircuitBreakerConfig` mirrors
//! `durable::reliability::circuit_breaker::CircuitBreakerConfig` field
//! for field (failure/success thresholds, reset timeout, builder-style
//! `with_*` setters) since the teacher carries that config shape
//! already. The teacher ships no state-transition logic though — only
//! the config and the `CircuitState` enum live there — so the
//! Closed/Open/HalfOpen machine below is original, built from the
//! textbook circuit-breaker pattern the config's own doc comment
//! diagrams.

use std::time::{Duration, Instant};

use hermod_types::ErrorKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "duration_millis")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Call before attempting a write. Transitions `Open → HalfOpen`
    /// once `reset_timeout` has elapsed, and reports whether the
    /// caller may proceed.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.reset_timeout {
                    self.state = CircuitState::HalfOpen;
                    self.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                    self.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// A failure in `HalfOpen` immediately re-opens the circuit; a
    /// failure in `Closed` only opens it once `failure_threshold` is
    /// reached, per the standard circuit-breaker state machine.
    pub fn record_failure(&mut self, kind: ErrorKind) {
        if !is_breaker_tripping(kind) {
            return;
        }
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    self.trip();
                }
            }
            CircuitState::HalfOpen => self.trip(),
            CircuitState::Open => {}
        }
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.failure_count = 0;
        self.success_count = 0;
    }
}

/// Permanent sink-side failures (bad schema, malformed request) don't
/// indicate the sink itself is unhealthy, so they don't count toward
/// tripping the breaker — only connectivity-shaped failures do.
fn is_breaker_tripping(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TransientNetwork | ErrorKind::TransientStore | ErrorKind::NotFound
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(3)
                .with_success_threshold(2)
                .with_reset_timeout(Duration::from_millis(20)),
        )
    }

    #[test]
    fn opens_after_failure_threshold() {
        let mut b = breaker();
        for _ in 0..3 {
            assert!(b.allow());
            b.record_failure(ErrorKind::TransientNetwork);
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow());
    }

    #[test]
    fn permanent_failures_do_not_trip_the_breaker() {
        let mut b = breaker();
        for _ in 0..10 {
            b.record_failure(ErrorKind::PermanentSink);
        }
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_recovers_to_closed_after_successes() {
        let mut b = breaker();
        for _ in 0..3 {
            b.record_failure(ErrorKind::TransientNetwork);
        }
        assert_eq!(b.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(25));
        assert!(b.allow());
        assert_eq!(b.state(), CircuitState::HalfOpen);

        b.record_success();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let mut b = breaker();
        for _ in 0..3 {
            b.record_failure(ErrorKind::TransientNetwork);
        }
        std::thread::sleep(Duration::from_millis(25));
        assert!(b.allow());
        b.record_failure(ErrorKind::TransientNetwork);
        assert_eq!(b.state(), CircuitState::Open);
    }
}
