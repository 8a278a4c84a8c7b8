//! Circuit breaker around the LLM client: a reusable closed -> open -> half-open primitive.
//! Not mandatory for a run to complete; provided so callers can fast-fail against a
//! persistently unhealthy LLM endpoint rather than retrying into it step after step.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("circuit open: {consecutive_failures} consecutive failures, recovery in {recovery_remaining:?}")]
pub struct CircuitOpenError {
    pub consecutive_failures: u32,
    pub recovery_remaining: Duration,
}

struct Inner {
    state: State,
    failure_count: u32,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
            }),
        }
    }

    /// Returns `Ok(())` if a call may proceed, or `Err` if the circuit is open.
    pub fn check(&self) -> std::result::Result<(), CircuitOpenError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Ok(()),
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    inner.state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        consecutive_failures: inner.failure_count,
                        recovery_remaining: self.config.recovery_timeout - opened_at.elapsed(),
                    })
                }
            }
            State::HalfOpen => Ok(()),
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count = 0;
        inner.state = State::Closed;
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count += 1;
        if matches!(inner.state, State::HalfOpen) || inner.failure_count >= self.config.failure_threshold {
            inner.state = State::Open { opened_at: Instant::now() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        });
        assert!(breaker.check().is_ok());
        breaker.on_failure();
        assert!(breaker.check().is_ok());
        breaker.on_failure();
        assert!(breaker.check().is_err());
    }

    #[test]
    fn success_resets_to_closed() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        });
        breaker.on_failure();
        assert!(breaker.check().is_err());
        // simulate manual reset path exercised after recovery testing succeeds
        breaker.on_success();
        assert!(breaker.check().is_ok());
    }
}
