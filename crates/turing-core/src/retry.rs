//! Bounded retry for contended resources.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::constants::{OPEN_RETRY_ATTEMPTS, OPEN_RETRY_DELAY_MS};

/// Max attempts (including the first) and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: OPEN_RETRY_ATTEMPTS,
            delay_ms: OPEN_RETRY_DELAY_MS,
        }
    }
}

/// Result of an exhausted or short-circuited retry.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, RetryFailure<E>> {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max && retryable(&error) => {
                    debug!(attempt, max, "Retryable failure, backing off");
                    thread::sleep(self.delay());
                    attempt += 1;
                }
                Err(error) => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[test]
    fn test_succeeds_within_budget() {
        let result = quick(3).run(|n| if n < 3 { Err("busy") } else { Ok(n) }, |_| true);
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_exhausts_budget() {
        let mut calls = 0;
        let result: Result<(), _> = quick(3).run(
            |_| {
                calls += 1;
                Err("busy")
            },
            |_| true,
        );
        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_stops_immediately() {
        let result: Result<(), _> = quick(5).run(|_| Err("gone"), |e| *e == "busy");
        assert_eq!(result.unwrap_err().attempts, 1);
    }
}
