// src/retry.rs

//! Bounded retry policy shared by process control and target removal.

use std::time::Duration;

use tracing::debug;

use crate::clock::Clock;

/// How many times to try an operation and how long to wait in between.
///
/// `max_attempts` counts the first try, so `1` means "no retries". The
/// backoff is constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// `op` receives the 1-based attempt number. `between` runs after each
    /// failed attempt that will be retried, before the backoff sleep. On
    /// exhaustion the last error is returned together with the number of
    /// attempts made.
    pub fn run<T, E, F, B>(
        &self,
        clock: &dyn Clock,
        mut op: F,
        mut between: B,
    ) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        B: FnMut(u32, &E),
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                Err(err) => {
                    between(attempt, &err);
                    debug!(
                        attempt,
                        max_attempts = max,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "retrying after failed attempt"
                    );
                    clock.sleep(self.backoff);
                    attempt += 1;
                }
            }
        }
    }
}

/// Returned by [`RetryPolicy::run`] when every attempt failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}
