//! The single bounded-retry policy.
//!
//! Every fallback in the tool ("try, clean up, try once more, give up")
//! goes through [`run_bounded`] so no resource grows its own retry chain.

use crate::error::HostError;
use std::thread;
use std::time::Duration;

/// Bounded retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A recovery step that failed, possibly after changing the host
#[derive(Debug)]
pub struct RecoveryFailed {
    /// What the step did before failing
    pub partial: Option<String>,
    pub error: HostError,
}

impl From<HostError> for RecoveryFailed {
    fn from(error: HostError) -> Self {
        Self {
            partial: None,
            error,
        }
    }
}

/// Result of a bounded run
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, HostError>,
    pub attempts: u32,
    /// Notes from recovery steps that ran between attempts
    pub recovery: Vec<String>,
}

impl<T> Attempted<T> {
    pub fn recovered(&self) -> bool {
        !self.recovery.is_empty()
    }
}

/// Run `operation` at most `policy.max_attempts` times.
///
/// After a failed attempt, `should_retry` decides whether the error is
/// eligible; if so `recover` runs once before the next attempt and its
/// note is recorded. A failing recovery step ends the run with the
/// original error; whatever it did before failing is still recorded.
pub fn run_bounded<T, F, P, R>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
    mut recover: R,
) -> Attempted<T>
where
    F: FnMut() -> Result<T, HostError>,
    P: Fn(&HostError) -> bool,
    R: FnMut(&HostError) -> Result<String, RecoveryFailed>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut recovery = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation() {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                    recovery,
                };
            }
            Err(e) => e,
        };

        if attempt >= max_attempts || !should_retry(&err) {
            return Attempted {
                result: Err(err),
                attempts: attempt,
                recovery,
            };
        }

        log::info!(
            "Attempt {}/{} failed: {}. Recovering before retry",
            attempt,
            max_attempts,
            err
        );

        match recover(&err) {
            Ok(note) => recovery.push(note),
            Err(failed) => {
                log::warn!("Recovery step failed: {}", failed.error);
                recovery.extend(failed.partial);
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                    recovery,
                };
            }
        }

        if !policy.delay.is_zero() {
            thread::sleep(policy.delay);
        }
    }
}
