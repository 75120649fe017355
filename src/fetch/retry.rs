//! Bounded retry with exponential backoff, written as an explicit state machine
//! so the ceiling and the delays can be tested without sleeping.

use crate::cancel::CancelToken;
use crate::error::FetchError;
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps instead of performing them.
#[derive(Debug, Default)]
pub struct FakeClock {
    slept: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Clock for FakeClock {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): base * 2^(attempt-1), capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    Transient,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    Aborted { attempts: u32 },
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting(1)
    }

    pub fn advance(self, policy: &RetryPolicy, result: AttemptResult) -> Self {
        let RetryState::Attempting(n) = self else {
            return self;
        };
        match result {
            AttemptResult::Success => RetryState::Succeeded { attempts: n },
            AttemptResult::Fatal => RetryState::Aborted { attempts: n },
            AttemptResult::Transient if n >= policy.max_attempts.max(1) => {
                RetryState::Exhausted { attempts: n }
            }
            AttemptResult::Transient => RetryState::Attempting(n + 1),
        }
    }
}

/// Drives `op` through the state machine. Returns the value and the attempt
/// count it took.
pub fn run<T>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    cancel: &CancelToken,
    target: &str,
    mut op: impl FnMut(u32) -> Result<T, FetchError>,
) -> Result<(T, u32), FetchError> {
    let mut state = RetryState::start();
    while let RetryState::Attempting(n) = state {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let err = match op(n) {
            Ok(value) => return Ok((value, n)),
            Err(err) => err,
        };
        let result = if err.is_transient() { AttemptResult::Transient } else { AttemptResult::Fatal };
        state = state.advance(policy, result);
        match state {
            RetryState::Attempting(_) => {
                let delay = policy.delay_after(n);
                warn!(url = target, attempt = n, ?delay, error = %err, "transient fetch failure, retrying");
                clock.sleep(delay);
            }
            RetryState::Exhausted { attempts } => {
                return Err(FetchError::Exhausted {
                    url: target.to_string(),
                    attempts,
                    last: Box::new(err),
                });
            }
            _ => return Err(err),
        }
    }
    Err(FetchError::Cancelled)
}
