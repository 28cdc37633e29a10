//! Bounded exponential backoff around calls to unreliable collaborators.
//!
//! [`execute`] and [`execute_blocking`] share one retry state machine. The delay before
//! retry `k` (0-based) is `min(base * 2^k, max_delay)` plus a jitter drawn from
//! `[0, jitter_ratio * delay]`. Permanent failures are never retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;

use crate::ports::CallError;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(8), 0.25)
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter_ratio: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry `retry` (0-based), without jitter.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jittered(&self, retry: u32) -> Duration {
        let delay = self.delay_before_retry(retry);
        if self.jitter_ratio == 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_ratio;
        let jitter = rand::thread_rng().gen_range(0.0..=spread);
        delay + Duration::from_secs_f64(jitter)
    }
}

/// Outcome class of a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure<E> {
    Transient(E),
    Permanent(E),
}

impl From<CallError> for Failure<CallError> {
    fn from(err: CallError) -> Self {
        if err.is_transient() {
            Failure::Transient(err)
        } else {
            Failure::Permanent(err)
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BackoffError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("permanent failure: {0}")]
    Permanent(E),
    #[error("canceled")]
    Canceled,
}

/// Cooperative cancellation; cheap to clone into every call.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once canceled; pends forever if the handle is gone.
    pub async fn canceled(&mut self) {
        let closed = self.rx.wait_for(|canceled| *canceled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

struct RetryState<'a> {
    policy: &'a BackoffPolicy,
    attempts: u32,
}

impl<'a> RetryState<'a> {
    fn new(policy: &'a BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    fn begin(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Delay before the next attempt, or the terminal error.
    fn on_failure<E>(&self, failure: Failure<E>) -> Result<Duration, BackoffError<E>> {
        match failure {
            Failure::Permanent(err) => Err(BackoffError::Permanent(err)),
            Failure::Transient(last) if self.attempts >= self.policy.max_attempts => {
                Err(BackoffError::Exhausted {
                    attempts: self.attempts,
                    last,
                })
            }
            Failure::Transient(_) => Ok(self.policy.jittered(self.attempts - 1)),
        }
    }
}

pub async fn execute<T, E, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancelSignal,
    mut operation: F,
) -> Result<T, BackoffError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
{
    let mut state = RetryState::new(policy);
    let mut cancel = cancel.clone();
    loop {
        if cancel.is_canceled() {
            return Err(BackoffError::Canceled);
        }
        let attempt = state.begin();
        let failure = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };
        let delay = state.on_failure(failure)?;
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "transient failure; retrying");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.canceled() => return Err(BackoffError::Canceled),
        }
    }
}

const BLOCKING_SLICE: Duration = Duration::from_millis(25);

pub fn execute_blocking<T, E, F>(
    policy: &BackoffPolicy,
    cancel: &CancelSignal,
    mut operation: F,
) -> Result<T, BackoffError<E>>
where
    F: FnMut(u32) -> Result<T, Failure<E>>,
{
    let mut state = RetryState::new(policy);
    loop {
        if cancel.is_canceled() {
            return Err(BackoffError::Canceled);
        }
        let attempt = state.begin();
        let failure = match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };
        let delay = state.on_failure(failure)?;
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "transient failure; retrying");
        let mut remaining = delay;
        while !remaining.is_zero() {
            if cancel.is_canceled() {
                return Err(BackoffError::Canceled);
            }
            let step = remaining.min(BLOCKING_SLICE);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}

/// HTTP statuses worth retrying: 429 and every 5xx.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}
