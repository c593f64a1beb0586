//! Sequential retry queue.
//!
//! A [`RetryQueue`] runs one unit of work at a time, in submission order.
//! Each unit is retried according to the queue's [`RetryPolicy`]; the next
//! unit starts only after the previous one has fully settled, retries
//! included.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, Result};

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How a queue retries failed work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before each retry.
    pub retry_delay: Duration,
    /// Error kinds that trigger a retry; anything else fails immediately.
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            retryable: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy retrying `kinds` up to `max_retries` times.
    #[must_use]
    pub fn new(max_retries: u32, kinds: &[ErrorKind]) -> Self {
        Self {
            max_retries,
            retryable: kinds.to_vec(),
            ..Self::default()
        }
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }
}

/// Strictly ordered, single-concurrency work queue.
///
/// Turn-taking uses a fair [`tokio::sync::Mutex`]: callers acquire it in the
/// order they called [`RetryQueue::run`]. Dropping the returned future
/// cancels the unit, including any attempt in flight, and frees the queue.
#[derive(Debug)]
pub struct RetryQueue {
    policy: RetryPolicy,
    turn: Mutex<()>,
}

impl RetryQueue {
    /// Creates a queue with the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            turn: Mutex::const_new(()),
        }
    }

    /// Returns the queue's retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `work` once its turn comes, retrying per the policy.
    ///
    /// `work` receives the attempt number, starting at 1. The last error is
    /// returned unchanged once retries are exhausted or the error kind is not
    /// retryable.
    pub async fn run<T, F, Fut>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _turn = self.turn.lock().await;

        let mut attempt = 1;
        loop {
            match work(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt <= self.policy.max_retries && self.policy.is_retryable(e.kind()) => {
                    tracing::debug!(attempt, error = %e, "retrying");
                    tokio::time::sleep(self.policy.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
