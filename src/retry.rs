//! Bounded retry with exponential backoff for transient store failures.
//!
//! Only [`Error::TransientStore`](crate::Error::TransientStore) is retried.
//! Logical failures (not found, conflicts, invalid state) are returned on
//! the first attempt because repeating them cannot succeed.

use crate::backend::Backend;
use crate::Result;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry; doubles on each subsequent retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

const MAX_DELAY: Duration = Duration::from_secs(5);

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Set the total attempt budget (values below 1 are treated as 1).
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Total attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retry number `retry` (0-based): 100ms, 200ms, 400ms, ...
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Run `op`, retrying transient failures within the budget.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last transient error
    /// once the budget is exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && retry + 1 < self.max_attempts => {
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        operation,
                        attempt = retry + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "transient store error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                other => return other,
            }
        }
    }
}

/// Backend wrapper that applies a [`RetryPolicy`] to every primitive.
///
/// Safe for `put_if_absent` because backends only report a transient error
/// when the value was not linked into place.
#[derive(Debug)]
pub struct RetryingBackend<B: Backend> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: Backend> RetryingBackend<B> {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub const fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<B: Backend> Backend for RetryingBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.policy.run("get", || self.inner.get(key)).await
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.policy
            .run("put_if_absent", || self.inner.put_if_absent(key, value.clone()))
            .await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.policy
            .run("put", || self.inner.put(key, value.clone()))
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.policy.run("delete", || self.inner.delete(key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.policy.run("list", || self.inner.list(prefix)).await
    }
}
