use crate::application_port::{AuthError, CallScope};
use crate::domain_port::StoreError;
use crate::logger::*;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for store connectivity faults.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Runs store operations under the caller's deadline and cancellation
/// signal. Whatever goes wrong surfaces as `StoreUnavailable`, never as an
/// authentication failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCall {
    retry: RetryPolicy,
}

impl StoreCall {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub async fn run<T, F, Fut>(
        &self,
        scope: &CallScope,
        op: &'static str,
        f: F,
    ) -> Result<T, AuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        guarded(scope, op, self.retry, f).await.map_err(AuthError::from)
    }

    /// For operations that must not be repeated after an ambiguous failure.
    pub async fn run_once<T, F, Fut>(
        &self,
        scope: &CallScope,
        op: &'static str,
        f: F,
    ) -> Result<T, AuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        guarded(scope, op, RetryPolicy::once(), f)
            .await
            .map_err(AuthError::from)
    }
}

async fn guarded<T, F, Fut>(
    scope: &CallScope,
    op: &'static str,
    policy: RetryPolicy,
    mut f: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = async {
        let mut attempt = 1;
        let mut delay = policy.base_delay;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    warn!(op, attempt, error = %e, "store call failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(policy.max_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    };

    let result = tokio::select! {
        biased;
        _ = scope.cancel_token().cancelled() => Err(StoreError::Cancelled),
        r = tokio::time::timeout_at(scope.deadline(), attempts) => {
            r.unwrap_or(Err(StoreError::Timeout))
        }
    };
    if let Err(e) = &result {
        warn!(op, error = %e, "store call failed");
    }
    result
}
