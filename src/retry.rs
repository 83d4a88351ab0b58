//! Bounded retry with a fixed delay between attempts.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};

/// How many times an operation runs and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// The last error of an operation that ran out of attempts.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Runs `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. `on_retry` is called with the
/// failed attempt number and its error before each re-attempt, never after
/// the final one.
///
/// Returns the value together with the number of attempts it took.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use wbimg::{with_retry, RetryPolicy};
///
/// # async fn example() {
/// let policy = RetryPolicy::new(3, Duration::ZERO);
/// let result = with_retry(
///     &policy,
///     |attempt| async move { if attempt < 3 { Err("busy") } else { Ok(attempt) } },
///     |_, _| {},
/// )
/// .await;
/// assert_eq!(result.unwrap(), (3, 3));
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut, N>(
    policy: &RetryPolicy,
    mut op: F,
    on_retry: N,
) -> Result<(T, u32), Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug + std::fmt::Display,
    N: Fn(u32, &E),
{
    let max_attempts = policy.attempts();
    let strategy = FixedInterval::new(policy.delay).take((max_attempts - 1) as usize);
    let attempts = AtomicU32::new(0);
    let attempts_ref = &attempts;
    let on_retry_ref = &on_retry;

    let result = Retry::spawn(strategy, || {
        let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = op(attempt);
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) => {
                    if attempt < max_attempts {
                        on_retry_ref(attempt, &e);
                    }
                    RetryError::to_transient(e)
                }
            }
        }
    })
    .await;

    let attempts = attempts.load(Ordering::SeqCst);
    match result {
        Ok(value) => Ok((value, attempts)),
        Err(error) => Err(Exhausted { error, attempts }),
    }
}
