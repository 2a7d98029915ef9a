//! Shared scheduling (request budget, concurrency cap, minimum spacing) and
//! retry-with-backoff policy used by every embedding backend.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::warn;

use crate::error::IndexError;

const WINDOW: Duration = Duration::from_secs(60);

/// Caps in-flight concurrent calls, enforces a minimum spacing between
/// calls, and reserves a request budget refilled on a sliding 60-second
/// window.
pub struct Scheduler {
    semaphore: Semaphore,
    min_spacing: Duration,
    max_per_window: Option<u32>,
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    last_call: Option<Instant>,
    recent_calls: VecDeque<Instant>,
}

impl Scheduler {
    pub fn new(max_concurrent: usize, min_spacing: Duration, max_per_window: Option<u32>) -> Self {
        Self {
            semaphore: Semaphore::new(max_concurrent.max(1)),
            min_spacing,
            max_per_window,
            state: Mutex::new(SchedulerState {
                last_call: None,
                recent_calls: VecDeque::new(),
            }),
        }
    }

    /// Wait for a concurrency permit, the minimum inter-call spacing, and
    /// (if configured) a free slot in the sliding request-per-minute window.
    pub async fn acquire(&self) -> tokio::sync::SemaphorePermit<'_> {
        let permit = self.semaphore.acquire().await.expect("scheduler semaphore never closed");

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                while let Some(front) = state.recent_calls.front() {
                    if now.duration_since(*front) > WINDOW {
                        state.recent_calls.pop_front();
                    } else {
                        break;
                    }
                }

                let window_wait = match self.max_per_window {
                    Some(limit) if state.recent_calls.len() as u32 >= limit => {
                        state.recent_calls.front().map(|oldest| WINDOW.saturating_sub(now.duration_since(*oldest)))
                    }
                    _ => None,
                };

                let spacing_wait = state
                    .last_call
                    .map(|last| self.min_spacing.saturating_sub(now.duration_since(last)))
                    .filter(|d| !d.is_zero());

                match (window_wait, spacing_wait) {
                    (None, None) => {
                        state.last_call = Some(now);
                        state.recent_calls.push_back(now);
                        None
                    }
                    (w, s) => Some(w.into_iter().chain(s).max().unwrap_or_default()),
                }
            };

            match wait {
                Some(d) if !d.is_zero() => tokio::time::sleep(d).await,
                _ => break,
            }
        }

        permit
    }
}

/// Outcome of a single attempt, used to drive `retry_with_backoff`.
pub enum CallOutcome<T> {
    Success(T),
    RateLimited { retry_after: Option<Duration> },
    Fatal(anyhow::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the initial call — not the
    /// number of retries. A caller-configured `retryAttempts = 3` means 3
    /// retries after the first try, i.e. `max_attempts = 4`.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(500) }
    }
}

/// Retry `call` under exponential backoff (`base_delay * 2^attempt`),
/// honoring an explicit `retry_after` when the backend supplies one.
/// Non-rate-limit errors propagate immediately. After `max_attempts`
/// rate-limited attempts, fails with `IndexError::RateLimitExhausted`.
pub async fn retry_with_backoff<F, Fut, T>(policy: RetryPolicy, mut call: F) -> anyhow::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = CallOutcome<T>>,
{
    for attempt in 0..policy.max_attempts {
        match call(attempt).await {
            CallOutcome::Success(v) => return Ok(v),
            CallOutcome::Fatal(e) => return Err(e),
            CallOutcome::RateLimited { retry_after } => {
                if attempt + 1 >= policy.max_attempts {
                    break;
                }
                let delay = retry_after.unwrap_or_else(|| policy.base_delay * 2u32.pow(attempt));
                warn!(attempt, delay_ms = delay.as_millis() as u64, "embedding call rate limited, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(IndexError::RateLimitExhausted { attempts: policy.max_attempts }.into())
}

/// Shared handle type backends pass around together.
pub type SharedScheduler = Arc<Scheduler>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let result: anyhow::Result<i32> =
            retry_with_backoff(RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1) }, |_attempt| async {
                CallOutcome::Success(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn succeeds_after_one_retry() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: anyhow::Result<i32> =
            retry_with_backoff(RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1) }, |_attempt| {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n == 0 {
                        CallOutcome::RateLimited { retry_after: Some(Duration::from_millis(1)) }
                    } else {
                        CallOutcome::Success(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn exhausts_after_n_attempts() {
        let result: anyhow::Result<i32> =
            retry_with_backoff(RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1) }, |_attempt| async {
                CallOutcome::RateLimited::<i32> { retry_after: Some(Duration::from_millis(1)) }
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<IndexError>().is_some());
        match err.downcast_ref::<IndexError>().unwrap() {
            IndexError::RateLimitExhausted { attempts } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn three_configured_retries_means_four_total_attempts() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        // retryAttempts = 3 -> max_attempts = 4, matching the spec's "fails
        // on the fourth attempt" scenario under repeated 429s.
        let result: anyhow::Result<i32> =
            retry_with_backoff(RetryPolicy { max_attempts: 4, base_delay: Duration::from_millis(1) }, |_attempt| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { CallOutcome::RateLimited::<i32> { retry_after: Some(Duration::from_millis(1)) } }
            })
            .await;
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 4);
        match result.unwrap_err().downcast_ref::<IndexError>().unwrap() {
            IndexError::RateLimitExhausted { attempts } => assert_eq!(*attempts, 4),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_error_propagates_immediately() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: anyhow::Result<i32> =
            retry_with_backoff(RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(1) }, |_attempt| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { CallOutcome::Fatal(anyhow::anyhow!("boom")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
