//! Bounded retry with backoff for resource store calls

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::StoreError;

/// Backoff schedule and retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Delay before the first retry
    #[serde(rename = "initialBackoffMs")]
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the delay after each retry
    #[serde(default = "default_factor")]
    pub factor: f64,

    /// Upper bound of a single delay
    #[serde(rename = "maxBackoffMs")]
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_steps() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_factor() -> f64 {
    1.0
}

fn default_max_backoff_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            initial_backoff_ms: default_initial_backoff_ms(),
            factor: default_factor(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.initial_backoff_ms as f64 * self.factor.powi(attempt as i32);
        let delay = delay.min(self.max_backoff_ms as f64);
        Duration::from_millis(delay as u64)
    }

    /// Policy with the given budget and no delay between attempts
    pub fn immediate(steps: u32) -> Self {
        Self {
            steps,
            initial_backoff_ms: 0,
            factor: 1.0,
            max_backoff_ms: 0,
        }
    }
}

/// Run `op` until it succeeds, fails with an error `retriable` rejects, or
/// the budget is spent. The last error is returned in the latter two cases.
pub async fn retry_on<T, F, Fut, P>(
    policy: &RetryPolicy,
    retriable: P,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
    P: Fn(&StoreError) -> bool,
{
    let steps = policy.steps.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retriable(&e) && attempt + 1 < steps => {
                let delay = policy.delay(attempt);
                debug!(
                    "Retrying after {:?} (attempt {}/{}): {}",
                    delay,
                    attempt + 1,
                    steps,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retry on conflict and transient errors
pub async fn retry_on_conflict_or_retriable<T, F, Fut>(
    policy: &RetryPolicy,
    op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    retry_on(policy, |e| e.is_conflict() || e.is_retriable(), op).await
}

/// Retry on conflict, transient and not-found errors
///
/// Used right after creating an object, which may not be visible yet.
pub async fn retry_on_conflict_or_retriable_or_not_found<T, F, Fut>(
    policy: &RetryPolicy,
    op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    retry_on(
        policy,
        |e| e.is_conflict() || e.is_retriable() || e.is_not_found(),
        op,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn not_found() -> StoreError {
        StoreError::NotFound {
            kind: "Node",
            name: "n1".to_string(),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.steps, 5);
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(4), Duration::from_millis(10));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            steps: 10,
            initial_backoff_ms: 100,
            factor: 2.0,
            max_backoff_ms: 500,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(5), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict_or_retriable_or_not_found(&RetryPolicy::immediate(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(not_found())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_on_conflict_or_retriable_or_not_found(&RetryPolicy::immediate(3), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Transient("busy".into())) }
            })
            .await;

        assert!(result.unwrap_err().is_retriable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_final_without_opt_in() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_on_conflict_or_retriable(&RetryPolicy::immediate(5), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(not_found()) }
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
