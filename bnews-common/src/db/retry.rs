//! Database Retry Policy
//!
//! Bounded retry with backoff for transient SQLite lock contention.
//!
//! The policy is a plain value (max attempts + backoff) handed to each
//! persistence call site, so the retry budget of a write is visible where the
//! write happens. Only lock errors (`SQLITE_BUSY`, `SQLITE_LOCKED`) are
//! retried; every other failure returns immediately.

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::RetryConfig;

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `base * factor^(attempt-1)`, capped at `max`, with +/- `jitter` fraction
    Exponential {
        base: Duration,
        max: Duration,
        factor: f64,
        jitter: f64,
    },
}

impl Backoff {
    /// Delay to sleep after failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential {
                base,
                max,
                factor,
                jitter,
            } => {
                let exp = attempt.saturating_sub(1).min(32) as i32;
                let mut millis = base.as_millis() as f64 * factor.powi(exp);
                if *jitter > 0.0 {
                    let j = rand::thread_rng().gen_range(-jitter..=*jitter);
                    millis *= 1.0 + j;
                }
                let capped = millis.max(0.0).min(max.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

/// Bounded retry policy for lock-contended writes
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Why a retried operation gave up
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Operation failed with an error the policy does not retry
    #[error("{operation} failed: {source}")]
    NonTransient {
        operation: String,
        #[source]
        source: E,
    },

    /// Every attempt hit a transient error
    #[error("{operation} still failing after {attempts} attempts ({elapsed_ms} ms): {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        elapsed_ms: u128,
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// The underlying error of the last attempt
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::NonTransient { source, .. } => source,
            RetryError::Exhausted { source, .. } => source,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::Exponential {
                base: Duration::from_millis(config.base_delay_ms),
                max: Duration::from_millis(config.max_delay_ms),
                factor: 2.0,
                jitter: 0.1,
            },
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }

    /// Run a sqlx operation, retrying only on SQLite lock errors
    pub async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, RetryError<sqlx::Error>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        self.run_classified(operation_name, is_lock_error, operation)
            .await
    }

    /// Run an operation, retrying while `is_transient` holds for its error
    pub async fn run_classified<T, E, F, Fut, C>(
        &self,
        operation_name: &str,
        is_transient: C,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        let start_time = Instant::now();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if attempt > 1 {
                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    "Retrying database operation"
                );
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = start_time.elapsed().as_millis() as u64,
                            "Database operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !is_transient(&err) {
                        return Err(RetryError::NonTransient {
                            operation: operation_name.to_string(),
                            source: err,
                        });
                    }

                    let elapsed = start_time.elapsed();

                    if attempt >= max_attempts {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Database operation failed: retry budget exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            elapsed_ms: elapsed.as_millis(),
                            source: err,
                        });
                    }

                    let delay = self.backoff.delay(attempt);

                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Database locked, will retry after backoff"
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// True for SQLITE_BUSY / SQLITE_LOCKED (including extended codes)
pub fn is_lock_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let by_code = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false);
            if by_code {
                return true;
            }
            let message = db_err.message().to_lowercase();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("locked")]
        Locked,
        #[error("constraint")]
        Constraint,
    }

    fn is_locked(err: &TestError) -> bool {
        matches!(err, TestError::Locked)
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Fixed(Duration::from_millis(1)),
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let result = fast_policy(3)
            .run_classified("test_op", is_locked, || async { Ok::<i32, TestError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_succeeds_after_lock_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = fast_policy(5)
            .run_classified("test_op", is_locked, || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TestError::Locked)
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = fast_policy(4)
            .run_classified("test_op", is_locked, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, TestError>(TestError::Locked) }
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts: n, .. }) => assert_eq!(n, 4),
            other => panic!("expected Exhausted, got {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = fast_policy(5)
            .run_classified("test_op", is_locked, || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, TestError>(TestError::Constraint) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::NonTransient { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(50),
            max: Duration::from_millis(300),
            factor: 2.0,
            jitter: 0.0,
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(50));
        assert_eq!(backoff.delay(2), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(300));
        assert_eq!(backoff.delay(20), Duration::from_millis(300));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 100,
        });
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_non_database_errors_are_not_lock_errors() {
        assert!(!is_lock_error(&sqlx::Error::RowNotFound));
        assert!(is_lock_error(&sqlx::Error::PoolTimedOut));
    }
}
