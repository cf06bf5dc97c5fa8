use crate::error::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff with jitter. Only transport errors are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// +/- percent applied to each delay
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            jitter_percent: 20.0,
        }
    }
}

/// Result of a retried call plus the transport failures absorbed on the way
#[derive(Debug)]
pub struct RetryReport<T> {
    pub outcome: Result<T, GatewayError>,
    pub retries: Vec<GatewayError>,
}

impl RetryPolicy {
    /// No sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter_percent: 0.0,
        }
    }

    /// Delay before retry number `retry` (0-based): base x 2^retry, jittered
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * 2f64.powi(retry as i32);
        if base <= 0.0 {
            return Duration::ZERO;
        }
        let jitter = if self.jitter_percent > 0.0 {
            let spread = self.jitter_percent / 100.0;
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> RetryReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut retries = Vec::new();
        let max_attempts = self.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match call().await {
                Ok(value) => {
                    return RetryReport {
                        outcome: Ok(value),
                        retries,
                    }
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    tracing::warn!(
                        "[{}] attempt {}/{} failed: {}. Retrying in {:.2}s",
                        label,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    retries.push(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!("[{}] failed after {} attempts: {}", label, max_attempts, e);
                    } else {
                        tracing::warn!("[{}] {} error, not retried: {}", label, e.kind(), e);
                    }
                    return RetryReport {
                        outcome: Err(e),
                        retries,
                    };
                }
            }
        }

        // max_attempts >= 1, so the loop always returns
        RetryReport {
            outcome: Err(GatewayError::Transport(format!("[{}] no attempts made", label))),
            retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_retries_transport_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(4);

        let report = policy
            .run("place", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(GatewayError::Transport("timeout".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_ok!(&report.outcome);
        assert_eq!(report.retries.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_hard_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(3);

        let report: RetryReport<()> = policy
            .run("place", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Transport("503".into()))
            })
            .await;

        assert_err!(&report.outcome);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.retries.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::immediate(4);

        let report: RetryReport<()> = policy
            .run("place", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Rejected("insufficient margin".into()))
            })
            .await;

        assert_eq!(report.outcome, Err(GatewayError::Rejected("insufficient margin".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(report.retries.is_empty());
    }

    #[test]
    fn test_delay_doubles_within_jitter() {
        let policy = RetryPolicy::default();
        for retry in 0..3 {
            let expected = 2f64.powi(retry as i32);
            let delay = policy.delay_for(retry).as_secs_f64();
            assert!(delay >= expected * 0.8 - 1e-9 && delay <= expected * 1.2 + 1e-9);
        }
    }
}
