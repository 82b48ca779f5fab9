//! Exponential backoff for operations that time out

use crate::config::NetworkConfig;
use crate::{ErrorKind, HarvestError, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// How often and how patiently a timed-out operation is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one
    pub max_tries: u32,

    /// Delay before the second attempt; doubled for each further attempt
    pub base: Duration,

    /// Cap on a single delay
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_tries: u32, base: Duration, max_delay: Duration) -> Self {
        Self {
            max_tries: max_tries.max(1),
            base,
            max_delay,
        }
    }

    /// Builds the policy from the `[network]` section
    ///
    /// Single delays are capped at the request timeout.
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(20);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

/// Re-runs `op` while it fails with a timeout
///
/// Errors of any other kind are returned right away. When the last allowed
/// attempt also times out the result is `HarvestError::MaxTriesReached`
/// carrying the final timeout message.
///
/// # Arguments
///
/// * `policy` - Attempt bound and delays
/// * `what` - Short description used in log lines (usually the URL)
/// * `op` - Produces a fresh future per attempt
pub async fn retry_on_timeout<T, F, Fut>(policy: &BackoffPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_tries = policy.max_tries.max(1);
    let mut tries = 0;

    loop {
        tries += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == ErrorKind::TimeoutExceeded => {
                if tries >= max_tries {
                    return Err(HarvestError::MaxTriesReached {
                        tries,
                        last: e.to_string(),
                    });
                }
                let delay = policy.delay_for(tries);
                tracing::warn!(
                    "Timeout on {} (attempt {}/{}), backing off {:?}",
                    what,
                    tries,
                    max_tries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bounds `fut` by `limit`, mapping expiry to `TimeoutExceeded`
pub async fn timed<T, Fut>(url: &str, limit: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(HarvestError::TimeoutExceeded {
            url: url.to_string(),
            elapsed: started.elapsed(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_tries: u32) -> BackoffPolicy {
        BackoffPolicy::new(max_tries, Duration::from_millis(100), Duration::from_millis(500))
    }

    fn timeout_error() -> HarvestError {
        HarvestError::TimeoutExceeded {
            url: "https://a.test/list?page=2".into(),
            elapsed: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(4), Duration::from_millis(500));
        assert_eq!(p.delay_for(40), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_timeout_recovers() {
        let calls = AtomicU32::new(0);

        let value = retry_on_timeout(&policy(5), "https://a.test/", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(timeout_error())
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_on_timeout_is_bounded() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<()> = retry_on_timeout(&policy(4), "https://a.test/", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(timeout_error()) }
        })
        .await;

        assert!(matches!(
            result,
            Err(HarvestError::MaxTriesReached { tries: 4, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms of backoff between the four attempts
        assert!(started.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_on_timeout(&policy(5), "https://a.test/", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(HarvestError::not_found("price", "https://a.test/")) }
        })
        .await;

        assert!(matches!(result, Err(HarvestError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_maps_expiry() {
        let result: Result<()> = timed("https://a.test/slow", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(
            result.unwrap_err().kind(),
            ErrorKind::TimeoutExceeded
        );
    }
}
