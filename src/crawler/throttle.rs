//! Request rate limiting
//!
//! One [`RateLimiter`] is shared by every task of a crawl. It hands out at
//! most `permits` permits in any sliding window of `period`. Waiters are
//! served in arrival order: the window sits behind a FIFO `tokio` mutex that
//! a waiter keeps while sleeping until the oldest permit leaves the window.

use crate::config::NetworkConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window limiter over permit timestamps
#[derive(Debug)]
pub struct RateLimiter {
    permits: usize,
    period: Duration,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `permits` acquisitions per `period`
    ///
    /// A `permits` of zero is treated as one.
    pub fn new(permits: u32, period: Duration) -> Self {
        let permits = permits.max(1) as usize;
        Self {
            permits,
            period,
            window: Mutex::new(VecDeque::with_capacity(permits)),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.rate_limit, Duration::from_millis(config.period_ms))
    }

    /// Waits until a request may be sent
    pub async fn acquire(&self) {
        let mut window = self.window.lock().await;

        loop {
            let now = Instant::now();
            while let Some(&oldest) = window.front() {
                if now.duration_since(oldest) >= self.period {
                    window.pop_front();
                } else {
                    break;
                }
            }

            if window.len() < self.permits {
                window.push_back(now);
                return;
            }

            // Full window: wait for the oldest permit to expire
            if let Some(&oldest) = window.front() {
                let ready_at = oldest + self.period;
                tracing::trace!(
                    "Rate limit reached, waiting {:?}",
                    ready_at.saturating_duration_since(now)
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }

    /// Permits allowed per period
    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_permits_within_one_period_do_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let started = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_permits_wait_for_the_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let started = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await;
        }

        // Permits 3-4 wait one period, permit 5 waits two
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_limiter_bounds_concurrent_tasks() {
        let limiter = Arc::new(RateLimiter::new(4, Duration::from_millis(500)));
        let started = Instant::now();

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut stamps = Vec::new();
        for task in tasks {
            stamps.push(task.await.unwrap());
        }
        stamps.sort();

        // No sliding window of 500ms holds more than 4 permits
        for (i, stamp) in stamps.iter().enumerate().skip(4) {
            assert!(stamp.duration_since(stamps[i - 4]) >= Duration::from_millis(500));
        }
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_zero_permits_treated_as_one() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert_eq!(limiter.permits(), 1);
    }
}
