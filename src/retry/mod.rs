//! Result and retry combinators
//!
//! Browser interactions fail in a handful of expected ways: an element is not
//! there yet, a lazy image still shows its placeholder, a navigation times
//! out. This module turns those into typed `HarvestError` values and bounded
//! retry loops so call sites never hand-roll their own.
//!
//! - [`attempt`] classifies a fallible operation's error
//! - [`retry_while`] re-runs an action while its result looks unfinished
//! - [`retry_on_timeout`] re-runs an operation that keeps timing out, with
//!   exponential backoff

mod backoff;

pub use backoff::{retry_on_timeout, timed, BackoffPolicy};

use crate::HarvestError;
use std::fmt::Debug;
use std::future::Future;
use thiserror::Error;

/// Failure of a [`retry_while`] loop
#[derive(Debug, Error)]
pub enum RetryError<T, E> {
    /// The action itself failed; the loop stopped immediately
    #[error("{0}")]
    Action(E),

    /// Every attempt produced a value the predicate rejected
    #[error("gave up after {tries} tries")]
    MaxTriesReached {
        tries: u32,
        /// Value produced by the final attempt
        last: T,
    },
}

impl<T: Debug> From<RetryError<T, HarvestError>> for HarvestError {
    fn from(err: RetryError<T, HarvestError>) -> Self {
        match err {
            RetryError::Action(e) => e,
            RetryError::MaxTriesReached { tries, last } => HarvestError::MaxTriesReached {
                tries,
                last: format!("{:?}", last),
            },
        }
    }
}

/// Awaits `op` and sorts its error into expected and unexpected failures
///
/// `recognize` receives the raw error and returns `Ok(typed)` for failures
/// the crawl knows how to handle, or hands the error back as `Err` when it
/// does not. Recognized failures become the inner `Err`; unrecognized ones
/// are returned in the outer `Err` so callers can propagate them with `?`.
///
/// # Example
///
/// ```
/// use catalog_harvest::retry::attempt;
/// use catalog_harvest::HarvestError;
///
/// # tokio_test_block_on(async {
/// let outcome = attempt(
///     async { Err::<u32, &str>("missing") },
///     |e| if e == "missing" { Ok(HarvestError::not_found("price", "https://a.test/")) } else { Err(e) },
/// )
/// .await;
/// assert!(matches!(outcome, Ok(Err(HarvestError::NotFound { .. }))));
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub async fn attempt<T, E, Fut, R>(op: Fut, recognize: R) -> Result<Result<T, HarvestError>, E>
where
    Fut: Future<Output = Result<T, E>>,
    R: FnOnce(E) -> Result<HarvestError, E>,
{
    match op.await {
        Ok(value) => Ok(Ok(value)),
        Err(e) => recognize(e).map(Err),
    }
}

/// Runs `action` until `predicate` rejects its value
///
/// While the action succeeds with a value for which `predicate` is true,
/// `on_retry` is awaited and the action runs again. The loop stops on the
/// first action error, on the first value the predicate rejects, or after
/// `max_tries` invocations. `on_retry` only runs when another attempt follows,
/// and a `max_tries` of zero is treated as one.
///
/// # Arguments
///
/// * `action` - Produces a fresh future per attempt
/// * `predicate` - Returns true when the value needs another attempt
/// * `on_retry` - Recovery step run between attempts (e.g. focusing an element)
/// * `max_tries` - Upper bound on `action` invocations
pub async fn retry_while<T, E, A, Fut, P, R, RFut>(
    mut action: A,
    predicate: P,
    mut on_retry: R,
    max_tries: u32,
) -> Result<T, RetryError<T, E>>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
    R: FnMut() -> RFut,
    RFut: Future<Output = ()>,
{
    let max_tries = max_tries.max(1);
    let mut tries = 0;

    loop {
        tries += 1;
        let value = action().await.map_err(RetryError::Action)?;

        if !predicate(&value) {
            return Ok(value);
        }

        if tries >= max_tries {
            return Err(RetryError::MaxTriesReached { tries, last: value });
        }

        tracing::debug!("Retry {}/{} after unfinished value", tries, max_tries);
        on_retry().await;
    }
}

/// Predicate: the value contains `needle`
pub fn contains(needle: impl Into<String>) -> impl Fn(&String) -> bool {
    let needle = needle.into();
    move |value: &String| value.contains(needle.as_str())
}

/// Predicate: the value is empty after trimming
pub fn is_empty<T: AsRef<str>>(value: &T) -> bool {
    value.as_ref().trim().is_empty()
}

/// Async no-op recovery step for [`retry_while`]
pub async fn no_recovery() {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_attempt_splits_recognized_and_unrecognized() {
        let recognize = |e: String| {
            if e.starts_with("missing") {
                Ok(HarvestError::not_found("option list", "https://a.test/p/1"))
            } else {
                Err(e)
            }
        };

        let ok = attempt(async { Ok::<_, String>(7) }, recognize).await;
        assert!(matches!(ok, Ok(Ok(7))));

        let typed = attempt(async { Err::<u32, _>("missing options".to_string()) }, recognize).await;
        assert!(matches!(typed, Ok(Err(HarvestError::NotFound { .. }))));

        let fatal = attempt(async { Err::<u32, _>("socket closed".to_string()) }, recognize).await;
        assert_eq!(fatal.unwrap_err(), "socket closed");
    }

    #[tokio::test]
    async fn test_retry_while_stops_at_max_tries() {
        let calls = AtomicU32::new(0);
        let recoveries = AtomicU32::new(0);

        let result = retry_while(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, HarvestError>("data:image/gif;base64,R0lGOD".to_string()) }
            },
            contains("base64"),
            || {
                recoveries.fetch_add(1, Ordering::SeqCst);
                async {}
            },
            5,
        )
        .await;

        match result {
            Err(RetryError::MaxTriesReached { tries, last }) => {
                assert_eq!(tries, 5);
                assert!(last.contains("base64"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // No recovery after the final attempt
        assert_eq!(recoveries.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_while_returns_first_accepted_value() {
        let calls = AtomicU32::new(0);

        let result = retry_while(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok::<_, HarvestError>("data:image/gif;base64".to_string())
                    } else {
                        Ok("https://cdn.a.test/p/1.jpg".to_string())
                    }
                }
            },
            contains("base64"),
            no_recovery,
            5,
        )
        .await
        .unwrap();

        assert_eq!(result, "https://cdn.a.test/p/1.jpg");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_while_stops_on_action_error() {
        let calls = AtomicU32::new(0);

        let result: Result<String, _> = retry_while(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(HarvestError::not_found("image", "https://a.test/p/1")) }
            },
            is_empty,
            no_recovery,
            5,
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Action(HarvestError::NotFound { .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_while_zero_tries_runs_once() {
        let calls = AtomicU32::new(0);

        let result = retry_while(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, HarvestError>(String::new()) }
            },
            is_empty,
            no_recovery,
            0,
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::MaxTriesReached { tries: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_error_into_harvest_error() {
        let err: HarvestError = RetryError::<String, HarvestError>::MaxTriesReached {
            tries: 3,
            last: "placeholder".into(),
        }
        .into();
        assert!(matches!(err, HarvestError::MaxTriesReached { tries: 3, .. }));
    }
}
