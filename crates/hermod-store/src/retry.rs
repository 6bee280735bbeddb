//! Busy-retry harness for the relational store's write path (spec §4.1,
//! §5 "Busy-retry policy": "exponential backoff (50 ms, 100, 200, 400,
//! 800, 1600 ms capped at 2 s), up to six attempts, honoring
//! cancellation; every other error fails fast").
//!
//! Grounded on `durable::reliability::RetryPolicy`'s backoff shape, but
//! specialized to the spec's fixed schedule rather than a configurable
//! policy struct — Hermod's busy-retry behavior is not tunable per spec.

use std::time::Duration;

use tokio::time::sleep;

const MAX_ATTEMPTS: u32 = 6;
const INITIAL_DELAY_MS: u64 = 50;
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Recognized transient "database busy" markers across engines, e.g.
/// SQLite's `SQLITE_BUSY` and Postgres' `could not serialize access`.
const BUSY_MARKERS: &[&str] = &[
    "database is locked",
    "SQLITE_BUSY",
    "deadlock detected",
    "could not serialize access",
    "too many connections",
];

pub fn is_busy_error(message: &str) -> bool {
    BUSY_MARKERS
        .iter()
        .any(|marker| message.to_lowercase().contains(&marker.to_lowercase()))
}

fn delay_for_attempt(attempt: u32) -> Duration {
    let millis = INITIAL_DELAY_MS.saturating_mul(1u64 << attempt.min(5));
    Duration::from_millis(millis).min(MAX_DELAY)
}

/// Runs `op`, retrying on recognized busy errors with the spec's fixed
/// exponential backoff. Any other error, or exhaustion of
/// `MAX_ATTEMPTS`, is returned immediately.
pub async fn with_busy_retry<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS || !is_busy_error(&err.to_string()) {
                    return Err(err);
                }
                sleep(delay_for_attempt(attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn schedule_matches_spec_exactly() {
        let expected_ms = [50, 100, 200, 400, 800, 1600];
        for (attempt, &ms) in expected_ms.iter().enumerate() {
            assert_eq!(delay_for_attempt(attempt as u32), Duration::from_millis(ms));
        }
    }

    #[test]
    fn delay_is_capped_at_two_seconds() {
        assert_eq!(delay_for_attempt(20), MAX_DELAY);
    }

    #[test]
    fn recognizes_known_busy_markers() {
        assert!(is_busy_error("database is locked"));
        assert!(is_busy_error("Error: SQLITE_BUSY"));
        assert!(is_busy_error("ERROR: deadlock detected"));
    }

    #[test]
    fn does_not_flag_unrelated_errors() {
        assert!(!is_busy_error("column \"foo\" does not exist"));
        assert!(!is_busy_error("connection refused"));
    }

    #[tokio::test]
    async fn retries_busy_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, String> = with_busy_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("database is locked".to_string())
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fails_fast_on_non_busy_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, String> = with_busy_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err("permission denied".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, String> = with_busy_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err("database is locked".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
