//! Retry delay computation (spec §4.5: "delay = `retry_interval ×
//! backoff(attempts)` with jitter").

use std::time::Duration;

use rand::Rng;

/// Exponential backoff multiplier, doubling per attempt and capped at
/// 32x so a misconfigured `max_retries` can't produce an unbounded
/// delay.
fn backoff_multiplier(attempts: u32) -> u32 {
    1u32 << attempts.min(5)
}

/// `retry_interval * backoff(attempts)`, jittered by ±20% so many
/// simultaneously-failing items don't retry in lockstep.
pub fn next_delay(retry_interval: Duration, attempts: u32) -> Duration {
    let base = retry_interval.saturating_mul(backoff_multiplier(attempts));
    let jitter_frac = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_secs_f64(base.as_secs_f64() * jitter_frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempts() {
        let interval = Duration::from_millis(100);
        let d0 = next_delay(interval, 0);
        let d3 = next_delay(interval, 3);
        // Jitter is ±20%; attempt 3 is 8x the base vs attempt 0's 1x,
        // so the ranges cannot overlap.
        assert!(d3 > d0 * 4);
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let interval = Duration::from_millis(1000);
        for _ in 0..50 {
            let d = next_delay(interval, 0);
            assert!(d >= Duration::from_millis(800));
            assert!(d <= Duration::from_millis(1200));
        }
    }
}
