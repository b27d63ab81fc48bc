//! Exponential backoff arithmetic with jitter.
//!
//! Pure functions only; the retry loop that sleeps on these delays lives in
//! the Open Banking crate.

use std::time::Duration;

use rand::Rng;

/// Lower bound of the jitter multiplier.
pub const JITTER_MIN: f64 = 0.5;
/// Upper bound (exclusive) of the jitter multiplier.
pub const JITTER_MAX: f64 = 1.5;

/// Largest exponent applied before the clamp takes over.
const MAX_EXPONENT: u32 = 20;

/// Compute `base * 2^exponent * jitter`, clamped to `[min, max]`.
///
/// `jitter` is clamped to the jitter range so callers cannot escape the
/// bounds by passing a wild multiplier.
pub fn compute_backoff(
    base: Duration,
    exponent: u32,
    jitter: f64,
    min: Duration,
    max: Duration,
) -> Duration {
    let jitter = if jitter.is_finite() {
        jitter.clamp(JITTER_MIN, JITTER_MAX)
    } else {
        1.0
    };
    let factor = 2f64.powi(exponent.min(MAX_EXPONENT) as i32) * jitter;
    let raw_ms = base.as_millis() as f64 * factor;
    let clamped = raw_ms.clamp(min.as_millis() as f64, max.as_millis() as f64);
    Duration::from_millis(clamped as u64)
}

/// Draw a jitter multiplier uniformly from `[0.5, 1.5)`.
pub fn random_jitter() -> f64 {
    rand::rng().random_range(JITTER_MIN..JITTER_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(300);

    #[test]
    fn first_rate_limit_delay_is_base_times_jitter() {
        let d = compute_backoff(Duration::from_secs(60), 0, 1.0, MIN, MAX);
        assert_eq!(d, Duration::from_secs(60));

        let d = compute_backoff(Duration::from_secs(60), 0, 0.5, MIN, MAX);
        assert_eq!(d, Duration::from_secs(30));
    }

    #[test]
    fn delay_doubles_per_exponent() {
        let d1 = compute_backoff(Duration::from_secs(10), 1, 1.0, MIN, MAX);
        let d2 = compute_backoff(Duration::from_secs(10), 2, 1.0, MIN, MAX);
        assert_eq!(d1, Duration::from_secs(20));
        assert_eq!(d2, Duration::from_secs(40));
    }

    #[test]
    fn delay_clamps_to_max() {
        let d = compute_backoff(Duration::from_secs(300), 3, 1.4, MIN, MAX);
        assert_eq!(d, MAX);
    }

    #[test]
    fn delay_clamps_to_min() {
        let d = compute_backoff(Duration::from_millis(10), 0, 0.5, MIN, MAX);
        assert_eq!(d, MIN);
    }

    #[test]
    fn huge_exponent_does_not_overflow() {
        let d = compute_backoff(Duration::from_secs(60), u32::MAX, 1.0, MIN, MAX);
        assert_eq!(d, MAX);
    }

    #[test]
    fn non_finite_jitter_is_neutral() {
        let d = compute_backoff(Duration::from_secs(60), 0, f64::NAN, MIN, MAX);
        assert_eq!(d, Duration::from_secs(60));
    }

    #[test]
    fn random_jitter_stays_in_range() {
        for _ in 0..1000 {
            let j = random_jitter();
            assert!((JITTER_MIN..JITTER_MAX).contains(&j));
        }
    }
}
