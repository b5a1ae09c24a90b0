//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Calculate the delay before retrying after `attempt` failed (1-based).
///
/// `min(base * factor^(attempt-1), max)`, scaled by a uniform factor in
/// `[0.5, 1.0]` when `jitter` is set.
pub fn calculate_backoff(
    attempt: u32,
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: bool,
) -> Duration {
    if attempt == 0 || base.is_zero() {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let raw_ms = base.as_millis() as f64 * factor.powi(exponent);
    let capped_ms = raw_ms.min(max.as_millis() as f64);

    let scaled_ms = if jitter {
        capped_ms * rand::thread_rng().gen_range(0.5..=1.0)
    } else {
        capped_ms
    };

    Duration::from_millis(scaled_ms.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth_without_jitter() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_millis(30_000);

        assert_eq!(calculate_backoff(1, base, max, 2.0, false), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(2, base, max, 2.0, false), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(3, base, max, 2.0, false), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let max = calculate_backoff(10, Duration::from_millis(100), Duration::from_millis(1000), 2.0, false);
        assert_eq!(max, Duration::from_millis(1000));

        let huge = calculate_backoff(u32::MAX, Duration::from_secs(1), Duration::from_secs(5), 2.0, false);
        assert_eq!(huge, Duration::from_secs(5));
    }

    #[test]
    fn test_fractional_factor() {
        let d = calculate_backoff(3, Duration::from_millis(500), Duration::from_secs(5), 1.5, false);
        assert_eq!(d, Duration::from_millis(1125));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..100 {
            let d = calculate_backoff(2, Duration::from_millis(1000), Duration::from_secs(30), 2.0, true);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(2000));
        }
    }
}
