//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `retry` (0-based): `base·2^retry`, capped at
/// `max_ms`, then spread by ±`jitter_ratio`.
pub fn calculate_backoff(retry: u32, base_ms: u64, max_ms: u64, jitter_ratio: f64) -> Duration {
    let exponential_base = 2u64.saturating_pow(retry);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = (capped_delay as f64 * jitter_ratio) as i64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(-jitter_range..=jitter_range)
    } else {
        0
    };

    Duration::from_millis((capped_delay as i64 + jitter).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        for _ in 0..100 {
            let b0 = calculate_backoff(0, 1000, 8000, 0.1).as_millis();
            assert!((900..=1100).contains(&b0), "{}", b0);

            let b1 = calculate_backoff(1, 1000, 8000, 0.1).as_millis();
            assert!((1800..=2200).contains(&b1), "{}", b1);

            let b2 = calculate_backoff(2, 1000, 8000, 0.1).as_millis();
            assert!((3600..=4400).contains(&b2), "{}", b2);
        }

        let max = calculate_backoff(10, 1000, 8000, 0.0);
        assert_eq!(max.as_millis(), 8000);
    }

    #[test]
    fn test_no_jitter_is_exact() {
        assert_eq!(calculate_backoff(0, 100, 1000, 0.0), Duration::from_millis(100));
        assert_eq!(calculate_backoff(3, 100, 1000, 0.0), Duration::from_millis(800));
        assert_eq!(calculate_backoff(64, 100, 1000, 0.0), Duration::from_millis(1000));
    }
}
