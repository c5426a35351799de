//! Human-like pacing
//!
//! Randomized delays used between automation steps so that actions don't
//! land on a fixed cadence. Durations are drawn from a Poisson distribution,
//! which models human reaction timing better than a uniform jitter.

use std::time::Duration;

use rand_distr::{Distribution, Poisson};
use tracing::debug;

/// Mean must reach this value before sampling; see [`humanized_duration`].
const MIN_SAMPLING_MEAN: f64 = 100.0;

/// Sleep for a random length of time around `target` seconds.
///
/// The delay never exceeds `max` (default 10x the target). The computed
/// duration is logged at debug level before the task suspends.
pub async fn randsleep(target: f64, max: Option<f64>) {
    let duration = humanized_duration(target, max);
    debug!("Sleeping for {:.3}s", duration.as_secs_f64());
    tokio::time::sleep(duration).await;
}

/// Compute a randomized delay around `target` seconds, capped at `max`.
///
/// A Poisson sample at a small mean only takes a handful of whole-number
/// values, so the target and cap are scaled up by factors of ten until the
/// mean reaches at least 100, and the sample is scaled back down by the same
/// factor. A target of 5s then yields delays with 0.01s resolution instead
/// of whole seconds.
///
/// Non-positive targets yield a zero duration.
pub fn humanized_duration(target: f64, max: Option<f64>) -> Duration {
    if target <= 0.0 || !target.is_finite() {
        return Duration::ZERO;
    }

    let max = max.unwrap_or(target * 10.0);
    let (mean, cap, multiplier) = scale_for_sampling(target, max);

    let sample = match Poisson::new(mean) {
        Ok(dist) => dist.sample(&mut rand::thread_rng()),
        // mean is positive and finite here, but fall back to it rather than panic
        Err(_) => mean,
    };

    Duration::from_secs_f64(sample.min(cap) / multiplier)
}

/// Scale `target` and `max` by factors of ten until the target reaches the
/// minimum sampling mean. Returns the scaled pair plus the applied multiplier.
fn scale_for_sampling(mut target: f64, mut max: f64) -> (f64, f64, f64) {
    let mut multiplier = 1.0;
    while target < MIN_SAMPLING_MEAN {
        multiplier *= 10.0;
        target *= 10.0;
        max *= 10.0;
    }
    (target, max, multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_crosses_threshold() {
        // 5 -> 50 -> 500: two multiplications by ten
        let (target, max, multiplier) = scale_for_sampling(5.0, 50.0);
        assert_eq!(target, 500.0);
        assert_eq!(max, 5000.0);
        assert_eq!(multiplier, 100.0);
    }

    #[test]
    fn test_scaling_noop_at_large_mean() {
        let (target, max, multiplier) = scale_for_sampling(100.0, 1000.0);
        assert_eq!(target, 100.0);
        assert_eq!(max, 1000.0);
        assert_eq!(multiplier, 1.0);
    }

    #[test]
    fn test_duration_respects_cap() {
        for _ in 0..100 {
            let duration = humanized_duration(5.0, Some(8.0));
            assert!(duration.as_secs_f64() <= 8.0);
        }
    }

    #[test]
    fn test_default_cap_is_ten_times_target() {
        for _ in 0..100 {
            let duration = humanized_duration(2.0, None);
            assert!(duration.as_secs_f64() <= 20.0);
        }
    }

    #[test]
    fn test_sub_second_resolution() {
        // With a target of 5 the sample is taken at mean 500 and divided by
        // 100, so durations land on a 0.01s grid. At least one of a batch
        // should have a fractional-second component.
        let mut saw_fractional = false;
        for _ in 0..50 {
            let duration = humanized_duration(5.0, None);
            let secs = duration.as_secs_f64();
            // on the 0.01 grid
            assert!(((secs * 100.0).round() - secs * 100.0).abs() < 1e-6);
            if duration.subsec_millis() != 0 {
                saw_fractional = true;
            }
        }
        assert!(saw_fractional);
    }

    #[test]
    fn test_non_positive_target_is_zero() {
        assert_eq!(humanized_duration(0.0, None), Duration::ZERO);
        assert_eq!(humanized_duration(-1.0, None), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_randsleep_returns() {
        // tiny target so the real sleep stays well under a second
        randsleep(0.05, Some(0.2)).await;
    }
}
