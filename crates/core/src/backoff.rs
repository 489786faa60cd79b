//! Exponential backoff with jitter
//!
//! `delay = (2^attempt + U(-jitter, +jitter)) * unit`, clamped to
//! `[min, max]`. A `max` of zero leaves the delay unbounded above.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

// Exponents past this only matter when `max` is zero, and then the delay is
// already centuries long.
const MAX_EXPONENT: u32 = 63;

/// Compute the delay before the next attempt
///
/// `attempt` is zero-based: attempt 0 has a base factor of 1. `jitter` is
/// expressed as a duration and scaled into `unit` multiples, so with the
/// defaults (1s jitter, 1s unit) attempt 0 sleeps between 0 and 2 seconds
/// before the `min` clamp.
pub fn compute_delay(
    attempt: u32,
    jitter: Duration,
    min: Duration,
    max: Duration,
    unit: Duration,
) -> Duration {
    let unit_secs = unit.as_secs_f64();
    let span = if unit_secs > 0.0 {
        jitter.as_secs_f64() / unit_secs
    } else {
        0.0
    };
    let deviation = if span > 0.0 {
        rand::rng().random_range(-span..=span)
    } else {
        0.0
    };

    let factor = 2f64.powi(attempt.min(MAX_EXPONENT) as i32) + deviation;
    let delay = Duration::try_from_secs_f64(factor * unit_secs).unwrap_or(if factor < 0.0 {
        Duration::ZERO
    } else {
        Duration::MAX
    });

    clamp(delay, min, max)
}

/// Compute the delay for `attempt` using the resolved knobs of `config`
pub fn delay_for(config: &RetryConfig, attempt: u32) -> Duration {
    compute_delay(
        attempt,
        config.jitter(),
        config.min(),
        config.max(),
        config.unit(),
    )
}

fn clamp(delay: Duration, min: Duration, max: Duration) -> Duration {
    if delay < min {
        return min;
    }
    if !max.is_zero() && delay > max {
        return max;
    }
    delay
}
