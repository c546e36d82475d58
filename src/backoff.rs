//! Wait-time strategies between attempts.
//!
//! A backoff is any function of `(min, max, attempt, last_response)`, where
//! `attempt` counts the attempts already completed (0 before the first retry).

use std::{sync::Arc, time::Duration};

use rand::Rng;
use reqwest::{header::RETRY_AFTER, Response, StatusCode};

/// Computes the wait before the next attempt.
pub type Backoff =
    Arc<dyn Fn(Duration, Duration, usize, Option<&Response>) -> Duration + Send + Sync>;

/// Exponential backoff, `min * 2^attempt` clamped to `max`.
///
/// A `Retry-After` hint in whole seconds on a 429 or 503 response wins over
/// the exponential value.
pub fn default_backoff(
    min: Duration,
    max: Duration,
    attempt: usize,
    response: Option<&Response>,
) -> Duration {
    if let Some(hint) = response.and_then(retry_after_hint) {
        return hint;
    }
    exponential(min, max, attempt)
}

/// `(min + jitter) * (attempt + 1)` with jitter drawn from `[0, max - min)`.
///
/// Spreads out clients that started retrying at the same moment.
pub fn linear_jitter_backoff(
    min: Duration,
    max: Duration,
    attempt: usize,
    _response: Option<&Response>,
) -> Duration {
    let factor = u32::try_from(attempt.saturating_add(1)).unwrap_or(u32::MAX);
    if max <= min {
        return min.saturating_mul(factor);
    }
    let spread = (max - min).as_nanos().min(u64::MAX as u128) as u64;
    let jitter = Duration::from_nanos(rand::rng().random_range(0..spread));
    (min + jitter).saturating_mul(factor)
}

/// [`linear_jitter_backoff`] that honours a server retry hint first.
pub fn rate_limit_linear_jitter_backoff(
    min: Duration,
    max: Duration,
    attempt: usize,
    response: Option<&Response>,
) -> Duration {
    if let Some(hint) = response.and_then(retry_after_hint) {
        return hint;
    }
    linear_jitter_backoff(min, max, attempt, response)
}

/// Reads `Retry-After` as whole seconds from a 429 or 503 response.
///
/// Any other status, a missing header, or a value that is not a
/// non-negative integer yields `None`.
pub fn retry_after_hint(response: &Response) -> Option<Duration> {
    let status = response.status();
    if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }
    let seconds = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    Some(Duration::from_secs(seconds))
}

fn exponential(min: Duration, max: Duration, attempt: usize) -> Duration {
    let Ok(exponent) = i32::try_from(attempt) else {
        return max;
    };
    let wait = 2f64.powi(exponent) * min.as_secs_f64();
    match Duration::try_from_secs_f64(wait) {
        Ok(wait) if wait <= max => wait,
        _ => max,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{Response, StatusCode};

    use super::{
        default_backoff, linear_jitter_backoff, rate_limit_linear_jitter_backoff, retry_after_hint,
    };

    fn response(status: StatusCode, retry_after: Option<&str>) -> Response {
        let mut builder = http::Response::builder().status(status.as_u16());
        if let Some(value) = retry_after {
            builder = builder.header("Retry-After", value);
        }
        Response::from(builder.body("").expect("response must build"))
    }

    const MIN: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(10);

    #[test]
    fn doubles_per_attempt() {
        let waits: Vec<_> = (0..4)
            .map(|attempt| default_backoff(MIN, MAX, attempt, None))
            .collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn clamps_to_max_including_overflow() {
        assert_eq!(default_backoff(MIN, MAX, 4, None), MAX);
        assert_eq!(default_backoff(MIN, MAX, 64, None), MAX);
        assert_eq!(default_backoff(MIN, MAX, 5_000, None), MAX);
        assert_eq!(default_backoff(MIN, MAX, usize::MAX, None), MAX);
        assert_eq!(
            default_backoff(Duration::from_secs(u64::MAX), Duration::MAX, 3, None),
            Duration::MAX
        );
    }

    #[test]
    fn retry_after_wins_for_429_and_503() {
        for attempt in [0, 3, 60] {
            let throttled = response(StatusCode::TOO_MANY_REQUESTS, Some("7"));
            assert_eq!(
                default_backoff(MIN, MAX, attempt, Some(&throttled)),
                Duration::from_secs(7)
            );
        }
        let unavailable = response(StatusCode::SERVICE_UNAVAILABLE, Some("2"));
        assert_eq!(
            default_backoff(MIN, MAX, 0, Some(&unavailable)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn retry_after_ignored_elsewhere_or_when_malformed() {
        let bad_gateway = response(StatusCode::BAD_GATEWAY, Some("7"));
        assert_eq!(retry_after_hint(&bad_gateway), None);

        for value in ["soon", "-3", "1.5", "Wed, 21 Oct 2015 07:28:00 GMT"] {
            let throttled = response(StatusCode::TOO_MANY_REQUESTS, Some(value));
            assert_eq!(retry_after_hint(&throttled), None, "value {value}");
            assert_eq!(
                default_backoff(MIN, MAX, 1, Some(&throttled)),
                Duration::from_secs(2)
            );
        }

        let missing = response(StatusCode::TOO_MANY_REQUESTS, None);
        assert_eq!(retry_after_hint(&missing), None);
    }

    #[test]
    fn linear_jitter_stays_within_scaled_bounds() {
        for attempt in 0..5 {
            let factor = attempt as u32 + 1;
            let wait = linear_jitter_backoff(MIN, MAX, attempt, None);
            assert!(wait >= MIN * factor);
            assert!(wait < MAX * factor);
        }
    }

    #[test]
    fn linear_jitter_without_spread_is_linear() {
        let wait = linear_jitter_backoff(MAX, MIN, 2, None);
        assert_eq!(wait, MAX * 3);
    }

    #[test]
    fn rate_limited_linear_jitter_prefers_hint() {
        let throttled = response(StatusCode::TOO_MANY_REQUESTS, Some("3"));
        assert_eq!(
            rate_limit_linear_jitter_backoff(MIN, MAX, 4, Some(&throttled)),
            Duration::from_secs(3)
        );
    }
}
