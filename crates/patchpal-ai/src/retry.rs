//! Retry schedule for completion requests.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

const FIRST_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF_DOUBLINGS: usize = 6;

/// Overload and transient failures a completion backend signals by status.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 425 | 429) || status.is_server_error()
}

pub(crate) fn is_transient_transport(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_body()
}

/// `Retry-After` in seconds or as an HTTP date. Dates in the past mean "now".
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let wait = retry_at.signed_duration_since(Utc::now());
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}

/// Attempts and wall-clock budget left for one completion call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetrySchedule {
    max_retries: usize,
    budget: Option<Duration>,
    jitter: bool,
    started: Instant,
}

impl RetrySchedule {
    /// A zero `budget_ms` leaves the retry count as the only bound.
    pub(crate) fn start(max_retries: usize, budget_ms: u64, jitter: bool) -> Self {
        Self {
            max_retries,
            budget: (budget_ms > 0).then(|| Duration::from_millis(budget_ms)),
            jitter,
            started: Instant::now(),
        }
    }

    /// Wait before the retry that follows failed attempt `attempt` (0-based),
    /// or `None` when retries or the budget are used up.
    pub(crate) fn delay_after(&self, attempt: usize, hint: Option<Duration>) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let mut delay = FIRST_BACKOFF * (1_u32 << attempt.min(MAX_BACKOFF_DOUBLINGS));
        if self.jitter {
            delay = jittered(delay);
        }
        if let Some(hint) = hint {
            delay = delay.max(hint);
        }
        match self.budget {
            Some(budget) if self.started.elapsed() + delay > budget => None,
            _ => Some(delay),
        }
    }
}

/// Somewhere in `[delay / 2, delay]`, spread by the clock's sub-second nanos.
fn jittered(delay: Duration) -> Duration {
    let half = delay / 2;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default();
    half + half.mul_f64(f64::from(nanos % 1_000) / 999.0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;

    use super::{is_transient_status, retry_after, RetrySchedule};

    #[test]
    fn unit_transient_statuses_cover_throttling_and_server_errors() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn functional_schedule_doubles_until_retries_run_out() {
        let schedule = RetrySchedule::start(3, 0, false);
        assert_eq!(schedule.delay_after(0, None), Some(Duration::from_millis(200)));
        assert_eq!(schedule.delay_after(2, None), Some(Duration::from_millis(800)));
        assert_eq!(schedule.delay_after(3, None), None);
    }

    #[test]
    fn regression_schedule_honors_hint_floor_and_budget() {
        let schedule = RetrySchedule::start(5, 1_000, false);
        assert_eq!(
            schedule.delay_after(0, Some(Duration::from_millis(700))),
            Some(Duration::from_millis(700))
        );
        assert_eq!(schedule.delay_after(0, Some(Duration::from_secs(2))), None);
    }

    #[test]
    fn functional_jittered_delay_stays_within_half_and_full_backoff() {
        let schedule = RetrySchedule::start(8, 0, true);
        for _ in 0..32 {
            let delay = schedule.delay_after(3, None).expect("delay");
            assert!(delay >= Duration::from_millis(800), "{delay:?}");
            assert!(delay <= Duration::from_millis(1_600), "{delay:?}");
        }
    }

    #[test]
    fn unit_retry_after_reads_seconds_and_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), Some(Duration::ZERO));
    }
}
