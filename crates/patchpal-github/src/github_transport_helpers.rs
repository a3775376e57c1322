use std::time::Duration;

use chrono::{DateTime, Utc};

const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Return true when a GitHub response status warrants another attempt.
pub fn is_retryable_github_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Parse a `Retry-After` header given in seconds or as an HTTP date.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at
        .signed_duration_since(Utc::now())
        .num_milliseconds()
        .max(0);
    Some(Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0)))
}

/// Exponential delay from `base_delay_ms`, floored by any server hint and capped.
pub fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    let shift = attempt.saturating_sub(1).min(6) as u32;
    let backoff_ms = base_delay_ms
        .saturating_mul(1_u64 << shift)
        .min(MAX_RETRY_DELAY_MS);
    let backoff = Duration::from_millis(backoff_ms);
    match retry_after {
        Some(hint) => backoff.max(hint),
        None => backoff,
    }
}

/// Truncate `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
