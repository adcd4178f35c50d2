//! Detection of server-imposed cooldowns from rate-limit responses.
//!
//! Providers signal throttling in different ways: a `Retry-After` header
//! holding seconds or an HTTP date, a human-readable "Retry in N minutes"
//! phrase, or a 400 whose body says the daily request limit was hit. All of
//! them collapse into a single [`Cooldown`] instant.
//!
//! Numeric and date hints have the local limiter interval subtracted. The
//! provider's reset time is assumed to already include one interval of the
//! client's own pacing, so the client resumes one interval early and lets its
//! limiter absorb the difference.

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::HeaderMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, instrument};

/// Statuses treated as rate-limit signals, exempt from breaker failure counting.
pub const RATE_LIMIT_STATUSES: [u16; 4] = [429, 400, 401, 403];

/// Cooldown applied when a retry hint is present but unreadable.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Cooldown applied when a 400 body reports an exhausted daily quota.
pub const DAILY_QUOTA_COOLDOWN: Duration = Duration::from_secs(3 * 60 * 60);

const RETRY_HEADERS: [&str; 2] = ["retry-after", "x-retry-after"];
const DAILY_QUOTA_PHRASE: &str = "request limit reached";

static RETRY_PHRASE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)request limit reached\.?\s*retry in\s+(\d+)\s*(second|sec|minute|min|hour|hr)s?")
        .ok()
});

/// Returns true when `status` is one of [`RATE_LIMIT_STATUSES`].
pub fn is_rate_limit_status(status: u16) -> bool {
    RATE_LIMIT_STATUSES.contains(&status)
}

/// Which signal produced a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CooldownSource {
    /// "Request limit reached. Retry in N unit" phrase.
    #[display("retry phrase")]
    RetryPhrase,
    /// Integer seconds in a retry header.
    #[display("retry seconds")]
    Seconds,
    /// HTTP date in a retry header.
    #[display("retry date")]
    Date,
    /// Retry header present but unreadable.
    #[display("unparseable retry header")]
    Unparseable,
    /// 400 body reporting an exhausted daily quota.
    #[display("daily quota body")]
    DailyQuota,
}

/// Instant until which the provider asked us to stop calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    /// First instant at which calls may resume.
    pub until: DateTime<Utc>,
    /// Signal the cooldown was derived from.
    pub source: CooldownSource,
}

impl Cooldown {
    fn after(now: DateTime<Utc>, wait: Duration, source: CooldownSource) -> Self {
        Self {
            until: shift(now, wait),
            source,
        }
    }
}

/// Derive a server cooldown from a response, if it carries one.
///
/// Only meaningful for statuses in [`RATE_LIMIT_STATUSES`]; any other status
/// returns `None`. `limiter_interval` is the primary window length, or zero
/// when no primary window is configured.
///
/// # Example
///
/// ```
/// use bulwark_rate_limit::{CooldownSource, detect_cooldown};
/// use chrono::Utc;
/// use reqwest::header::HeaderMap;
/// use std::time::Duration;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("Retry-After", "120".parse().unwrap());
/// let now = Utc::now();
/// let cooldown = detect_cooldown(429, &headers, "", Duration::from_secs(20), now).unwrap();
/// assert_eq!(cooldown.source, CooldownSource::Seconds);
/// assert_eq!((cooldown.until - now).num_seconds(), 100);
/// ```
#[instrument(skip(headers, body), fields(body_len = body.len()))]
pub fn detect_cooldown(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    limiter_interval: Duration,
    now: DateTime<Utc>,
) -> Option<Cooldown> {
    if !is_rate_limit_status(status) {
        return None;
    }

    let header = RETRY_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .map(|value| value.to_str().unwrap_or_default().trim().to_string());

    let cooldown = match header {
        Some(value) => Some(parse_retry_header(&value, limiter_interval, now)),
        None if status == 400 && body.to_lowercase().contains(DAILY_QUOTA_PHRASE) => Some(
            Cooldown::after(now, DAILY_QUOTA_COOLDOWN, CooldownSource::DailyQuota),
        ),
        None => None,
    };

    if let Some(cooldown) = &cooldown {
        debug!(until = %cooldown.until, source = %cooldown.source, "Detected server cooldown");
    }
    cooldown
}

/// Interpret a retry header value.
///
/// Precedence: retry phrase, integer seconds, RFC 1123 date, RFC 3339 date,
/// then [`DEFAULT_COOLDOWN`] for anything else.
pub fn parse_retry_header(value: &str, limiter_interval: Duration, now: DateTime<Utc>) -> Cooldown {
    if let Some(wait) = parse_retry_phrase(value) {
        return Cooldown::after(now, wait, CooldownSource::RetryPhrase);
    }

    let interval = to_chrono(limiter_interval);

    if let Ok(seconds) = value.parse::<u64>() {
        let until = shift(now, Duration::from_secs(seconds));
        return Cooldown {
            until: until.checked_sub_signed(interval).unwrap_or(until),
            source: CooldownSource::Seconds,
        };
    }

    let date = DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|date| date.with_timezone(&Utc));
    if let Ok(date) = date {
        return Cooldown {
            until: date.checked_sub_signed(interval).unwrap_or(date),
            source: CooldownSource::Date,
        };
    }

    Cooldown::after(now, DEFAULT_COOLDOWN, CooldownSource::Unparseable)
}

fn parse_retry_phrase(value: &str) -> Option<Duration> {
    let captures = RETRY_PHRASE.as_ref()?.captures(value)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = match captures.get(2)?.as_str().to_lowercase().as_str() {
        "hour" | "hr" => 3600,
        "minute" | "min" => 60,
        _ => 1,
    };
    Some(Duration::from_secs(amount.saturating_mul(unit)))
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

fn shift(now: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_chrono(wait))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, value.parse().unwrap());
        map
    }

    #[test]
    fn phrase_wins_over_interval_subtraction() {
        let cooldown = parse_retry_header(
            "Request limit reached. Retry in 10 minutes",
            Duration::from_secs(20),
            now(),
        );
        assert_eq!(cooldown.source, CooldownSource::RetryPhrase);
        assert_eq!(cooldown.until, now() + chrono::Duration::minutes(10));
    }

    #[test]
    fn phrase_understands_hours_and_seconds() {
        let hours = parse_retry_header("Request limit reached. Retry in 2 hours", Duration::ZERO, now());
        assert_eq!(hours.until, now() + chrono::Duration::hours(2));

        let seconds = parse_retry_header("request limit reached retry in 45 seconds", Duration::ZERO, now());
        assert_eq!(seconds.until, now() + chrono::Duration::seconds(45));
    }

    #[test]
    fn integer_seconds_subtract_interval() {
        let cooldown = parse_retry_header("120", Duration::from_secs(20), now());
        assert_eq!(cooldown.source, CooldownSource::Seconds);
        assert_eq!(cooldown.until, now() + chrono::Duration::seconds(100));
    }

    #[test]
    fn rfc1123_date_subtracts_interval() {
        let cooldown = parse_retry_header("Fri, 14 Mar 2025 12:10:00 GMT", Duration::from_secs(60), now());
        assert_eq!(cooldown.source, CooldownSource::Date);
        assert_eq!(cooldown.until, now() + chrono::Duration::minutes(9));
    }

    #[test]
    fn rfc3339_date_is_accepted() {
        let cooldown = parse_retry_header("2025-03-14T13:00:00Z", Duration::ZERO, now());
        assert_eq!(cooldown.source, CooldownSource::Date);
        assert_eq!(cooldown.until, now() + chrono::Duration::hours(1));
    }

    #[test]
    fn garbage_falls_back_to_five_minutes() {
        let cooldown = parse_retry_header("soon-ish", Duration::from_secs(20), now());
        assert_eq!(cooldown.source, CooldownSource::Unparseable);
        assert_eq!(cooldown.until, now() + chrono::Duration::minutes(5));
    }

    #[test]
    fn x_retry_after_is_honored() {
        let cooldown = detect_cooldown(429, &headers("x-retry-after", "30"), "", Duration::ZERO, now());
        assert_eq!(cooldown.map(|c| c.until), Some(now() + chrono::Duration::seconds(30)));
    }

    #[test]
    fn daily_quota_body_blocks_for_three_hours() {
        let cooldown = detect_cooldown(
            400,
            &HeaderMap::new(),
            "{\"error\":\"Request limit reached\"}",
            Duration::from_secs(20),
            now(),
        )
        .unwrap();
        assert_eq!(cooldown.source, CooldownSource::DailyQuota);
        assert_eq!(cooldown.until, now() + chrono::Duration::hours(3));
    }

    #[test]
    fn quota_body_only_counts_for_400() {
        let body = "request limit reached";
        assert!(detect_cooldown(403, &HeaderMap::new(), body, Duration::ZERO, now()).is_none());
        assert!(detect_cooldown(429, &HeaderMap::new(), "", Duration::ZERO, now()).is_none());
    }

    #[test]
    fn non_rate_limit_statuses_are_ignored() {
        assert!(detect_cooldown(503, &headers("retry-after", "10"), "", Duration::ZERO, now()).is_none());
        assert!(!is_rate_limit_status(500));
        assert!(is_rate_limit_status(401));
    }
}
