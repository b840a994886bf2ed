//! Cache-related HTTP header parsing.
//!
//! Timestamps are whole seconds since the UNIX epoch. `max_age` is always a
//! duration computed from two timestamps on the same basis: the response
//! `Date` when the server sent one, otherwise the local clock for both.

use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, CACHE_CONTROL, DATE, ETAG, EXPIRES, LAST_MODIFIED};

/// Used when a response carries no freshness information at all.
pub const FALLBACK_MAX_AGE: f64 = 60.0;
/// Cap on the max-age guessed from `Last-Modified`.
pub const MAX_HEURISTIC_AGE: f64 = 24.0 * 60.0 * 60.0;

static MAX_AGE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[^-\w])max-age\W*=\W*(\d+)").expect("valid regex"));

/// Parse an HTTP date (IMF-fixdate, RFC 850 or asctime).
pub fn parse_http_date(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp());
    }
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.and_utc().timestamp())
}

/// Format a timestamp as an IMF-fixdate for `If-Modified-Since`.
pub fn format_http_date(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn last_modified_from_headers(headers: &HeaderMap) -> Option<i64> {
    header_str(headers, LAST_MODIFIED).and_then(parse_http_date)
}

pub fn etag_from_headers(headers: &HeaderMap) -> Option<String> {
    header_str(headers, ETAG)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The server's idea of "now", falling back to `local_now`.
pub fn server_date(headers: &HeaderMap, local_now: f64) -> f64 {
    header_str(headers, DATE)
        .and_then(parse_http_date)
        .map(|t| t as f64)
        .unwrap_or(local_now)
}

/// Seconds from retrieval during which a response may be reused without
/// revalidation.
///
/// Sources, first usable wins: `Cache-Control: max-age=N`, a bare `max-age`
/// header, `Expires - Date`, a tenth of `Date - Last-Modified` capped at a
/// day, and finally [`FALLBACK_MAX_AGE`]. Malformed values are skipped.
pub fn max_age_from_headers(headers: &HeaderMap, local_now: f64) -> f64 {
    if let Some(secs) = header_str(headers, CACHE_CONTROL)
        .and_then(|cc| MAX_AGE_DIRECTIVE.captures(cc))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
    {
        return secs as f64;
    }

    if let Some(secs) = header_str(headers, "max-age").and_then(|v| v.trim().parse::<u64>().ok()) {
        return secs as f64;
    }

    let date = server_date(headers, local_now);

    if let Some(expires) = header_str(headers, EXPIRES).and_then(parse_http_date) {
        return (expires as f64 - date).max(0.0);
    }

    if let Some(last_modified) = last_modified_from_headers(headers) {
        return ((date - last_modified as f64) / 10.0).clamp(0.0, MAX_HEURISTIC_AGE);
    }

    FALLBACK_MAX_AGE
}
