//! Pure helpers every adapter uses to build a [`UnifiedItem`](crate::UnifiedItem).
//!
//! Nothing in here performs I/O or fails loudly: bad input degrades to an
//! empty string, `None`, or zero.

use crate::types::SourceType;
use chrono::{DateTime, NaiveDate, Utc};
use url::Url;

/// Title used when an upstream payload has none.
pub const UNTITLED: &str = "(untitled)";

/// Build an adapter-prefixed item id, e.g. `news_123`.
pub fn item_id(source: SourceType, raw_id: &str) -> String {
    format!("{}_{}", source.id_prefix(), raw_id.trim())
}

/// Returns the URL in canonical form if it is an absolute `http(s)` URL with
/// a host, otherwise the empty string.
pub fn validate_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => url.into(),
        _ => String::new(),
    }
}

pub fn validate_optional_url(raw: Option<&str>) -> String {
    raw.map(validate_url).unwrap_or_default()
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop HTML tags and decode the handful of entities upstream APIs emit in
/// plain-text fields.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&#x2F;", "/")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Whitespace-normalize `text` and cut it to at most `max_chars` characters,
/// ending with an ellipsis when something was cut.
pub fn clamp_summary(text: &str, max_chars: usize) -> String {
    let collapsed = collapse_whitespace(text);
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    if max_chars == 0 {
        return String::new();
    }

    let mut clamped: String = collapsed.chars().take(max_chars - 1).collect();
    let trimmed_len = clamped.trim_end().len();
    clamped.truncate(trimmed_len);
    clamped.push('…');
    clamped
}

/// Collapsed title, or [`UNTITLED`] when the upstream value is missing or blank.
pub fn title_or_placeholder(raw: Option<&str>) -> String {
    let title = raw.map(collapse_whitespace).unwrap_or_default();
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// Parse the timestamp formats seen across the upstream APIs: RFC 3339,
/// RFC 2822, bare `YYYY-MM-DD` dates (midnight UTC) and unix seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    raw.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
}

pub fn timestamp_from_unix(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    DateTime::from_timestamp(secs.trunc() as i64, 0)
}

/// Upstream counters can be negative (down-voted posts); the unified schema
/// cannot.
pub fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}

/// Compact human-readable count: `999`, `1.2k`, `3.4M`.
pub fn format_score(score: u64) -> String {
    fn scaled(value: u64, unit: u64, suffix: &str) -> String {
        let tenths = value * 10 / unit;
        if tenths % 10 == 0 {
            format!("{}{}", tenths / 10, suffix)
        } else {
            format!("{}.{}{}", tenths / 10, tenths % 10, suffix)
        }
    }

    match score {
        0..=999 => score.to_string(),
        1_000..=999_999 => scaled(score, 1_000, "k"),
        _ => scaled(score, 1_000_000, "M"),
    }
}
