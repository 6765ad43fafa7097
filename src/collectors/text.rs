//! Text and date cleanup shared by the feed parsers.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Regex pattern for HTML tags, including multi-line ones.
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<[^>]*>").unwrap_or_else(|_| unreachable!()));

/// Regex pattern for runs of whitespace.
static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap_or_else(|_| unreachable!()));

/// Decodes entities, strips tags and collapses whitespace.
///
/// Feed text arrives either entity-escaped (`&lt;p&gt;`) or as raw markup in
/// CDATA; decoding first makes both shapes look the same before stripping.
#[must_use]
pub fn clean_html(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let stripped = TAG_PATTERN.replace_all(&decoded, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    WHITESPACE_PATTERN
        .replace_all(&decoded, " ")
        .trim()
        .to_string()
}

/// Parses the date formats found in RSS, Atom and Dublin Core fields.
///
/// Tries RFC 2822, RFC 3339, then a bare `YYYY-MM-DD` taken as midnight UTC.
#[must_use]
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}
