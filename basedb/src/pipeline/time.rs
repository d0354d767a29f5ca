// Time-value heuristics used when ordering documents

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const TIME_FIELDS: &[&str] = &["created_at", "updated_at", "timestamp", "date", "time"];

const TIME_PATTERNS: &[&str] = &[
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?$",
    r"^\d{4}-\d{2}-\d{2}$",
    r"^\d{2}/\d{2}/\d{4}$",
    r"^\d{2}\.\d{2}\.\d{4}$",
    r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"];

fn time_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        TIME_PATTERNS
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::error!("Invalid time pattern '{p}': {e}");
                    None
                }
            })
            .collect()
    })
}

/// Whether a field name conventionally holds a timestamp, e.g. `updated_at`
/// or `birth_date`.
pub fn is_time_field(field: &str) -> bool {
    TIME_FIELDS.iter().any(|tf| {
        field == *tf
            || field
                .strip_suffix(tf)
                .map_or(false, |prefix| prefix.ends_with('_'))
    })
}

/// Whether a value is shaped like a time: any number (epoch seconds) or
/// text in one of the common date/timestamp layouts.
pub fn looks_like_time(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => time_patterns().iter().any(|re| re.is_match(s)),
        _ => false,
    }
}

/// Parse a value as an instant. Numbers are epoch seconds (fractions kept);
/// text is tried against RFC3339, the fixed layouts, then integer epoch seconds.
pub fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch_seconds),
        Value::String(s) => parse_time_str(s),
        _ => None,
    }
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    s.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
