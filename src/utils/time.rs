// src/utils/time.rs

use std::sync::LazyLock;

use chrono::{DateTime, Local, Utc};
use regex::Regex;

use crate::error::AppError;

/// `YYYY-MM-DD[ T]HH:mm:ss(.fff)?` with no zone designator.
static NAIVE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2}:\d{2}(?:\.\d+)?)$")
        .unwrap_or_else(|e| unreachable!("static regex: {}", e))
});

/// Canonicalises a server timestamp as UTC.
///
/// The backend may send naive timestamps such as `2025-01-01 10:00:00`; those are
/// UTC and get rewritten to `2025-01-01T10:00:00Z`. Anything else (already carrying
/// `Z` or an offset) is returned unchanged.
pub fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    match NAIVE_TIMESTAMP.captures(trimmed) {
        Some(caps) => format!("{}T{}Z", &caps[1], &caps[2]),
        None => trimmed.to_string(),
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let normalized = normalize_timestamp(raw);
    Ok(DateTime::parse_from_rfc3339(&normalized)?.with_timezone(&Utc))
}

/// Human relative time, e.g. "just now", "5 minutes ago", "3 days ago".
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    if secs < 45 {
        // Covers small clock skew where the server is slightly ahead.
        return "just now".to_string();
    }

    let (value, unit) = match secs {
        s if s < 3_600 => ((s + 30) / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 2_592_000 => (s / 86_400, "day"),
        s if s < 31_536_000 => (s / 2_592_000, "month"),
        s => (s / 31_536_000, "year"),
    };
    let value = value.max(1);

    if value == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", value, unit)
    }
}

/// Timestamp in the viewer's local zone, for tooltips and detail views.
pub fn local_display(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
