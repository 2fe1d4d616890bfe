//! Leading ISO-8601 timestamp extraction for transaction timelines.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

// 2025-11-20T14:23:45.123Z, 2025-11-20 14:23:45, [2025-11-20 14:23:45.123+02:00]
static LEADING_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^\[?(\d{4}-\d{2}-\d{2})[T ](\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?)(Z|[+-]\d{2}:\d{2})?")
    .expect("timestamp pattern compiles")
});

/// Timestamp at the start of `line`. Values without an offset are taken as UTC.
pub fn extract(line: &str) -> Option<DateTime<Utc>> {
  let caps = LEADING_TIMESTAMP.captures(line.trim_start())?;
  let (date, time) = (&caps[1], &caps[2]);
  match caps.get(3) {
    Some(offset) => DateTime::parse_from_rfc3339(&format!("{date}T{time}{}", offset.as_str()))
      .ok()
      .map(|dt| dt.with_timezone(&Utc)),
    None => NaiveDateTime::parse_from_str(&format!("{date}T{time}"), "%Y-%m-%dT%H:%M:%S%.f")
      .ok()
      .map(|naive| naive.and_utc()),
  }
}
