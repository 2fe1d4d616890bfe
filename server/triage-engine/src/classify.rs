//! Rule-based line classification: error, timeout, slow call, service health.
//!
//! The four rules are evaluated independently against the same line, so one
//! line may carry several tags. Classification is stateless across lines.

use std::sync::LazyLock;

use regex::Regex;

use crate::decode::StructuredRecord;
use crate::types::{Category, ClassificationTags};

static ERROR_TEXT: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)(\b(?:error|fatal|panic|traceback)\b|exception)").expect("error pattern compiles")
});

static TIMEOUT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)(timeout|timed\s+out|time\s+out|deadline\s+exceeded|etimedout)")
    .expect("timeout pattern compiles")
});

static HEALTH_TEXT: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(concat!(
    r"(?i)(failed to connect|unable to connect|connection refused",
    r#"|\bstatus(?:code)?"?\s*[:=]\s*"?0"?(?:[^0-9.]|$)"#,
    r#"|\bhealthy"?\s*[:=]\s*"?false\b|\bunhealthy\b)"#,
  ))
  .expect("health pattern compiles")
});

/// `key="123"` latency fields embedded in free text.
static LATENCY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"\b(?:completeReqTTms|reqTTms|durationMs|latencyMs|elapsedMs|responseTimeMs)="(\d+)""#)
    .expect("latency field pattern compiles")
});

/// Structured duration keys, in lookup priority.
const DURATION_KEYS: &[&str] = &["durationMs", "duration_ms", "latencyMs", "elapsedMs", "responseTimeMs"];

/// Tags for one line plus the slow-call composites it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
  pub tags: ClassificationTags,
  /// `"<ms> ms : <original line>"`, one per slow-call match.
  pub slow_samples: Vec<String>,
}

/// Classify `line`, using `record` (the decoded view of the same line) when present.
pub fn classify(line: &str, record: Option<&StructuredRecord>, slow_threshold_ms: u64) -> Classification {
  let mut out = Classification::default();

  if is_error(line, record) {
    out.tags.insert(Category::Error);
  }
  if TIMEOUT_TEXT.is_match(line) {
    out.tags.insert(Category::Timeout);
  }
  if HEALTH_TEXT.is_match(line) {
    out.tags.insert(Category::ServiceHealthIssue);
  }

  out.slow_samples = slow_calls(line, record, slow_threshold_ms);
  if !out.slow_samples.is_empty() {
    out.tags.insert(Category::SlowCall);
  }

  out
}

fn is_error(line: &str, record: Option<&StructuredRecord>) -> bool {
  if ERROR_TEXT.is_match(line) {
    return true;
  }
  let Some(record) = record else {
    return false;
  };
  let level_error = record
    .get_string("level")
    .is_some_and(|level| level.eq_ignore_ascii_case("error"));
  let status_500 = record.get_number("status").is_some_and(|s| s == 500.0);
  level_error || status_500
}

fn slow_calls(line: &str, record: Option<&StructuredRecord>, threshold_ms: u64) -> Vec<String> {
  let mut samples = Vec::new();

  // Digit runs too long for u64 are dropped, not clamped.
  for caps in LATENCY_FIELD.captures_iter(line) {
    if let Ok(ms) = caps[1].parse::<u64>() {
      if ms > threshold_ms {
        samples.push(slow_sample(ms, line));
      }
    }
  }

  // Compared after truncation so the stored sample itself exceeds the threshold.
  if let Some(duration) = record.and_then(|r| r.first_number(DURATION_KEYS)) {
    if duration >= 0.0 && duration < u64::MAX as f64 {
      let ms = duration.trunc() as u64;
      if ms > threshold_ms {
        samples.push(slow_sample(ms, line));
      }
    }
  }

  samples
}

/// Composite stored in the slow-call collection; the latency aggregator re-parses the leading number.
pub fn slow_sample(ms: u64, line: &str) -> String {
  format!("{ms} ms : {line}")
}
