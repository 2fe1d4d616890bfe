//! Best-effort JSON decode of lines that look like objects.
//!
//! Decode failure is a silent fallback: the caller gets `None` and the line is
//! classified on its text alone.

use serde::Serialize;
use serde_json::{Map, Value};

/// Decoded field map of one JSON-object line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StructuredRecord {
  fields: Map<String, Value>,
}

impl StructuredRecord {
  pub fn fields(&self) -> &Map<String, Value> {
    &self.fields
  }

  /// String value of `key`; numbers and booleans are not coerced.
  pub fn get_string(&self, key: &str) -> Option<&str> {
    self.fields.get(key).and_then(Value::as_str)
  }

  /// Numeric value of `key`. A string holding a number is accepted, since
  /// loggers often quote numeric fields.
  pub fn get_number(&self, key: &str) -> Option<f64> {
    match self.fields.get(key)? {
      Value::Number(n) => n.as_f64(),
      Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
      _ => None,
    }
  }

  /// First of `keys` that yields a number.
  pub fn first_number(&self, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| self.get_number(k))
  }
}

/// Decode `line` when its trimmed content starts with `{` and parses as a JSON object.
pub fn decode(line: &str) -> Option<StructuredRecord> {
  let trimmed = line.trim();
  if !trimmed.starts_with('{') {
    return None;
  }
  match serde_json::from_str::<Value>(trimmed) {
    Ok(Value::Object(fields)) => Some(StructuredRecord { fields }),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_object_line_with_leading_whitespace() {
    let rec = decode(r#"   {"level":"error","durationMs":512}"#).unwrap();
    assert_eq!(rec.get_string("level"), Some("error"));
    assert_eq!(rec.get_number("durationMs"), Some(512.0));
  }

  #[test]
  fn non_object_lines_are_skipped() {
    assert!(decode("ERROR: disk full").is_none());
    assert!(decode("[1, 2, 3]").is_none());
    assert!(decode("").is_none());
  }

  #[test]
  fn malformed_json_is_silent_none() {
    assert!(decode(r#"{"level": "error""#).is_none());
    assert!(decode("{not json at all}").is_none());
  }

  #[test]
  fn typed_accessors_signal_absence() {
    let rec = decode(r#"{"status":500,"level":true,"durationMs":"420","note":"abc"}"#).unwrap();
    assert_eq!(rec.get_string("status"), None);
    assert_eq!(rec.get_string("level"), None);
    assert_eq!(rec.get_number("status"), Some(500.0));
    assert_eq!(rec.get_number("durationMs"), Some(420.0));
    assert_eq!(rec.get_number("note"), None);
    assert_eq!(rec.get_number("missing"), None);
  }

  #[test]
  fn first_number_follows_key_priority() {
    let rec = decode(r#"{"latencyMs":100,"duration_ms":700}"#).unwrap();
    assert_eq!(rec.first_number(&["durationMs", "duration_ms", "latencyMs"]), Some(700.0));
  }
}
