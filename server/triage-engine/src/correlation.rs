//! Group lines by the UUID-shaped correlation token they carry.
//!
//! Purely observational: the index never feeds classification.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static UUID_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
    .expect("uuid pattern compiles")
});

/// First UUID-shaped token in `line`, lowercased.
pub fn find_token(line: &str) -> Option<String> {
  UUID_TOKEN.find(line).map(|m| m.as_str().to_ascii_lowercase())
}

/// Token → lines containing it, in insertion order. Additive only.
#[derive(Debug, Clone, Default)]
pub struct CorrelationIndex {
  entries: BTreeMap<String, Vec<String>>,
}

impl CorrelationIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append `line` under its first correlation token. Returns the token, if any.
  pub fn record(&mut self, line: &str) -> Option<String> {
    let token = find_token(line)?;
    self.entries.entry(token.clone()).or_default().push(line.to_string());
    Some(token)
  }

  pub fn lines(&self, token: &str) -> Option<&[String]> {
    self.entries.get(&token.to_ascii_lowercase()).map(Vec::as_slice)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(&self) -> &BTreeMap<String, Vec<String>> {
    &self.entries
  }
}
