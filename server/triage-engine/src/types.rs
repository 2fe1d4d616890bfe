//! Core types for the triage engine (classification tags + snapshot contracts).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Operational category a line can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  Error,
  Timeout,
  SlowCall,
  ServiceHealthIssue,
}

/// Set of categories attached to one line. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassificationTags(BTreeSet<Category>);

impl ClassificationTags {
  pub fn insert(&mut self, category: Category) {
    self.0.insert(category);
  }

  pub fn contains(&self, category: Category) -> bool {
    self.0.contains(&category)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = Category> + '_ {
    self.0.iter().copied()
  }
}

impl FromIterator<Category> for ClassificationTags {
  fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

// ---------------------------------------------------------------------------
// Transaction diagnosis
// ---------------------------------------------------------------------------

/// Terminal diagnostic label of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RootCause {
  MissingPapiRequest,
  MissingPapiResponse,
  WebSocketDisconnect,
  MissingTapiRequest,
  TapiOffline,
  MissingTapiResponse,
  Ok,
  MissingDurableWrite,
  Unknown,
}

impl RootCause {
  pub fn label(self) -> &'static str {
    match self {
      Self::MissingPapiRequest => "Missing PAPI Request",
      Self::MissingPapiResponse => "Missing PAPI Response",
      Self::WebSocketDisconnect => "WebSocket Disconnect between PAPI & TAPI",
      Self::MissingTapiRequest => "Missing TAPI Request",
      Self::TapiOffline => "TAPI sent to Offline Table",
      Self::MissingTapiResponse => "Missing TAPI Response",
      Self::Ok => "OK",
      Self::MissingDurableWrite => "Missing Kinesis + DynamoDB Success Message",
      Self::Unknown => "UNKNOWN",
    }
  }
}

impl fmt::Display for RootCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl Serialize for RootCause {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.label())
  }
}

/// A captured PAPI/TAPI response: the code's digits as logged plus the status/outcome token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
  pub code: String,
  pub status: String,
}

impl CapturedResponse {
  /// Numeric code, `None` when it does not fit a `u64`.
  pub fn code_value(&self) -> Option<u64> {
    self.code.parse().ok()
  }

  /// Client/server error range, judged on the leading digit of the code.
  pub fn is_error_code(&self) -> bool {
    self.code.starts_with('4') || self.code.starts_with('5')
  }
}

impl fmt::Display for CapturedResponse {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.code, self.status)
  }
}

// ---------------------------------------------------------------------------
// Output types (JSON contract — what a renderer consumes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
  pub error: u64,
  pub timeout: u64,
  pub slow_call: u64,
  pub service_health_issue: u64,
}

impl CategoryCounts {
  pub fn record(&mut self, tags: &ClassificationTags) {
    for category in tags.iter() {
      match category {
        Category::Error => self.error += 1,
        Category::Timeout => self.timeout += 1,
        Category::SlowCall => self.slow_call += 1,
        Category::ServiceHealthIssue => self.service_health_issue += 1,
      }
    }
  }

  pub fn get(&self, category: Category) -> u64 {
    match category {
      Category::Error => self.error,
      Category::Timeout => self.timeout,
      Category::SlowCall => self.slow_call,
      Category::ServiceHealthIssue => self.service_health_issue,
    }
  }
}

/// Recurring error signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorGroup {
  pub group_id: String,
  pub fingerprint: String,
  pub count: u64,
  pub exemplar_line: String,
}

/// One reported percentile. `value_ms` is `None` when there were no valid samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileValue {
  pub rank: f64,
  pub value_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyReport {
  /// Slow-call composites (`"<ms> ms : <line>"`) in discovery order.
  pub samples: Vec<String>,
  /// Number of samples whose leading value parsed as a positive integer.
  pub valid_samples: usize,
  pub percentiles: Vec<PercentileValue>,
}

impl LatencyReport {
  /// Value at percentile rank `rank`, if that rank was requested and samples exist.
  pub fn get(&self, rank: f64) -> Option<u64> {
    self
      .percentiles
      .iter()
      .find(|p| (p.rank - rank).abs() < 1e-9)
      .and_then(|p| p.value_ms)
  }

  pub fn p50(&self) -> Option<u64> {
    self.get(0.50)
  }

  pub fn p90(&self) -> Option<u64> {
    self.get(0.90)
  }

  pub fn p99(&self) -> Option<u64> {
    self.get(0.99)
  }
}

/// Read-only view of one transaction record with its diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSummary {
  pub id: String,
  pub root_cause: RootCause,
  pub abnormal: bool,
  pub papi_request_seen: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub papi_response: Option<String>,
  pub tapi_request_seen: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tapi_response: Option<String>,
  pub side_channel_confirmed: bool,
  pub channel_dropped: bool,
  pub offline_fallback: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_seen: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_seen: Option<String>,
  pub scheduler_touches: Vec<String>,
  pub raw_lines: Vec<String>,
}

/// Immutable read of all accumulated engine state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
  pub total_lines: u64,
  pub structured_records: u64,
  pub counts: CategoryCounts,
  pub errors: Vec<String>,
  pub timeouts: Vec<String>,
  pub service_health_issues: Vec<String>,
  pub correlation_ids: usize,
  pub correlation: BTreeMap<String, Vec<String>>,
  /// Sorted by transaction id.
  pub transactions: Vec<TransactionSummary>,
  pub latency: LatencyReport,
  pub error_groups: Vec<ErrorGroup>,
}

impl EngineSnapshot {
  pub fn to_json(&self, pretty: bool) -> Result<String, EngineError> {
    let out = if pretty {
      serde_json::to_string_pretty(self)?
    } else {
      serde_json::to_string(self)?
    };
    Ok(out)
  }

  pub fn transaction(&self, id: &str) -> Option<&TransactionSummary> {
    let id = id.to_ascii_lowercase();
    self
      .transactions
      .binary_search_by(|t| t.id.as_str().cmp(id.as_str()))
      .ok()
      .map(|i| &self.transactions[i])
  }

  pub fn abnormal_transactions(&self) -> impl Iterator<Item = &TransactionSummary> {
    self.transactions.iter().filter(|t| t.abnormal)
  }

  /// Transactions per root cause, most frequent first; ties ordered by label.
  pub fn root_cause_counts(&self) -> Vec<(RootCause, u64)> {
    let mut counts: BTreeMap<RootCause, u64> = BTreeMap::new();
    for t in &self.transactions {
      *counts.entry(t.root_cause).or_insert(0) += 1;
    }
    let mut out: Vec<(RootCause, u64)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.label().cmp(b.0.label())));
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn root_cause_serializes_as_label() {
    let json = serde_json::to_string(&RootCause::WebSocketDisconnect).unwrap();
    assert_eq!(json, "\"WebSocket Disconnect between PAPI & TAPI\"");
  }

  #[test]
  fn captured_response_error_range() {
    let server = CapturedResponse { code: "503".into(), status: "FAILED".into() };
    let client = CapturedResponse { code: "404".into(), status: "NOT_FOUND".into() };
    let ok = CapturedResponse { code: "200".into(), status: "SUCCESS".into() };
    assert!(server.is_error_code());
    assert!(client.is_error_code());
    assert!(!ok.is_error_code());
    assert_eq!(server.to_string(), "503 FAILED");
    assert_eq!(ok.code_value(), Some(200));
  }

  #[test]
  fn oversized_code_keeps_its_digits() {
    let huge = CapturedResponse { code: "50000000000000000000000".into(), status: "FAILED".into() };
    assert_eq!(huge.code_value(), None);
    assert!(huge.is_error_code());
    assert_eq!(huge.to_string(), "50000000000000000000000 FAILED");
  }

  #[test]
  fn category_counts_follow_tags() {
    let mut counts = CategoryCounts::default();
    let tags: ClassificationTags = [Category::Error, Category::SlowCall].into_iter().collect();
    counts.record(&tags);
    counts.record(&ClassificationTags::default());
    assert_eq!(counts.get(Category::Error), 1);
    assert_eq!(counts.get(Category::SlowCall), 1);
    assert_eq!(counts.get(Category::Timeout), 0);
  }

  #[test]
  fn absent_percentile_serializes_as_null() {
    let report = LatencyReport {
      samples: vec![],
      valid_samples: 0,
      percentiles: vec![PercentileValue { rank: 0.5, value_ms: None }],
    };
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"value_ms\":null"));
    assert_eq!(report.p50(), None);
  }
}
