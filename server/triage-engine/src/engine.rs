//! Core engine: one explicit object holding every accumulated collection.
//!
//! Lines are folded strictly one at a time in caller order. Nothing is ever
//! evicted; a long-running tail must bound memory by taking a snapshot and
//! calling [`Engine::reset`] on its own schedule.

use crate::classify::{self, Classification};
use crate::config::Config;
use crate::correlation::CorrelationIndex;
use crate::decode::{self, StructuredRecord};
use crate::fingerprint;
use crate::latency::LatencyAggregator;
use crate::transaction::TransactionTracker;
use crate::types::*;

/// The classification-and-correlation engine.
pub struct Engine {
  config: Config,
  total_lines: u64,
  counts: CategoryCounts,
  structured: Vec<StructuredRecord>,
  structured_seen: u64,
  errors: Vec<String>,
  timeouts: Vec<String>,
  health_issues: Vec<String>,
  latency: LatencyAggregator,
  correlation: CorrelationIndex,
  transactions: TransactionTracker,
}

impl Engine {
  pub fn new(config: Config) -> Self {
    Self {
      config,
      total_lines: 0,
      counts: CategoryCounts::default(),
      structured: Vec::new(),
      structured_seen: 0,
      errors: Vec::new(),
      timeouts: Vec::new(),
      health_issues: Vec::new(),
      latency: LatencyAggregator::new(),
      correlation: CorrelationIndex::new(),
      transactions: TransactionTracker::new(),
    }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Feed one line. Never fails: lines matching nothing simply add no tags and no ids.
  pub fn ingest(&mut self, line: &str) -> Classification {
    self.total_lines += 1;

    let record = decode::decode(line);
    let classification = classify::classify(line, record.as_ref(), self.config.slow_call_threshold_ms);
    tracing::trace!(
      line_no = self.total_lines,
      tags = classification.tags.len(),
      structured = record.is_some(),
      "line classified"
    );

    if let Some(record) = record {
      self.structured_seen += 1;
      if self.config.retain_structured {
        self.structured.push(record);
      }
    }

    self.counts.record(&classification.tags);
    if classification.tags.contains(Category::Error) {
      self.errors.push(line.to_string());
    }
    if classification.tags.contains(Category::Timeout) {
      self.timeouts.push(line.to_string());
    }
    if classification.tags.contains(Category::ServiceHealthIssue) {
      self.health_issues.push(line.to_string());
    }
    self.latency.extend(classification.slow_samples.iter().cloned());

    self.correlation.record(line);
    self.transactions.ingest(line);

    classification
  }

  /// Feed lines in order.
  pub fn ingest_all<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
    for line in lines {
      self.ingest(line);
    }
  }

  /// Pure read of everything accumulated so far. Callable mid-stream.
  pub fn snapshot(&self) -> EngineSnapshot {
    let snapshot = EngineSnapshot {
      total_lines: self.total_lines,
      structured_records: self.structured_seen,
      counts: self.counts.clone(),
      errors: self.errors.clone(),
      timeouts: self.timeouts.clone(),
      service_health_issues: self.health_issues.clone(),
      correlation_ids: self.correlation.len(),
      correlation: self.correlation.entries().clone(),
      transactions: self.transactions.summaries(),
      latency: self.latency.report(&self.config.percentiles),
      error_groups: fingerprint::group(self.errors.iter().map(String::as_str), self.config.fingerprint_chars),
    };
    tracing::debug!(
      total_lines = snapshot.total_lines,
      transactions = snapshot.transactions.len(),
      error_groups = snapshot.error_groups.len(),
      "snapshot taken"
    );
    snapshot
  }

  /// Clear all state and start a new logical run. Configuration is kept.
  pub fn reset(&mut self) {
    tracing::debug!(total_lines = self.total_lines, "engine reset");
    *self = Self::new(self.config.clone());
  }

  pub fn total_lines(&self) -> u64 {
    self.total_lines
  }

  /// Decoded records, in order, when retention is enabled.
  pub fn structured_records(&self) -> &[StructuredRecord] {
    &self.structured
  }

  pub fn correlation(&self) -> &CorrelationIndex {
    &self.correlation
  }

  pub fn transactions(&self) -> &TransactionTracker {
    &self.transactions
  }
}

impl Default for Engine {
  fn default() -> Self {
    Self::with_defaults()
  }
}
