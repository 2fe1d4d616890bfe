//! Per-transaction lifecycle tracking: fold PAPI/TAPI evidence into a root cause.
//!
//! Flags only ever flip false -> true. The two captured responses are
//! last-write-wins, which makes them sensitive to the relative order of
//! same-transaction response lines.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

use crate::correlation;
use crate::timestamp;
use crate::types::{CapturedResponse, RootCause, TransactionSummary};

fn rule(pattern: &str) -> Regex {
  Regex::new(pattern).expect("transaction rule compiles")
}

static TAGGED_ID: LazyLock<Regex> =
  LazyLock::new(|| rule(r#"(?i)transaction[_-]?id["']?\s*[:=]\s*["']?([0-9a-z-]{36})(?:[^0-9a-z-]|$)"#));

static PAPI_REQUEST: LazyLock<Regex> =
  LazyLock::new(|| rule(r"(?i)(\b(?:POST|PUT|PATCH|GET)\s+\S*/papi/|\bpapi\s+request\b)"));

static PAPI_RESPONSE: LazyLock<Regex> =
  LazyLock::new(|| rule(r#"(?i)"statusCode"\s*:\s*(\d+)\s*,\s*"status"\s*:\s*"([^"]*)""#));

static TAPI_REQUEST: LazyLock<Regex> =
  LazyLock::new(|| rule(r"(?i)(\b(?:POST|PUT|PATCH|GET)\s+\S*/tapi/|\btapi\s+request\b)"));

static TAPI_RESPONSE: LazyLock<Regex> =
  LazyLock::new(|| rule(r#"(?i)"responseCode"\s*:\s*(\d+)\s*,\s*"outcome"\s*:\s*"([^"]*)""#));

static DURABLE_WRITE: LazyLock<Regex> = LazyLock::new(|| rule(r"(?i)\bkinesis\b.*\bdynamo(?:db)?\b.*\bsuccess"));

static DISCONNECT: LazyLock<Regex> =
  LazyLock::new(|| rule(r"(?i)(\bweb\s?socket\b.*\b(?:disconnect(?:ed)?|closed)\b|socket hang up)"));

static OFFLINE: LazyLock<Regex> =
  LazyLock::new(|| rule(r"(?i)(offline[ _]table|offline[ _]queue|sent to offline|offlineexception)"));

static SCHEDULER: LazyLock<Regex> = LazyLock::new(|| rule(r"(?i)(\bscheduler\b.*\bjob\b|\bscheduled job\b)"));

const TAPI_SUCCESS_OUTCOMES: &[&str] = &["SUCCESS", "APPROVED", "OK", "COMPLETED"];

/// Transaction id for `line`: an explicitly tagged id first, else a bare UUID token.
pub fn resolve_id(line: &str) -> Option<String> {
  TAGGED_ID
    .captures(line)
    .map(|caps| caps[1].to_ascii_lowercase())
    .or_else(|| correlation::find_token(line))
}

pub fn is_scheduler_marker(line: &str) -> bool {
  SCHEDULER.is_match(line)
}

fn capture_response(re: &Regex, line: &str) -> Option<CapturedResponse> {
  let caps = re.captures(line)?;
  Some(CapturedResponse {
    code: caps[1].to_string(),
    status: caps[2].to_string(),
  })
}

fn tapi_succeeded(response: &CapturedResponse) -> bool {
  response.code_value().is_some_and(|code| (200..300).contains(&code))
    && TAPI_SUCCESS_OUTCOMES
      .iter()
      .any(|ok| response.status.eq_ignore_ascii_case(ok))
}

/// Accumulated evidence for one transaction id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRecord {
  pub papi_request_seen: bool,
  pub papi_response: Option<CapturedResponse>,
  pub tapi_request_seen: bool,
  pub tapi_response: Option<CapturedResponse>,
  pub side_channel_confirmed: bool,
  pub channel_dropped: bool,
  pub offline_fallback: bool,
  pub scheduler_touches: Vec<String>,
  pub raw_lines: Vec<String>,
  pub first_seen: Option<DateTime<Utc>>,
  pub last_seen: Option<DateTime<Utc>>,
}

impl TransactionRecord {
  /// Evaluate every identifier-scoped evidence rule against `line`.
  pub fn apply_evidence(&mut self, line: &str) {
    self.raw_lines.push(line.to_string());

    if PAPI_REQUEST.is_match(line) {
      self.papi_request_seen = true;
    }
    if let Some(resp) = capture_response(&PAPI_RESPONSE, line) {
      self.papi_response = Some(resp);
    }
    if TAPI_REQUEST.is_match(line) {
      self.tapi_request_seen = true;
    }
    if let Some(resp) = capture_response(&TAPI_RESPONSE, line) {
      self.tapi_response = Some(resp);
    }
    if DURABLE_WRITE.is_match(line) {
      self.side_channel_confirmed = true;
    }
    if DISCONNECT.is_match(line) {
      self.channel_dropped = true;
    }
    if OFFLINE.is_match(line) {
      self.offline_fallback = true;
    }

    if let Some(ts) = timestamp::extract(line) {
      self.first_seen = Some(self.first_seen.map_or(ts, |t| t.min(ts)));
      self.last_seen = Some(self.last_seen.map_or(ts, |t| t.max(ts)));
    }
  }

  /// First matching clause wins.
  pub fn root_cause(&self) -> RootCause {
    if !self.papi_request_seen {
      return RootCause::MissingPapiRequest;
    }
    if self.papi_response.is_none() {
      return RootCause::MissingPapiResponse;
    }
    if self.channel_dropped {
      return RootCause::WebSocketDisconnect;
    }
    if !self.tapi_request_seen {
      return RootCause::MissingTapiRequest;
    }
    match &self.tapi_response {
      None if self.offline_fallback => RootCause::TapiOffline,
      None => RootCause::MissingTapiResponse,
      Some(resp) if tapi_succeeded(resp) && self.side_channel_confirmed => RootCause::Ok,
      Some(resp) if tapi_succeeded(resp) => RootCause::MissingDurableWrite,
      Some(_) => RootCause::Unknown,
    }
  }

  /// Independent of the root cause: an "OK" record carrying a 4xx/5xx code is still abnormal.
  pub fn is_abnormal(&self) -> bool {
    let error_code = [&self.papi_response, &self.tapi_response]
      .into_iter()
      .flatten()
      .any(CapturedResponse::is_error_code);
    self.root_cause() != RootCause::Ok
      || (self.scheduler_touches.is_empty() && self.offline_fallback)
      || error_code
  }

  pub fn summarize(&self, id: &str) -> TransactionSummary {
    let rfc3339 = |ts: DateTime<Utc>| ts.to_rfc3339_opts(SecondsFormat::Millis, true);
    TransactionSummary {
      id: id.to_string(),
      root_cause: self.root_cause(),
      abnormal: self.is_abnormal(),
      papi_request_seen: self.papi_request_seen,
      papi_response: self.papi_response.as_ref().map(ToString::to_string),
      tapi_request_seen: self.tapi_request_seen,
      tapi_response: self.tapi_response.as_ref().map(ToString::to_string),
      side_channel_confirmed: self.side_channel_confirmed,
      channel_dropped: self.channel_dropped,
      offline_fallback: self.offline_fallback,
      first_seen: self.first_seen.map(rfc3339),
      last_seen: self.last_seen.map(rfc3339),
      scheduler_touches: self.scheduler_touches.clone(),
      raw_lines: self.raw_lines.clone(),
    }
  }
}

/// All transaction records keyed by lowercase id. Records are created lazily and never evicted.
#[derive(Debug, Clone, Default)]
pub struct TransactionTracker {
  records: BTreeMap<String, TransactionRecord>,
}

impl TransactionTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fold one line: identifier-scoped evidence first, then the scheduler broadcast.
  pub fn ingest(&mut self, line: &str) {
    self.apply_identified(line);
    if is_scheduler_marker(line) {
      self.broadcast_scheduler_marker(line);
    }
  }

  /// Apply evidence rules to the record of the id resolved from `line`, creating it on first sight.
  pub fn apply_identified(&mut self, line: &str) -> Option<String> {
    let id = resolve_id(line)?;
    let record = self.records.entry(id.clone()).or_insert_with(|| {
      tracing::debug!(transaction_id = %id, "transaction record created");
      TransactionRecord::default()
    });
    record.apply_evidence(line);
    Some(id)
  }

  /// Append `line` to the scheduler touches of every record that exists right now,
  /// whether or not the line names that record's id.
  pub fn broadcast_scheduler_marker(&mut self, line: &str) -> usize {
    for record in self.records.values_mut() {
      record.scheduler_touches.push(line.to_string());
    }
    tracing::debug!(touched = self.records.len(), "scheduler marker broadcast");
    self.records.len()
  }

  pub fn get(&self, id: &str) -> Option<&TransactionRecord> {
    self.records.get(&id.to_ascii_lowercase())
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Summaries sorted by id.
  pub fn summaries(&self) -> Vec<TransactionSummary> {
    self.records.iter().map(|(id, r)| r.summarize(id)).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TX: &str = "0b9e6c52-7d1f-4c8a-9e3b-5f6a7b8c9d0e";
  const TX2: &str = "11111111-2222-3333-4444-555555555555";
  const TX3: &str = "99999999-8888-7777-6666-555555555555";

  fn papi_request(id: &str) -> String {
    format!(r#"transactionId="{id}" POST https://gw.internal/papi/v2/payments"#)
  }

  fn papi_response(id: &str, code: u32, status: &str) -> String {
    format!(r#"transactionId="{id}" PAPI response {{"statusCode":{code},"status":"{status}"}}"#)
  }

  fn tapi_request(id: &str) -> String {
    format!("transactionId={id} POST https://terminal.internal/tapi/v1/charge")
  }

  fn tapi_response(id: &str, code: u32, outcome: &str) -> String {
    format!(r#"transactionId={id} TAPI response {{"responseCode":{code},"outcome":"{outcome}"}}"#)
  }

  fn durable_write(id: &str) -> String {
    format!("transactionId={id} Kinesis + DynamoDB write success")
  }

  fn happy_path(tracker: &mut TransactionTracker, id: &str) {
    tracker.ingest(&papi_request(id));
    tracker.ingest(&papi_response(id, 200, "ACCEPTED"));
    tracker.ingest(&tapi_request(id));
    tracker.ingest(&tapi_response(id, 200, "APPROVED"));
    tracker.ingest(&durable_write(id));
  }

  #[test]
  fn tagged_id_beats_bare_token() {
    let line = format!("trace={TX2} transaction_id: '{TX}'");
    assert_eq!(resolve_id(&line).as_deref(), Some(TX));
  }

  #[test]
  fn bare_token_fallback() {
    assert_eq!(resolve_id(&format!("charge for {TX} ok")).as_deref(), Some(TX));
    assert_eq!(resolve_id("nothing to see"), None);
  }

  #[test]
  fn tagged_id_must_be_36_chars() {
    // 37 characters: not a tagged id and not a UUID token either.
    assert_eq!(resolve_id("transactionId=0b9e6c52-7d1f-4c8a-9e3b-5f6a7b8c9d0ef"), None);
  }

  #[test]
  fn happy_path_is_ok_and_normal() {
    let mut tracker = TransactionTracker::new();
    happy_path(&mut tracker, TX);
    tracker.ingest("scheduler: reconciliation job started");
    let record = tracker.get(TX).unwrap();
    assert_eq!(record.root_cause(), RootCause::Ok);
    assert!(!record.is_abnormal());
    assert_eq!(record.raw_lines.len(), 5);
  }

  #[test]
  fn missing_papi_request_dominates() {
    let mut tracker = TransactionTracker::new();
    let id = TX;
    tracker.ingest(&papi_response(id, 200, "ACCEPTED"));
    tracker.ingest(&format!("{id} websocket disconnected"));
    tracker.ingest(&tapi_request(id));
    tracker.ingest(&tapi_response(id, 200, "APPROVED"));
    tracker.ingest(&durable_write(id));
    assert_eq!(tracker.get(id).unwrap().root_cause(), RootCause::MissingPapiRequest);
  }

  #[test]
  fn root_cause_clause_order() {
    let mut record = TransactionRecord::default();
    record.apply_evidence(&papi_request(TX));
    assert_eq!(record.root_cause(), RootCause::MissingPapiResponse);

    record.apply_evidence(&papi_response(TX, 201, "CREATED"));
    assert_eq!(record.root_cause(), RootCause::MissingTapiRequest);

    record.apply_evidence(&tapi_request(TX));
    assert_eq!(record.root_cause(), RootCause::MissingTapiResponse);

    record.apply_evidence(&format!("{TX} TapiOfflineException: queued"));
    assert_eq!(record.root_cause(), RootCause::TapiOffline);

    record.apply_evidence(&tapi_response(TX, 200, "SUCCESS"));
    assert_eq!(record.root_cause(), RootCause::MissingDurableWrite);

    record.apply_evidence(&durable_write(TX));
    assert_eq!(record.root_cause(), RootCause::Ok);

    record.apply_evidence(&format!("{TX} WebSocket closed by peer"));
    assert_eq!(record.root_cause(), RootCause::WebSocketDisconnect);
  }

  #[test]
  fn failed_tapi_outcome_is_unknown() {
    let mut record = TransactionRecord::default();
    record.apply_evidence(&papi_request(TX));
    record.apply_evidence(&papi_response(TX, 200, "ACCEPTED"));
    record.apply_evidence(&tapi_request(TX));
    record.apply_evidence(&tapi_response(TX, 200, "DECLINED"));
    record.apply_evidence(&durable_write(TX));
    assert_eq!(record.root_cause(), RootCause::Unknown);
    assert!(record.is_abnormal());
  }

  #[test]
  fn responses_are_last_write_wins() {
    let mut record = TransactionRecord::default();
    record.apply_evidence(&papi_response(TX, 500, "FAILED"));
    record.apply_evidence(&papi_response(TX, 200, "ACCEPTED"));
    assert_eq!(record.papi_response.as_ref().unwrap().to_string(), "200 ACCEPTED");

    record.apply_evidence(&papi_response(TX, 502, "BAD_GATEWAY"));
    assert_eq!(record.papi_response.as_ref().unwrap().to_string(), "502 BAD_GATEWAY");
  }

  #[test]
  fn flags_never_reset() {
    let mut record = TransactionRecord::default();
    record.apply_evidence(&papi_request(TX));
    record.apply_evidence(&format!("{TX} heartbeat"));
    assert!(record.papi_request_seen);

    record.apply_evidence(&tapi_request(TX));
    record.apply_evidence(&format!("{TX} heartbeat"));
    assert!(record.tapi_request_seen);

    record.apply_evidence(&durable_write(TX));
    record.apply_evidence(&format!("{TX} heartbeat"));
    assert!(record.side_channel_confirmed);

    record.apply_evidence(&format!("{TX} websocket disconnected"));
    record.apply_evidence(&format!("{TX} websocket connected"));
    assert!(record.channel_dropped);

    record.apply_evidence(&format!("{TX} sent to offline table"));
    record.apply_evidence(&format!("{TX} tapi online again"));
    assert!(record.offline_fallback);

    assert!(record.papi_request_seen && record.tapi_request_seen && record.side_channel_confirmed);
  }

  #[test]
  fn oversized_response_code_is_still_captured() {
    let mut record = TransactionRecord::default();
    record.apply_evidence(&papi_request(TX));
    record.apply_evidence(&format!(r#"{TX} {{"statusCode":50000000000000000000000,"status":"FAILED"}}"#));
    let resp = record.papi_response.as_ref().unwrap();
    assert_eq!(resp.code, "50000000000000000000000");
    assert_eq!(record.root_cause(), RootCause::MissingTapiRequest);
    assert!(record.is_abnormal());
  }

  #[test]
  fn oversized_tapi_code_is_not_success() {
    let mut record = TransactionRecord::default();
    record.apply_evidence(&papi_request(TX));
    record.apply_evidence(&papi_response(TX, 200, "ACCEPTED"));
    record.apply_evidence(&tapi_request(TX));
    record.apply_evidence(&format!(r#"{TX} {{"responseCode":20000000000000000000000,"outcome":"SUCCESS"}}"#));
    record.apply_evidence(&durable_write(TX));
    assert_eq!(record.root_cause(), RootCause::Unknown);
  }

  #[test]
  fn ok_with_error_code_is_still_abnormal() {
    let mut tracker = TransactionTracker::new();
    tracker.ingest(&papi_request(TX));
    tracker.ingest(&papi_response(TX, 503, "RETRIED"));
    tracker.ingest(&tapi_request(TX));
    tracker.ingest(&tapi_response(TX, 200, "APPROVED"));
    tracker.ingest(&durable_write(TX));
    let record = tracker.get(TX).unwrap();
    assert_eq!(record.root_cause(), RootCause::Ok);
    assert!(record.is_abnormal());
  }

  #[test]
  fn offline_without_scheduler_is_abnormal() {
    let mut tracker = TransactionTracker::new();
    happy_path(&mut tracker, TX);
    tracker.ingest(&format!("{TX} sent to offline table"));
    assert_eq!(tracker.get(TX).unwrap().root_cause(), RootCause::Ok);
    assert!(tracker.get(TX).unwrap().is_abnormal());

    tracker.ingest("Scheduler picked up offline job");
    assert!(!tracker.get(TX).unwrap().is_abnormal());
  }

  #[test]
  fn scheduler_before_any_transaction_touches_nothing() {
    let mut tracker = TransactionTracker::new();
    assert_eq!(tracker.broadcast_scheduler_marker("scheduler job tick"), 0);
    tracker.ingest("scheduler job tick");
    tracker.ingest(&papi_request(TX));
    assert!(tracker.get(TX).unwrap().scheduler_touches.is_empty());
  }

  #[test]
  fn scheduler_fans_out_to_every_known_record() {
    let mut tracker = TransactionTracker::new();
    for id in [TX, TX2, TX3] {
      tracker.ingest(&papi_request(id));
    }
    tracker.ingest("Scheduler: retry job run #42");
    for id in [TX, TX2, TX3] {
      assert_eq!(tracker.get(id).unwrap().scheduler_touches, vec!["Scheduler: retry job run #42".to_string()]);
    }
  }

  #[test]
  fn scheduler_line_with_id_reaches_its_own_new_record() {
    let mut tracker = TransactionTracker::new();
    let line = format!("scheduled job replay for {TX}");
    tracker.ingest(&line);
    let record = tracker.get(TX).unwrap();
    assert_eq!(record.raw_lines, vec![line.clone()]);
    assert_eq!(record.scheduler_touches, vec![line]);
  }

  #[test]
  fn timeline_bounds_track_min_and_max() {
    let mut record = TransactionRecord::default();
    record.apply_evidence(&format!("2025-01-15T10:30:05Z {}", papi_request(TX)));
    record.apply_evidence(&format!("2025-01-15T10:30:01Z {TX} retry"));
    record.apply_evidence(&format!("{TX} no timestamp"));
    let summary = record.summarize(TX);
    assert_eq!(summary.first_seen.as_deref(), Some("2025-01-15T10:30:01.000Z"));
    assert_eq!(summary.last_seen.as_deref(), Some("2025-01-15T10:30:05.000Z"));
  }

  #[test]
  fn unresolved_lines_create_nothing() {
    let mut tracker = TransactionTracker::new();
    tracker.ingest("POST https://gw.internal/papi/v2/payments");
    tracker.ingest(r#"{"statusCode":500,"status":"FAILED"}"#);
    assert!(tracker.is_empty());
  }
}
