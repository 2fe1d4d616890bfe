//! Log Triage Engine — deterministic, rule-based.
//!
//! Classifies raw application log lines (errors, timeouts, slow calls,
//! service-health issues), groups them by UUID correlation tokens, folds
//! PAPI/TAPI transaction evidence into a root cause per transaction, and
//! aggregates latency percentiles and recurring error signatures.
//!
//! No DB, no network; pure computation + in-memory state. Callers own file
//! I/O, tailing, and rendering of [`EngineSnapshot`].

pub mod classify;
pub mod config;
pub mod correlation;
pub mod decode;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod latency;
pub mod timestamp;
pub mod transaction;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use types::{Category, EngineSnapshot, RootCause, TransactionSummary};
