//! Engine configuration with defaults that reproduce the reported figures.

use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// Result-shaping constants. Changing any of them changes reported results,
/// not just presentation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
  /// A latency sample is kept only when strictly above this many milliseconds.
  pub slow_call_threshold_ms: u64,
  /// Number of leading characters of an error line used as its group key.
  pub fingerprint_chars: usize,
  /// Percentile ranks (0..=1) reported by the latency aggregator, ascending.
  pub percentiles: Vec<f64>,
  /// Keep every decoded structured record for later querying.
  pub retain_structured: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      slow_call_threshold_ms: 300,
      fingerprint_chars: 80,
      percentiles: vec![0.50, 0.90, 0.99],
      retain_structured: true,
    }
  }
}

impl Config {
  /// Parse a TOML document; missing keys fall back to defaults.
  pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
    let config: Config = toml::from_str(s)?;
    config.validate()?;
    Ok(config)
  }

  /// Load and validate a TOML config file.
  pub fn load(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path)?;
    Self::from_toml_str(&raw)
  }

  pub fn validate(&self) -> Result<(), EngineError> {
    if self.slow_call_threshold_ms == 0 {
      return Err(EngineError::config("slow_call_threshold_ms", "must be greater than 0"));
    }
    if self.fingerprint_chars == 0 {
      return Err(EngineError::config("fingerprint_chars", "must be greater than 0"));
    }
    if self.percentiles.iter().any(|p| !(0.0..=1.0).contains(p)) {
      return Err(EngineError::config("percentiles", "must be within [0, 1]"));
    }
    if self.percentiles.windows(2).any(|w| w[0] > w[1]) {
      return Err(EngineError::config("percentiles", "must be non-decreasing"));
    }
    Ok(())
  }
}
