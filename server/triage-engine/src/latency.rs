//! Slow-call latency collection and nearest-rank percentiles.

use crate::types::{LatencyReport, PercentileValue};

/// Leading integer of a slow-call composite (`"450 ms : ..."`). Non-positive or unparsable values are `None`.
pub fn parse_leading_ms(sample: &str) -> Option<u64> {
  let token = sample.split_whitespace().next()?;
  token.parse::<u64>().ok().filter(|&ms| ms > 0)
}

/// Floor-rank percentile: `sorted[min(n - 1, floor(n * rank))]`. `None` for an empty slice.
pub fn percentile(sorted: &[u64], rank: f64) -> Option<u64> {
  if sorted.is_empty() {
    return None;
  }
  let n = sorted.len();
  let idx = ((n as f64) * rank).floor() as usize;
  Some(sorted[idx.min(n - 1)])
}

/// Slow-call composites in discovery order.
#[derive(Debug, Clone, Default)]
pub struct LatencyAggregator {
  samples: Vec<String>,
}

impl LatencyAggregator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, sample: String) {
    self.samples.push(sample);
  }

  pub fn extend(&mut self, samples: impl IntoIterator<Item = String>) {
    self.samples.extend(samples);
  }

  pub fn samples(&self) -> &[String] {
    &self.samples
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  /// Parsed values, ascending. Unparsable entries are dropped.
  pub fn sorted_values(&self) -> Vec<u64> {
    let mut values: Vec<u64> = self.samples.iter().filter_map(|s| parse_leading_ms(s)).collect();
    values.sort_unstable();
    values
  }

  /// Recomputed from the full sample set on every call.
  pub fn report(&self, ranks: &[f64]) -> LatencyReport {
    let sorted = self.sorted_values();
    LatencyReport {
      samples: self.samples.clone(),
      valid_samples: sorted.len(),
      percentiles: ranks
        .iter()
        .map(|&rank| PercentileValue {
          rank,
          value_ms: percentile(&sorted, rank),
        })
        .collect(),
    }
  }
}
