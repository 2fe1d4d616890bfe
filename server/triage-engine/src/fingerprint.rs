//! Group recurring error lines by their literal leading characters.

use std::collections::HashMap;

use crate::types::ErrorGroup;

/// First `width` characters of `line`, verbatim. No trimming or normalization.
pub fn compute(line: &str, width: usize) -> String {
  match line.char_indices().nth(width) {
    Some((end, _)) => line[..end].to_string(),
    None => line.to_string(),
  }
}

/// Stable short handle for a fingerprint: `err-` + 16 hex chars of its blake3 hash.
pub fn group_id(fingerprint: &str) -> String {
  let hex = blake3::hash(fingerprint.as_bytes()).to_hex();
  format!("err-{}", &hex[..16])
}

/// Count `lines` per fingerprint, most frequent first. Equal counts keep first-occurrence order.
pub fn group<'a>(lines: impl IntoIterator<Item = &'a str>, width: usize) -> Vec<ErrorGroup> {
  let mut slots: HashMap<String, usize> = HashMap::new();
  let mut groups: Vec<ErrorGroup> = Vec::new();

  for line in lines {
    let fp = compute(line, width);
    match slots.get(&fp) {
      Some(&i) => groups[i].count += 1,
      None => {
        slots.insert(fp.clone(), groups.len());
        groups.push(ErrorGroup {
          group_id: group_id(&fp),
          fingerprint: fp,
          count: 1,
          exemplar_line: line.to_string(),
        });
      }
    }
  }

  // sort_by is stable.
  groups.sort_by(|a, b| b.count.cmp(&a.count));
  groups
}
