// conveyor/src/config/execution.rs

//! The `execution_<n>` / `execution_others` convention used to give one
//! occurrence of a repeated step its own value.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const EXECUTION_PREFIX: &str = "execution_";
pub const OTHERS_SUFFIX: &str = "others";

/// A parsed execution label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutionLabel {
  /// `execution_<n>`, n >= 1.
  Ordinal(u32),
  /// `execution_others`.
  Others,
}

impl ExecutionLabel {
  pub fn parse(label: &str) -> Result<Self, String> {
    let suffix = label
      .trim()
      .strip_prefix(EXECUTION_PREFIX)
      .ok_or_else(|| format!("'{}' is not an execution label", label))?;
    if suffix == OTHERS_SUFFIX {
      return Ok(ExecutionLabel::Others);
    }
    // u32::from_str accepts a leading '+', the label grammar does not.
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
      return Err(format!(
        "'{}' is not a valid execution label: expected 'execution_<n>' with a positive integer n, or 'execution_others'",
        label
      ));
    }
    match suffix.parse::<u32>() {
      Ok(0) | Err(_) => Err(format!(
        "'{}' is not a valid execution label: the execution number must be a positive integer",
        label
      )),
      Ok(n) => Ok(ExecutionLabel::Ordinal(n)),
    }
  }
}

impl fmt::Display for ExecutionLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExecutionLabel::Ordinal(n) => write!(f, "{}{}", EXECUTION_PREFIX, n),
      ExecutionLabel::Others => write!(f, "{}{}", EXECUTION_PREFIX, OTHERS_SUFFIX),
    }
  }
}

/// Values keyed by execution label.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionMap<T> {
  numbered: BTreeMap<u32, T>,
  others: Option<T>,
}

impl<T> Default for ExecutionMap<T> {
  fn default() -> Self {
    Self {
      numbered: BTreeMap::new(),
      others: None,
    }
  }
}

impl<T> ExecutionMap<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts a value, returning the one previously stored under the same label.
  pub fn insert(&mut self, label: ExecutionLabel, value: T) -> Option<T> {
    match label {
      ExecutionLabel::Ordinal(n) => self.numbered.insert(n, value),
      ExecutionLabel::Others => self.others.replace(value),
    }
  }

  /// The entry for `ordinal`: its numbered entry, else `execution_others`.
  pub fn resolve(&self, ordinal: u32) -> Option<&T> {
    self.numbered.get(&ordinal).or(self.others.as_ref())
  }

  pub fn others(&self) -> Option<&T> {
    self.others.as_ref()
  }

  pub fn numbered(&self) -> impl Iterator<Item = (u32, &T)> {
    self.numbered.iter().map(|(n, v)| (*n, v))
  }

  pub fn highest_ordinal(&self) -> Option<u32> {
    self.numbered.keys().next_back().copied()
  }

  pub fn is_empty(&self) -> bool {
    self.numbered.is_empty() && self.others.is_none()
  }
}

/// A mapping is treated as per-execution as soon as one of its keys uses the
/// `execution_` prefix. Mappings without such keys are ordinary values.
pub fn is_per_execution(mapping: &Mapping) -> bool {
  mapping
    .keys()
    .any(|key| key.as_str().map_or(false, |k| k.trim().starts_with(EXECUTION_PREFIX)))
}

/// Parses a per-execution mapping, converting each entry with `convert`.
///
/// Every key must be a valid execution label; a mix of labels and other keys, a
/// malformed label, or the same label twice is rejected.
pub fn parse_execution_map<T>(
  mapping: &Mapping,
  mut convert: impl FnMut(ExecutionLabel, &Value) -> Result<T, String>,
) -> Result<ExecutionMap<T>, String> {
  if mapping.is_empty() {
    return Err("a per-execution mapping must contain at least one execution label".to_string());
  }
  let mut map = ExecutionMap::new();
  for (key, value) in mapping {
    let label_str = key
      .as_str()
      .ok_or_else(|| "execution labels must be strings".to_string())?;
    let label = ExecutionLabel::parse(label_str)
      .map_err(|msg| format!("{} (execution labels cannot be mixed with other keys)", msg))?;
    let converted = convert(label, value)?;
    if map.insert(label, converted).is_some() {
      return Err(format!("execution label '{}' appears more than once", label));
    }
  }
  Ok(map)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_labels() {
    assert_eq!(ExecutionLabel::parse("execution_1"), Ok(ExecutionLabel::Ordinal(1)));
    assert_eq!(ExecutionLabel::parse("execution_12"), Ok(ExecutionLabel::Ordinal(12)));
    assert_eq!(ExecutionLabel::parse("execution_others"), Ok(ExecutionLabel::Others));
    assert!(ExecutionLabel::parse("execution_0").is_err());
    assert!(ExecutionLabel::parse("execution_-1").is_err());
    assert!(ExecutionLabel::parse("execution_+1").is_err());
    assert!(ExecutionLabel::parse("execution_1.5").is_err());
    assert!(ExecutionLabel::parse("execution_").is_err());
    assert!(ExecutionLabel::parse("run_1").is_err());
  }

  #[test]
  fn resolve_prefers_numbered_entry() {
    let mut map = ExecutionMap::new();
    map.insert(ExecutionLabel::Ordinal(2), "two");
    map.insert(ExecutionLabel::Others, "rest");
    assert_eq!(map.resolve(1), Some(&"rest"));
    assert_eq!(map.resolve(2), Some(&"two"));
    assert_eq!(map.resolve(7), Some(&"rest"));
    assert_eq!(map.highest_ordinal(), Some(2));
  }

  #[test]
  fn resolve_without_others_is_unset() {
    let mut map = ExecutionMap::new();
    map.insert(ExecutionLabel::Ordinal(1), "one");
    assert_eq!(map.resolve(2), None);
  }

  #[test]
  fn mixed_keys_are_rejected() {
    let mapping: Mapping = serde_yaml::from_str("{execution_1: a, colour: red}").unwrap();
    assert!(is_per_execution(&mapping));
    let err = parse_execution_map(&mapping, |_, v| Ok(v.clone())).unwrap_err();
    assert!(err.contains("colour"));
  }

  #[test]
  fn plain_mapping_is_not_per_execution() {
    let mapping: Mapping = serde_yaml::from_str("{colour: red, size: 3}").unwrap();
    assert!(!is_per_execution(&mapping));
  }
}
