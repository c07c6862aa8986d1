// conveyor/src/config/document.rs

//! Loading of YAML documents and small helpers for reading parsed trees.
//!
//! The engine itself only consumes already-parsed `serde_yaml::Value` trees;
//! these helpers exist for hosts that keep their documents on disk.

use crate::error::{ConveyorError, ConveyorResult};
use anyhow::Context;
use serde_yaml::Value;
use std::path::Path;
use tracing::{event, Level};

/// Conventional name of the user override document in the working directory.
pub const INPUT_FILENAME: &str = "user_input.yaml";

/// Parses a YAML document. Anchors and aliases are resolved by the parser.
pub fn parse_document(source: &str) -> anyhow::Result<Value> {
  let value: Value = serde_yaml::from_str(source).context("document is not valid YAML")?;
  Ok(value)
}

/// Reads and parses a YAML document from disk.
pub fn load_document(path: impl AsRef<Path>) -> ConveyorResult<Value> {
  let path = path.as_ref();
  event!(Level::DEBUG, path = %path.display(), "Loading document.");
  std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))
    .and_then(|content| parse_document(&content))
    .map_err(|source| ConveyorError::Document {
      path: path.display().to_string(),
      source,
    })
}

pub(crate) fn key_str(key: &Value) -> Option<&str> {
  key.as_str()
}

/// Short name of a node's kind, for error messages.
pub(crate) fn describe(value: &Value) -> &'static str {
  match value {
    Value::Null => "an empty node",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Sequence(_) => "a sequence node",
    Value::Mapping(_) => "a mapping node",
    Value::Tagged(_) => "a tagged node",
  }
}

/// The only key of a single-key mapping, with its value.
pub(crate) fn single_entry(value: &Value) -> Option<(&str, &Value)> {
  let mapping = value.as_mapping()?;
  if mapping.len() != 1 {
    return None;
  }
  let (key, inner) = mapping.iter().next()?;
  Some((key.as_str()?, inner))
}
