// conveyor/src/config/globals.rs

//! Global parameters shared by every invocation of a run.

use crate::config::document::{describe, key_str};
use crate::error::{ConveyorError, ConveyorResult};
use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml::Value;
use tracing::{event, Level};

pub const OUTPUT_FILE: &str = "output_file";
pub const ERROR_FILE: &str = "error_file";
/// Misspelling of `output_file` still found in older registries and user files.
pub const OUTPUT_FILE_ALIAS: &str = "ouput_file";

/// The merged global parameter mapping. Always contains string values for
/// `output_file` and `error_file`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GlobalParameters {
  values: IndexMap<String, Value>,
}

impl GlobalParameters {
  /// Builds the registry-level globals from the `global_parameters` node.
  pub fn from_registry(document: &str, node: &Value) -> ConveyorResult<Self> {
    let mapping = node.as_mapping().ok_or_else(|| {
      ConveyorError::registry(
        document,
        format!("'global_parameters' must be a mapping node, found {}", describe(node)),
      )
    })?;
    let mut values = IndexMap::new();
    for (key, value) in mapping {
      let name = key_str(key).ok_or_else(|| ConveyorError::registry(document, "global parameter names must be strings"))?;
      check_global_value(name, value).map_err(|msg| ConveyorError::registry(document, msg))?;
      insert_canonical(&mut values, name, value.clone()).map_err(|msg| ConveyorError::registry(document, msg))?;
    }
    let globals = Self { values };
    globals
      .check_sinks()
      .map_err(|msg| ConveyorError::registry(document, msg))?;
    Ok(globals)
  }

  /// Applies user overrides. Only globals declared in the registry may be overridden.
  pub fn apply_overrides(&mut self, overrides: &IndexMap<String, Value>) -> ConveyorResult<()> {
    let mut canonical = IndexMap::new();
    for (name, value) in overrides {
      check_global_value(name, value).map_err(ConveyorError::user)?;
      insert_canonical(&mut canonical, name, value.clone()).map_err(ConveyorError::user)?;
    }
    for (name, value) in canonical {
      match self.values.get_mut(&name) {
        Some(slot) => *slot = value,
        None => {
          return Err(ConveyorError::user(format!(
            "global parameter '{}' is not declared in the registry",
            name
          )))
        }
      }
    }
    self.check_sinks().map_err(ConveyorError::user)
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.values.get(canonical_name(name))
  }

  pub fn output_file(&self) -> &str {
    self.get(OUTPUT_FILE).and_then(Value::as_str).unwrap_or_default()
  }

  pub fn error_file(&self) -> &str {
    self.get(ERROR_FILE).and_then(Value::as_str).unwrap_or_default()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.values.iter().map(|(k, v)| (k.as_str(), v))
  }

  fn check_sinks(&self) -> Result<(), String> {
    for sink in [OUTPUT_FILE, ERROR_FILE] {
      match self.values.get(sink) {
        Some(Value::String(_)) => {}
        Some(other) => return Err(format!("global parameter '{}' must be a string, found {}", sink, describe(other))),
        None => return Err(format!("global parameters '{}' and '{}' must be defined", OUTPUT_FILE, ERROR_FILE)),
      }
    }
    Ok(())
  }
}

fn canonical_name(name: &str) -> &str {
  if name == OUTPUT_FILE_ALIAS {
    OUTPUT_FILE
  } else {
    name
  }
}

fn insert_canonical(values: &mut IndexMap<String, Value>, name: &str, value: Value) -> Result<(), String> {
  let canonical = canonical_name(name);
  if canonical != name {
    event!(Level::WARN, alias = name, canonical, "Deprecated global parameter name used.");
  }
  if values.contains_key(canonical) {
    return Err(format!(
      "global parameter '{}' is given more than once (note '{}' is an alias of '{}')",
      canonical, OUTPUT_FILE_ALIAS, OUTPUT_FILE
    ));
  }
  values.insert(canonical.to_string(), value);
  Ok(())
}

fn check_global_value(name: &str, value: &Value) -> Result<(), String> {
  match value {
    Value::Null => Err(format!("global parameter '{}' must have a value", name)),
    Value::Mapping(_) => Err(format!("global parameter '{}' cannot be a mapping node", name)),
    Value::Sequence(items) if items.iter().any(|item| item.is_mapping()) => Err(format!(
      "sequence global parameter '{}' must not contain mapping nodes",
      name
    )),
    _ => Ok(()),
  }
}
