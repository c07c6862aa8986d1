// conveyor/src/config/user.rs

//! The user override document: which pipeline to run, global overrides, and
//! per-step parameter overrides at the highest precedence.

use crate::config::document::{describe, key_str, single_entry};
use crate::config::merge::{parse_layer, ParameterLayer};
use crate::error::{ConveyorError, ConveyorResult};
use indexmap::IndexMap;
use serde_yaml::Value;
use tracing::{event, Level};

const CHOSEN_PIPELINE: &str = "chosen_pipeline";
const GLOBAL_CONFIG: &str = "global_config";
const PIPELINE_CONFIG: &str = "pipeline_config";
const PARAMETERS: &str = "parameters";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserOverrides {
  pub chosen_pipeline: String,
  pub global_parameters: IndexMap<String, Value>,
  /// Keyed by step name as written by the user (bare or qualified).
  pub step_parameters: IndexMap<String, ParameterLayer>,
}

impl UserOverrides {
  pub fn from_document(document: &Value) -> ConveyorResult<Self> {
    let root = document
      .as_mapping()
      .ok_or_else(|| ConveyorError::user(format!("the user document must be a mapping node, found {}", describe(document))))?;

    for key in root.keys() {
      match key_str(key) {
        Some(CHOSEN_PIPELINE) | Some(GLOBAL_CONFIG) | Some(PIPELINE_CONFIG) => {}
        Some(other) => event!(Level::WARN, key = other, "Ignoring unknown top-level key in user document."),
        None => return Err(ConveyorError::user("all top-level keys of the user document must be strings")),
      }
    }

    let chosen_pipeline = match root.get(CHOSEN_PIPELINE) {
      Some(Value::String(name)) => name.clone(),
      Some(other) => {
        return Err(ConveyorError::user(format!(
          "'{}' must be a string, found {}",
          CHOSEN_PIPELINE,
          describe(other)
        )))
      }
      None => return Err(ConveyorError::user(format!("the user document must contain '{}'", CHOSEN_PIPELINE))),
    };

    let global_parameters = match root.get(GLOBAL_CONFIG) {
      Some(node) => parse_global_config(node)?,
      None => IndexMap::new(),
    };

    let step_parameters = match root.get(PIPELINE_CONFIG) {
      Some(node) => parse_pipeline_config(node)?,
      None => IndexMap::new(),
    };

    Ok(Self {
      chosen_pipeline,
      global_parameters,
      step_parameters,
    })
  }

  pub fn step_layer(&self, step_name: &str) -> Option<&ParameterLayer> {
    self.step_parameters.get(step_name)
  }
}

fn parse_global_config(node: &Value) -> ConveyorResult<IndexMap<String, Value>> {
  let mapping = node
    .as_mapping()
    .ok_or_else(|| ConveyorError::user(format!("'{}' must be a mapping node", GLOBAL_CONFIG)))?;
  let parameters = match mapping.get(PARAMETERS) {
    Some(Value::Mapping(parameters)) => parameters,
    Some(_) => {
      return Err(ConveyorError::user(format!(
        "'{}.{}' must be a mapping node",
        GLOBAL_CONFIG, PARAMETERS
      )))
    }
    None => {
      return Err(ConveyorError::user(format!(
        "'{}' must contain a '{}' node",
        GLOBAL_CONFIG, PARAMETERS
      )))
    }
  };
  let mut globals = IndexMap::new();
  for (key, value) in parameters {
    let name = key_str(key).ok_or_else(|| ConveyorError::user("global parameter names must be strings"))?;
    globals.insert(name.to_string(), value.clone());
  }
  Ok(globals)
}

fn parse_pipeline_config(node: &Value) -> ConveyorResult<IndexMap<String, ParameterLayer>> {
  let entries = node
    .as_sequence()
    .ok_or_else(|| ConveyorError::user(format!("'{}' must be a sequence node", PIPELINE_CONFIG)))?;
  let entries: Vec<&Value> = entries.iter().filter(|entry| !entry.is_null()).collect();
  if entries.is_empty() {
    return Err(ConveyorError::user(format!(
      "at least one step must be configured in '{}'",
      PIPELINE_CONFIG
    )));
  }

  let mut steps = IndexMap::new();
  for entry in entries {
    let (step_name, body) = single_entry(entry).ok_or_else(|| {
      ConveyorError::user(format!(
        "entries of '{}' must be single-key mappings named after a step",
        PIPELINE_CONFIG
      ))
    })?;
    let body = body.as_mapping().ok_or_else(|| {
      ConveyorError::user(format!("step '{}' in '{}' must have a '{}' node", step_name, PIPELINE_CONFIG, PARAMETERS))
    })?;
    if body.len() != 1 || !body.contains_key(PARAMETERS) {
      return Err(ConveyorError::user(format!(
        "step '{}' in '{}' may only contain a '{}' node",
        step_name, PIPELINE_CONFIG, PARAMETERS
      )));
    }
    let layer = match body.get(PARAMETERS) {
      Some(parameters @ Value::Mapping(_)) => parse_layer(step_name, parameters)?,
      _ => {
        return Err(ConveyorError::user(format!(
          "'{}' of step '{}' must be a mapping node",
          PARAMETERS, step_name
        )))
      }
    };
    if steps.insert(step_name.to_string(), layer).is_some() {
      return Err(ConveyorError::user(format!(
        "step '{}' is configured more than once in '{}'",
        step_name, PIPELINE_CONFIG
      )));
    }
  }
  Ok(steps)
}
