// conveyor/src/config/merge.rs

//! Merges a step's default parameters with the pipeline-registry and user
//! override layers for one invocation.
//!
//! Precedence is `defaults < pipeline registry < user`. For each parameter the
//! highest layer that yields a value for the invocation's ordinal wins outright;
//! values are never merged inside a parameter. A per-execution value yields its
//! `execution_<ordinal>` entry, else its `execution_others` entry, else nothing
//! (the parameter falls through to the next lower layer).

use crate::config::execution::{is_per_execution, parse_execution_map, ExecutionLabel, ExecutionMap};
use crate::error::{ConveyorError, ConveyorResult};
use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml::Value;
use tracing::{event, Level};

/// A parameter value as written in one layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSpec {
  /// Applies identically to every execution of the step.
  Uniform(Value),
  /// Keyed by execution label.
  PerExecution(ExecutionMap<Value>),
}

impl ParameterSpec {
  /// Interprets a non-null parameter value.
  pub fn from_value(value: &Value) -> Result<Self, String> {
    match value {
      Value::Null => Err("parameter values must not be empty".to_string()),
      Value::Mapping(mapping) if is_per_execution(mapping) => {
        let map = parse_execution_map(mapping, |label, entry| match entry {
          Value::Null => Err(format!("value for '{}' must not be empty", label)),
          Value::Mapping(inner) if is_per_execution(inner) => {
            Err(format!("value for '{}' cannot itself be a per-execution mapping", label))
          }
          other => Ok(other.clone()),
        })?;
        Ok(ParameterSpec::PerExecution(map))
      }
      other => Ok(ParameterSpec::Uniform(other.clone())),
    }
  }

  /// The value this layer contributes for `ordinal`, if any.
  pub fn resolve(&self, ordinal: u32) -> Option<&Value> {
    match self {
      ParameterSpec::Uniform(value) => Some(value),
      ParameterSpec::PerExecution(map) => map.resolve(ordinal),
    }
  }
}

/// One override layer: parameter name to value.
pub type ParameterLayer = IndexMap<String, ParameterSpec>;

/// Parses an override layer (`parameters:` node of a pipeline step reference or
/// a user `pipeline_config` entry). Null values are rejected.
pub fn parse_layer(step_name: &str, node: &Value) -> ConveyorResult<ParameterLayer> {
  let mapping = match node {
    Value::Null => return Ok(ParameterLayer::new()),
    Value::Mapping(mapping) => mapping,
    _ => return Err(ConveyorError::merge(step_name, "", "'parameters' must be a mapping node")),
  };
  let mut layer = ParameterLayer::new();
  for (key, value) in mapping {
    let name = key
      .as_str()
      .ok_or_else(|| ConveyorError::merge(step_name, "", "parameter names must be strings"))?;
    let spec = ParameterSpec::from_value(value).map_err(|msg| ConveyorError::merge(step_name, name, msg))?;
    layer.insert(name.to_string(), spec);
  }
  Ok(layer)
}

/// The default layer of a step, as declared in the steps registry.
///
/// A null default declares a mandatory parameter that some override must supply.
/// Per-execution defaults must carry `execution_others` so the default layer
/// covers every ordinal regardless of how often the step runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterDefaults {
  entries: IndexMap<String, Option<ParameterSpec>>,
}

impl ParameterDefaults {
  pub fn from_node(step_name: &str, node: Option<&Value>) -> ConveyorResult<Self> {
    let mapping = match node {
      None | Some(Value::Null) => return Ok(Self::default()),
      Some(Value::Mapping(mapping)) => mapping,
      Some(_) => return Err(ConveyorError::merge(step_name, "", "'parameters' must be a mapping node")),
    };
    let mut entries = IndexMap::new();
    for (key, value) in mapping {
      let name = key
        .as_str()
        .ok_or_else(|| ConveyorError::merge(step_name, "", "parameter names must be strings"))?;
      let spec = match value {
        Value::Null => None,
        other => {
          let spec = ParameterSpec::from_value(other).map_err(|msg| ConveyorError::merge(step_name, name, msg))?;
          if let ParameterSpec::PerExecution(map) = &spec {
            if map.others().is_none() {
              return Err(ConveyorError::merge(
                step_name,
                name,
                format!(
                  "a per-execution default must define '{}' so that every execution has a value",
                  ExecutionLabel::Others
                ),
              ));
            }
          }
          Some(spec)
        }
      };
      entries.insert(name.to_string(), spec);
    }
    Ok(Self { entries })
  }

  pub fn contains(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
    self.entries.get(name).and_then(Option::as_ref)
  }

  pub fn is_mandatory(&self, name: &str) -> bool {
    matches!(self.entries.get(name), Some(None))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// The flat, fully resolved parameters of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Parameters(IndexMap<String, Value>);

impl Parameters {
  pub fn get(&self, name: &str) -> Option<&Value> {
    self.0.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Position of an invocation among the executions of its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSlot {
  /// 1-based execution ordinal.
  pub ordinal: u32,
  /// Total executions of the step in the pipeline.
  pub total: u32,
}

pub struct ParameterMerger<'a> {
  step_name: &'a str,
  defaults: &'a ParameterDefaults,
}

impl<'a> ParameterMerger<'a> {
  pub fn new(step_name: &'a str, defaults: &'a ParameterDefaults) -> Self {
    Self { step_name, defaults }
  }

  /// Checks that a layer only names declared parameters.
  pub fn check_layer(&self, layer: &ParameterLayer, origin: &str) -> ConveyorResult<()> {
    for name in layer.keys() {
      if !self.defaults.contains(name) {
        return Err(ConveyorError::merge(
          self.step_name,
          name,
          format!("parameter is not declared by the step ({})", origin),
        ));
      }
    }
    Ok(())
  }

  /// Produces the flat parameter mapping for one execution.
  ///
  /// `overrides` are given in increasing precedence; `None` entries are skipped.
  pub fn merge(&self, slot: ExecutionSlot, overrides: &[Option<&ParameterLayer>]) -> ConveyorResult<Parameters> {
    let layers: Vec<&ParameterLayer> = overrides.iter().flatten().copied().collect();
    for layer in &layers {
      self.warn_unreachable_labels(layer, slot);
    }

    let mut merged = IndexMap::with_capacity(self.defaults.len());
    for name in self.defaults.names() {
      let from_overrides = layers
        .iter()
        .rev()
        .find_map(|layer| layer.get(name).and_then(|spec| spec.resolve(slot.ordinal)));
      let value = from_overrides.or_else(|| self.defaults.get(name).and_then(|spec| spec.resolve(slot.ordinal)));
      match value {
        Some(value) => {
          merged.insert(name.to_string(), value.clone());
        }
        None => {
          return Err(ConveyorError::merge(
            self.step_name,
            name,
            format!(
              "mandatory parameter has no value for execution {} of {}",
              slot.ordinal, slot.total
            ),
          ))
        }
      }
    }
    Ok(Parameters(merged))
  }

  /// Per-execution parameters of `layer` with no entry selecting `ordinal`.
  ///
  /// For a layer that belongs to a single occurrence these entries can never
  /// take effect.
  pub fn unmatched_labels(layer: &ParameterLayer, ordinal: u32) -> Vec<&str> {
    layer
      .iter()
      .filter(|(_, spec)| matches!(spec, ParameterSpec::PerExecution(_)) && spec.resolve(ordinal).is_none())
      .map(|(name, _)| name.as_str())
      .collect()
  }

  // Labels naming an execution that never happens are most likely typos.
  fn warn_unreachable_labels(&self, layer: &ParameterLayer, slot: ExecutionSlot) {
    if slot.ordinal != 1 {
      return;
    }
    for (name, spec) in layer {
      if let ParameterSpec::PerExecution(map) = spec {
        if let Some(highest) = map.highest_ordinal().filter(|h| *h > slot.total) {
          event!(
            Level::WARN,
            step_name = self.step_name,
            parameter = %name,
            label = highest,
            executions = slot.total,
            "Execution label exceeds the number of executions of the step."
          );
        }
      }
    }
  }
}
