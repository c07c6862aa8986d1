// conveyor/src/registry/definition.rs

//! Step and pipeline definitions as declared in registry documents.

use crate::config::document::{describe, single_entry};
use crate::config::execution::{is_per_execution, parse_execution_map, ExecutionLabel, ExecutionMap};
use crate::config::merge::{parse_layer, ParameterDefaults, ParameterLayer};
use crate::core::step::Step;
use crate::error::{ConveyorError, ConveyorResult};
use crate::registry::plugins::{Plugins, StepFactory};
use indexmap::IndexMap;
use serde_yaml::Value;
use tracing::{event, Level};

const CLASS: &str = "class";
const PARAMETERS: &str = "parameters";
const INPUT_ELEMENTS: &str = "input_elements";
const OUTPUT_ELEMENTS: &str = "output_elements";
const STEPS: &str = "steps";
const ELEMENT_PROVIDERS: &str = "element_providers";

/// Qualifies a name declared in an auxiliary document with its namespace.
pub(crate) fn qualify(namespace: Option<&str>, name: &str) -> String {
  match namespace {
    Some(ns) => format!("{}.{}", ns, name),
    None => name.to_string(),
  }
}

/// Qualifies an element name declared by a step. Names that already carry a
/// namespace refer to another document's element and are kept as written.
pub(crate) fn qualify_element(namespace: Option<&str>, name: &str) -> String {
  if name.contains('.') {
    name.to_string()
  } else {
    qualify(namespace, name)
  }
}

/// A step as registered in a steps registry. Immutable once loaded.
#[derive(Clone)]
pub struct StepDefinition {
  /// Canonical name: bare for the primary registry, `<namespace>.<name>` otherwise.
  pub name: String,
  /// Namespace of the auxiliary registry that declared the step.
  pub namespace: Option<String>,
  /// Identifier of the implementation in the plugin catalog.
  pub implementation: String,
  pub defaults: ParameterDefaults,
  /// Required input element names, qualified like the step name unless they
  /// name another document's element.
  pub inputs: Vec<String>,
  /// Produced output element names.
  pub outputs: Vec<String>,
  pub(crate) factory: StepFactory,
}

// StepFactory does not implement Debug.
impl std::fmt::Debug for StepDefinition {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDefinition")
      .field("name", &self.name)
      .field("namespace", &self.namespace)
      .field("implementation", &self.implementation)
      .field("defaults", &self.defaults)
      .field("inputs", &self.inputs)
      .field("outputs", &self.outputs)
      .finish()
  }
}

impl StepDefinition {
  pub fn instantiate(&self) -> Box<dyn Step> {
    (self.factory)()
  }

  /// Prefix the step's own element names carry (`"<namespace>."` or empty).
  pub fn element_prefix(&self) -> String {
    self.namespace.as_deref().map(|ns| format!("{}.", ns)).unwrap_or_default()
  }

  pub fn declares_input(&self, element: &str) -> bool {
    self.inputs.iter().any(|e| e == element)
  }

  pub fn declares_output(&self, element: &str) -> bool {
    self.outputs.iter().any(|e| e == element)
  }

  pub(crate) fn parse(
    document: &str,
    namespace: Option<&str>,
    bare_name: &str,
    node: &Value,
    plugins: &Plugins,
  ) -> ConveyorResult<Self> {
    let name = qualify(namespace, bare_name);
    let body = node.as_mapping().ok_or_else(|| {
      ConveyorError::registry(document, format!("registered step '{}' must be a mapping node", name))
    })?;

    for key in body.keys() {
      match key.as_str() {
        Some(CLASS) | Some(PARAMETERS) | Some(INPUT_ELEMENTS) | Some(OUTPUT_ELEMENTS) => {}
        other => event!(Level::WARN, step_name = %name, key = ?other, "Ignoring unknown key in step registration."),
      }
    }

    let implementation = match body.get(CLASS) {
      Some(Value::String(id)) => id.clone(),
      Some(other) => {
        return Err(ConveyorError::registry(
          document,
          format!("'{}' of step '{}' must be a string, found {}", CLASS, name, describe(other)),
        ))
      }
      None => {
        return Err(ConveyorError::registry(
          document,
          format!("registered step '{}' must have a '{}' node", name, CLASS),
        ))
      }
    };
    let factory = plugins.step_factory(&implementation).ok_or_else(|| {
      ConveyorError::registry(
        document,
        format!("implementation '{}' of step '{}' is not registered", implementation, name),
      )
    })?;

    let defaults = ParameterDefaults::from_node(&name, body.get(PARAMETERS))?;
    let inputs = parse_element_list(document, &name, namespace, INPUT_ELEMENTS, body.get(INPUT_ELEMENTS))?;
    let outputs = parse_element_list(document, &name, namespace, OUTPUT_ELEMENTS, body.get(OUTPUT_ELEMENTS))?;

    Ok(Self {
      name,
      namespace: namespace.map(str::to_string),
      implementation,
      defaults,
      inputs,
      outputs,
      factory,
    })
  }
}

fn parse_element_list(
  document: &str,
  step_name: &str,
  namespace: Option<&str>,
  key: &str,
  node: Option<&Value>,
) -> ConveyorResult<Vec<String>> {
  let items = match node {
    None | Some(Value::Null) => return Ok(Vec::new()),
    Some(Value::Sequence(items)) => items,
    Some(other) => {
      return Err(ConveyorError::registry(
        document,
        format!("'{}' of step '{}' must be a sequence node, found {}", key, step_name, describe(other)),
      ))
    }
  };
  let mut names: Vec<String> = Vec::with_capacity(items.len());
  for item in items {
    let element = item.as_str().ok_or_else(|| {
      ConveyorError::registry(document, format!("'{}' of step '{}' must only contain strings", key, step_name))
    })?;
    let element = qualify_element(namespace, element);
    if names.contains(&element) {
      return Err(ConveyorError::registry(
        document,
        format!("element '{}' is listed more than once in '{}' of step '{}'", element, key, step_name),
      ));
    }
    names.push(element);
  }
  Ok(names)
}

/// Which element(s) a provider step contributes to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderSpec {
  /// The provider runs exactly once and contributes this element.
  Single(String),
  /// Elements contributed by specific executions of the provider.
  PerExecution(ExecutionMap<Vec<String>>),
}

/// One occurrence of a step in a pipeline's step list.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReference {
  /// Step name as written (bare or qualified).
  pub step: String,
  pub parameters: ParameterLayer,
  /// Provider step name as written, to what it provides.
  pub element_providers: IndexMap<String, ProviderSpec>,
}

impl StepReference {
  pub fn bare(step: impl Into<String>) -> Self {
    Self {
      step: step.into(),
      parameters: ParameterLayer::new(),
      element_providers: IndexMap::new(),
    }
  }
}

/// A named pipeline. Its step order is the execution order and is never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
  pub name: String,
  pub steps: Vec<StepReference>,
}

impl PipelineDefinition {
  pub(crate) fn parse(document: &str, name: &str, node: &Value) -> ConveyorResult<Self> {
    let steps = node
      .as_mapping()
      .and_then(|body| body.get(STEPS))
      .ok_or_else(|| {
        ConveyorError::registry(document, format!("pipeline '{}' must have a '{}' sequence node", name, STEPS))
      })?;
    let steps = steps.as_sequence().ok_or_else(|| {
      ConveyorError::registry(document, format!("'{}' of pipeline '{}' must be a sequence node", STEPS, name))
    })?;

    let references = steps
      .iter()
      .filter(|entry| !entry.is_null())
      .map(|entry| parse_reference(document, name, entry))
      .collect::<ConveyorResult<Vec<_>>>()?;
    if references.is_empty() {
      return Err(ConveyorError::registry(
        document,
        format!("pipeline '{}' must have at least one step", name),
      ));
    }

    Ok(Self {
      name: name.to_string(),
      steps: references,
    })
  }
}

fn parse_reference(document: &str, pipeline: &str, entry: &Value) -> ConveyorResult<StepReference> {
  if let Value::String(step) = entry {
    return Ok(StepReference::bare(step.clone()));
  }
  let (step, body) = single_entry(entry).ok_or_else(|| {
    ConveyorError::registry(
      document,
      format!(
        "steps of pipeline '{}' must be step names or single-key mappings named after a step",
        pipeline
      ),
    )
  })?;
  let body = body
    .as_mapping()
    .filter(|body| !body.is_empty())
    .ok_or_else(|| {
      ConveyorError::registry(
        document,
        format!(
          "step '{}' in pipeline '{}' must map to a node with '{}' and/or '{}'",
          step, pipeline, PARAMETERS, ELEMENT_PROVIDERS
        ),
      )
    })?;
  for key in body.keys() {
    if !matches!(key.as_str(), Some(PARAMETERS) | Some(ELEMENT_PROVIDERS)) {
      return Err(ConveyorError::registry(
        document,
        format!(
          "step '{}' in pipeline '{}' may only contain '{}' and '{}'",
          step, pipeline, PARAMETERS, ELEMENT_PROVIDERS
        ),
      ));
    }
  }

  let parameters = match body.get(PARAMETERS) {
    Some(node) => parse_layer(step, node)?,
    None => ParameterLayer::new(),
  };

  let mut element_providers = IndexMap::new();
  if let Some(node) = body.get(ELEMENT_PROVIDERS) {
    let providers = node.as_mapping().ok_or_else(|| {
      ConveyorError::registry(
        document,
        format!("'{}' of step '{}' in pipeline '{}' must be a mapping node", ELEMENT_PROVIDERS, step, pipeline),
      )
    })?;
    for (provider, spec) in providers {
      let provider = provider.as_str().ok_or_else(|| {
        ConveyorError::registry(document, format!("element provider names in pipeline '{}' must be strings", pipeline))
      })?;
      let spec = parse_provider(spec).map_err(|msg| {
        ConveyorError::registry(
          document,
          format!("provider '{}' of step '{}' in pipeline '{}': {}", provider, step, pipeline, msg),
        )
      })?;
      element_providers.insert(provider.to_string(), spec);
    }
  }

  Ok(StepReference {
    step: step.to_string(),
    parameters,
    element_providers,
  })
}

fn parse_provider(node: &Value) -> Result<ProviderSpec, String> {
  match node {
    Value::String(element) => Ok(ProviderSpec::Single(element.clone())),
    Value::Mapping(mapping) if is_per_execution(mapping) => {
      let mut seen: Vec<String> = Vec::new();
      let map = parse_execution_map(mapping, |label, entry| {
        if label == ExecutionLabel::Others {
          return Err(format!(
            "'{}' is not allowed for element providers; name the execution explicitly",
            label
          ));
        }
        let elements = match entry {
          Value::String(element) => vec![element.clone()],
          Value::Sequence(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| format!("'{}' must be a string or a sequence of strings", label))?,
          _ => return Err(format!("'{}' must be a string or a sequence of strings", label)),
        };
        for element in &elements {
          if seen.contains(element) {
            return Err(format!("element '{}' is provided more than once", element));
          }
          seen.push(element.clone());
        }
        Ok(elements)
      })?;
      Ok(ProviderSpec::PerExecution(map))
    }
    other => Err(format!(
      "expected an element name or a mapping of execution labels, found {}",
      describe(other)
    )),
  }
}
