// conveyor/src/registry/index.rs

//! The unified lookup over a primary registry document and its auxiliary
//! registries.
//!
//! Entries of the primary registry are addressable by their bare name (or as
//! `<primary>.<name>`). Entries of an auxiliary registry are only reachable
//! through their qualified `<namespace>.<name>` form, where the namespace is the
//! name the host gave the auxiliary document. Element names declared by an
//! auxiliary step are qualified the same way, so a step's element names always
//! match the container bindings of the document that declared it.

use crate::config::document::{describe, load_document, parse_document};
use crate::config::globals::GlobalParameters;
use crate::error::{ConveyorError, ConveyorResult};
use crate::registry::definition::{qualify, PipelineDefinition, StepDefinition};
use crate::registry::plugins::{ContainerFactory, Plugins};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{event, instrument, Level};

const GLOBAL_PARAMETERS: &str = "global_parameters";
const PIPELINES_REGISTRY: &str = "pipelines_registry";
const STEPS_REGISTRY: &str = "steps_registry";
const ELEMENT_CONTAINERS_REGISTRY: &str = "element_containers_registry";

/// A parsed registry document and the name it is known by.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDocument {
  pub name: String,
  pub tree: Value,
}

impl RegistryDocument {
  pub fn new(name: impl Into<String>, tree: Value) -> Self {
    Self { name: name.into(), tree }
  }

  pub fn from_yaml_str(name: impl Into<String>, source: &str) -> ConveyorResult<Self> {
    let name = name.into();
    let tree = parse_document(source).map_err(|e| ConveyorError::registry(&name, format!("{:#}", e)))?;
    Ok(Self { name, tree })
  }

  pub fn load(name: impl Into<String>, path: impl AsRef<Path>) -> ConveyorResult<Self> {
    Ok(Self::new(name, load_document(path)?))
  }
}

/// Binds an element name to the container that validates its values.
#[derive(Clone)]
pub struct ContainerBinding {
  pub element: String,
  pub container: String,
  pub(crate) factory: ContainerFactory,
}

impl std::fmt::Debug for ContainerBinding {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ContainerBinding")
      .field("element", &self.element)
      .field("container", &self.container)
      .finish()
  }
}

#[derive(Debug)]
pub struct RegistryIndex {
  primary: String,
  namespaces: Vec<String>,
  globals: GlobalParameters,
  steps: IndexMap<String, Arc<StepDefinition>>,
  pipelines: IndexMap<String, PipelineDefinition>,
  containers: IndexMap<String, ContainerBinding>,
}

impl RegistryIndex {
  /// Loads the primary document and the auxiliary documents, in order.
  ///
  /// Only the primary document contributes global parameters and pipelines;
  /// auxiliary documents contribute steps and element container bindings.
  #[instrument(name = "RegistryIndex::load", skip_all, fields(primary = %primary.name, auxiliaries = auxiliaries.len()))]
  pub fn load(primary: &RegistryDocument, auxiliaries: &[RegistryDocument], plugins: &Plugins) -> ConveyorResult<Self> {
    check_document_name(&primary.name)?;
    let root = root_mapping(primary)?;
    for key in [PIPELINES_REGISTRY, STEPS_REGISTRY, ELEMENT_CONTAINERS_REGISTRY] {
      if !root.contains_key(key) {
        return Err(ConveyorError::registry(
          &primary.name,
          format!("the registry must contain a '{}' node", key),
        ));
      }
    }
    let globals = root.get(GLOBAL_PARAMETERS).ok_or_else(|| {
      ConveyorError::registry(
        &primary.name,
        format!("the registry must contain a '{}' node", GLOBAL_PARAMETERS),
      )
    })?;
    let globals = GlobalParameters::from_registry(&primary.name, globals)?;

    let mut index = Self {
      primary: primary.name.clone(),
      namespaces: Vec::with_capacity(auxiliaries.len()),
      globals,
      steps: IndexMap::new(),
      pipelines: IndexMap::new(),
      containers: IndexMap::new(),
    };

    index.load_entries(&primary.name, None, root, plugins)?;
    let pipelines = section(&primary.name, root, PIPELINES_REGISTRY)?;
    for (key, node) in pipelines {
      let name = entry_name(&primary.name, PIPELINES_REGISTRY, key)?;
      index
        .pipelines
        .insert(name.to_string(), PipelineDefinition::parse(&primary.name, name, node)?);
    }

    for auxiliary in auxiliaries {
      check_document_name(&auxiliary.name)?;
      if auxiliary.name == index.primary || index.namespaces.contains(&auxiliary.name) {
        return Err(ConveyorError::registry(
          &auxiliary.name,
          "registry document names must be unique",
        ));
      }
      let root = root_mapping(auxiliary)?;
      for key in [STEPS_REGISTRY, ELEMENT_CONTAINERS_REGISTRY] {
        if !root.contains_key(key) {
          return Err(ConveyorError::registry(
            &auxiliary.name,
            format!("an auxiliary registry must contain a '{}' node", key),
          ));
        }
      }
      for key in [GLOBAL_PARAMETERS, PIPELINES_REGISTRY] {
        if root.contains_key(key) {
          event!(Level::DEBUG, document = %auxiliary.name, key, "Ignoring section of auxiliary registry.");
        }
      }
      index.load_entries(&auxiliary.name, Some(&auxiliary.name), root, plugins)?;
      index.namespaces.push(auxiliary.name.clone());
    }

    index.check_element_flow()?;
    index.check_pipeline_references()?;

    event!(
      Level::DEBUG,
      steps = index.steps.len(),
      pipelines = index.pipelines.len(),
      containers = index.containers.len(),
      "Registry index loaded."
    );
    Ok(index)
  }

  fn load_entries(&mut self, document: &str, namespace: Option<&str>, root: &Mapping, plugins: &Plugins) -> ConveyorResult<()> {
    // A registry whose steps exchange no elements binds no containers.
    let containers = match root.get(ELEMENT_CONTAINERS_REGISTRY) {
      Some(Value::Null) => None,
      Some(Value::Mapping(mapping)) if mapping.is_empty() => None,
      _ => Some(section(document, root, ELEMENT_CONTAINERS_REGISTRY)?),
    };
    for (key, node) in containers.into_iter().flatten() {
      let element = qualify(namespace, entry_name(document, ELEMENT_CONTAINERS_REGISTRY, key)?);
      let container = node.as_str().ok_or_else(|| {
        ConveyorError::registry(
          document,
          format!("container of element '{}' must be a string, found {}", element, describe(node)),
        )
      })?;
      let factory = plugins.container_factory(container).ok_or_else(|| {
        ConveyorError::registry(
          document,
          format!("container '{}' of element '{}' is not registered", container, element),
        )
      })?;
      self.containers.insert(
        element.clone(),
        ContainerBinding {
          element,
          container: container.to_string(),
          factory,
        },
      );
    }
    self.load_steps(document, namespace, root, plugins)
  }

  fn load_steps(&mut self, document: &str, namespace: Option<&str>, root: &Mapping, plugins: &Plugins) -> ConveyorResult<()> {
    let steps = section(document, root, STEPS_REGISTRY)?;
    for (key, node) in steps {
      let bare_name = entry_name(document, STEPS_REGISTRY, key)?;
      let mut definition = StepDefinition::parse(document, namespace, bare_name, node, plugins)?;
      for element in definition.inputs.iter_mut().chain(definition.outputs.iter_mut()) {
        let canonical = self.canonical(element).to_string();
        *element = canonical;
      }
      event!(Level::TRACE, step_name = %definition.name, implementation = %definition.implementation, "Step registered.");
      self.steps.insert(definition.name.clone(), Arc::new(definition));
    }
    Ok(())
  }

  // Every element needs a binding and every required input must be producible by some step.
  fn check_element_flow(&self) -> ConveyorResult<()> {
    for step in self.steps.values() {
      for element in step.inputs.iter().chain(&step.outputs) {
        if !self.containers.contains_key(element) {
          return Err(ConveyorError::registry(
            self.document_of(step),
            format!(
              "element '{}' of step '{}' has no binding in '{}'",
              element, step.name, ELEMENT_CONTAINERS_REGISTRY
            ),
          ));
        }
      }
      for input in &step.inputs {
        if !self.steps.values().any(|s| s.declares_output(input)) {
          return Err(ConveyorError::registry(
            self.document_of(step),
            format!(
              "input element '{}' of step '{}' is not an output of any registered step",
              input, step.name
            ),
          ));
        }
      }
    }
    Ok(())
  }

  fn check_pipeline_references(&self) -> ConveyorResult<()> {
    for pipeline in self.pipelines.values() {
      for reference in &pipeline.steps {
        let names = std::iter::once(&reference.step).chain(reference.element_providers.keys());
        for name in names {
          if self.step(name).is_none() {
            return Err(ConveyorError::registry(
              &self.primary,
              format!("pipeline '{}' references unknown step '{}'", pipeline.name, name),
            ));
          }
        }
      }
    }
    Ok(())
  }

  fn document_of<'a>(&'a self, step: &'a StepDefinition) -> &'a str {
    step.namespace.as_deref().unwrap_or(&self.primary)
  }

  // Bare names and `<primary>.<name>` address the primary registry.
  fn canonical<'a>(&self, identifier: &'a str) -> &'a str {
    identifier
      .strip_prefix(self.primary.as_str())
      .and_then(|rest| rest.strip_prefix('.'))
      .unwrap_or(identifier)
  }

  pub(crate) fn canonical_element<'a>(&self, element: &'a str) -> &'a str {
    self.canonical(element)
  }

  pub(crate) fn bindings(&self) -> &IndexMap<String, ContainerBinding> {
    &self.containers
  }

  pub fn step(&self, identifier: &str) -> Option<&Arc<StepDefinition>> {
    self.steps.get(self.canonical(identifier))
  }

  pub fn container(&self, element: &str) -> Option<&ContainerBinding> {
    self.containers.get(self.canonical(element))
  }

  pub fn pipeline(&self, name: &str) -> Option<&PipelineDefinition> {
    self.pipelines.get(name)
  }

  pub fn pipeline_names(&self) -> impl Iterator<Item = &str> {
    self.pipelines.keys().map(String::as_str)
  }

  pub fn steps(&self) -> impl Iterator<Item = &Arc<StepDefinition>> {
    self.steps.values()
  }

  pub fn globals(&self) -> &GlobalParameters {
    &self.globals
  }

  pub fn primary_name(&self) -> &str {
    &self.primary
  }

  pub fn namespaces(&self) -> &[String] {
    &self.namespaces
  }
}

fn check_document_name(name: &str) -> ConveyorResult<()> {
  if name.is_empty() || name.contains('.') {
    return Err(ConveyorError::registry(
      name,
      "registry document names must be non-empty and must not contain '.'",
    ));
  }
  Ok(())
}

fn root_mapping(document: &RegistryDocument) -> ConveyorResult<&Mapping> {
  document.tree.as_mapping().ok_or_else(|| {
    ConveyorError::registry(
      &document.name,
      format!("the registry must be a mapping node, found {}", describe(&document.tree)),
    )
  })
}

fn section<'a>(document: &str, root: &'a Mapping, key: &str) -> ConveyorResult<&'a Mapping> {
  match root.get(key) {
    Some(Value::Mapping(mapping)) if !mapping.is_empty() => Ok(mapping),
    Some(Value::Mapping(_)) | Some(Value::Null) => {
      Err(ConveyorError::registry(document, format!("'{}' must not be empty", key)))
    }
    Some(other) => Err(ConveyorError::registry(
      document,
      format!("'{}' must be a mapping node, found {}", key, describe(other)),
    )),
    None => Err(ConveyorError::registry(document, format!("the registry must contain a '{}' node", key))),
  }
}

// Dots are reserved for qualified names.
fn entry_name<'a>(document: &str, section: &str, key: &'a Value) -> ConveyorResult<&'a str> {
  match key.as_str() {
    Some(name) if !name.is_empty() && !name.contains('.') => Ok(name),
    Some(name) => Err(ConveyorError::registry(
      document,
      format!("'{}' in '{}' is not a valid name: names must be non-empty and must not contain '.'", name, section),
    )),
    None => Err(ConveyorError::registry(document, format!("all keys of '{}' must be strings", section))),
  }
}
