// conveyor/src/registry/plugins.rs

//! Defines `Plugins`, the explicit catalog that maps the implementation
//! identifiers used in registry documents (`class:` of a step, the value of an
//! element container binding) to factories.
//!
//! Hosts register every implementation once at startup; registry loading
//! resolves identifiers against this catalog and never looks anything up by
//! reflection.

use crate::core::element::{ElementContainer, ElementValue, TypedContainer};
use crate::core::step::Step;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, Level};

/// Creates a fresh step instance for one invocation.
pub type StepFactory = Arc<dyn Fn() -> Box<dyn Step> + Send + Sync>;

/// Wraps a published value in the container bound to its element name.
pub type ContainerFactory = Arc<dyn Fn(ElementValue) -> Box<dyn ElementContainer> + Send + Sync>;

/// Identifier-keyed catalog of step and element container implementations.
pub struct Plugins {
  steps: RwLock<HashMap<String, StepFactory>>,
  containers: RwLock<HashMap<String, ContainerFactory>>,
}

impl Default for Plugins {
  fn default() -> Self {
    Self::new()
  }
}

impl Plugins {
  /// Creates a new, empty catalog.
  pub fn new() -> Self {
    Self {
      steps: RwLock::new(HashMap::new()),
      containers: RwLock::new(HashMap::new()),
    }
  }

  /// Registers a step implementation under `identifier`.
  pub fn register_step<S, F>(&self, identifier: impl Into<String>, factory: F)
  where
    S: Step + 'static,
    F: Fn() -> S + Send + Sync + 'static,
  {
    let identifier = identifier.into();
    event!(Level::DEBUG, %identifier, step_type = %std::any::type_name::<S>(), "Registering step implementation.");
    let factory: StepFactory = Arc::new(move || Box::new(factory()) as Box<dyn Step>);
    if self.steps.write().insert(identifier.clone(), factory).is_some() {
      event!(Level::WARN, %identifier, "Step implementation replaced.");
    }
  }

  /// Registers an element container implementation under `identifier`.
  pub fn register_container<F>(&self, identifier: impl Into<String>, factory: F)
  where
    F: Fn(ElementValue) -> Box<dyn ElementContainer> + Send + Sync + 'static,
  {
    let identifier = identifier.into();
    event!(Level::DEBUG, %identifier, "Registering element container.");
    if self.containers.write().insert(identifier.clone(), Arc::new(factory)).is_some() {
      event!(Level::WARN, %identifier, "Element container replaced.");
    }
  }

  /// Registers a container for values of type `T`, validated by `validator`.
  /// Values of any other type are rejected.
  pub fn register_validator<T, V>(&self, identifier: impl Into<String>, validator: V)
  where
    T: Any + Send + Sync,
    V: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
  {
    let validator: Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync> = Arc::new(validator);
    self.register_container(identifier, move |value| {
      Box::new(TypedContainer::<T>::from_shared(value, validator.clone())) as Box<dyn ElementContainer>
    });
  }

  pub fn step_factory(&self, identifier: &str) -> Option<StepFactory> {
    self.steps.read().get(identifier).cloned()
  }

  pub fn container_factory(&self, identifier: &str) -> Option<ContainerFactory> {
    self.containers.read().get(identifier).cloned()
  }

  pub fn has_step(&self, identifier: &str) -> bool {
    self.steps.read().contains_key(identifier)
  }

  pub fn has_container(&self, identifier: &str) -> bool {
    self.containers.read().contains_key(identifier)
  }
}
