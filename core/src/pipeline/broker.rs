// conveyor/src/pipeline/broker.rs

//! Run-scoped storage of published state elements.
//!
//! Every published value is wrapped in the container bound to its element name
//! and validated before it is stored under `(producing invocation, element)`.
//! A key is written once. Consumers read through the input bindings resolved at
//! assembly time, never by searching the store.

use crate::core::element::{ElementContainer, ElementValue};
use crate::core::step::InvocationId;
use crate::error::{ConveyorError, ConveyorResult};
use crate::pipeline::assembler::StepInvocation;
use crate::registry::index::{ContainerBinding, RegistryIndex};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{event, Level};

/// A validated element in the store.
pub struct PublishedElement {
  pub container: String,
  holder: Box<dyn ElementContainer>,
}

impl PublishedElement {
  pub fn value(&self) -> &ElementValue {
    self.holder.element()
  }
}

impl std::fmt::Debug for PublishedElement {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PublishedElement").field("container", &self.container).finish()
  }
}

/// A publish refused by a container, kept until the engine collects it so the
/// run fails even if the step discarded the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
  pub invocation: InvocationId,
  pub element: String,
  pub container: String,
  pub message: String,
}

#[derive(Debug, Default)]
pub struct ElementBroker {
  bindings: IndexMap<String, ContainerBinding>,
  store: HashMap<InvocationId, HashMap<String, PublishedElement>>,
  rejection: Option<Rejection>,
}

impl ElementBroker {
  pub fn new(bindings: IndexMap<String, ContainerBinding>) -> Self {
    Self {
      bindings,
      store: HashMap::new(),
      rejection: None,
    }
  }

  pub fn from_index(index: &RegistryIndex) -> Self {
    Self::new(index.bindings().clone())
  }

  /// Validates `value` with the container bound to `element` and stores it.
  ///
  /// `element` must be one of the invocation's declared outputs, in canonical form.
  pub fn publish(&mut self, invocation: &StepInvocation, element: &str, value: ElementValue) -> ConveyorResult<()> {
    let access_error = |message: &str| ConveyorError::ElementAccess {
      invocation: invocation.id.clone(),
      element: element.to_string(),
      message: message.to_string(),
    };

    if !invocation.definition.declares_output(element) {
      return Err(access_error("not a declared output of the step"));
    }
    let binding = self
      .bindings
      .get(element)
      .ok_or_else(|| access_error("no element container is bound to this element"))?;
    if self
      .store
      .get(&invocation.id)
      .map_or(false, |published| published.contains_key(element))
    {
      return Err(access_error("already published; elements cannot be overwritten"));
    }

    let holder = (binding.factory)(value);
    if let Err(source) = holder.validate_contents() {
      event!(
        Level::ERROR,
        step_name = %invocation.id.step_name,
        ordinal = invocation.id.ordinal,
        element,
        container = %binding.container,
        error = %source,
        "Element rejected by its container."
      );
      self.rejection = Some(Rejection {
        invocation: invocation.id.clone(),
        element: element.to_string(),
        container: binding.container.clone(),
        message: format!("{:#}", source),
      });
      return Err(ConveyorError::ElementValidation {
        invocation: invocation.id.clone(),
        element: element.to_string(),
        container: binding.container.clone(),
        source,
      });
    }

    event!(
      Level::DEBUG,
      step_name = %invocation.id.step_name,
      ordinal = invocation.id.ordinal,
      element,
      "Element published."
    );
    let container = binding.container.clone();
    self
      .store
      .entry(invocation.id.clone())
      .or_default()
      .insert(element.to_string(), PublishedElement { container, holder });
    Ok(())
  }

  /// Returns the value bound to one of the invocation's declared inputs.
  pub fn fetch(&self, invocation: &StepInvocation, element: &str) -> ConveyorResult<ElementValue> {
    let binding = invocation.inputs.get(element).ok_or_else(|| ConveyorError::ElementAccess {
      invocation: invocation.id.clone(),
      element: element.to_string(),
      message: "not a declared input of the step".to_string(),
    })?;
    self
      .published(&binding.provider, &binding.element)
      .map(|published| published.value().clone())
      .ok_or_else(|| ConveyorError::ElementAccess {
        invocation: invocation.id.clone(),
        element: element.to_string(),
        message: format!(
          "{} has not published it yet; the provider must run before its consumer",
          binding.provider
        ),
      })
  }

  pub fn published(&self, provider: &InvocationId, element: &str) -> Option<&PublishedElement> {
    self.store.get(provider).and_then(|published| published.get(element))
  }

  pub fn is_published(&self, provider: &InvocationId, element: &str) -> bool {
    self.published(provider, element).is_some()
  }

  /// Number of elements stored in this run.
  pub fn len(&self) -> usize {
    self.store.values().map(HashMap::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub(crate) fn take_rejection(&mut self) -> Option<Rejection> {
    self.rejection.take()
  }
}
