// conveyor/src/core/context.rs

//! The arguments a step receives in each phase.
//!
//! `CheckContext` is read-only: the invocation's identity, its merged
//! parameters, and the global parameters. `RunContext` adds the run state, so a
//! running step can publish and fetch elements and append output.

use crate::config::globals::GlobalParameters;
use crate::config::merge::Parameters;
use crate::core::element::{downcast_element, ElementValue};
use crate::core::run_state::RunState;
use crate::core::step::InvocationId;
use crate::error::{ConveyorError, ConveyorResult};
use crate::pipeline::assembler::StepInvocation;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::any::Any;
use std::sync::Arc;

pub struct CheckContext<'a> {
  invocation: &'a StepInvocation,
  globals: &'a GlobalParameters,
}

impl<'a> CheckContext<'a> {
  pub fn new(invocation: &'a StepInvocation, globals: &'a GlobalParameters) -> Self {
    Self { invocation, globals }
  }

  pub fn invocation(&self) -> &StepInvocation {
    self.invocation
  }

  pub fn id(&self) -> &InvocationId {
    &self.invocation.id
  }

  pub fn step_name(&self) -> &str {
    self.invocation.step_name()
  }

  /// 1-based execution ordinal of this invocation.
  pub fn ordinal(&self) -> u32 {
    self.invocation.ordinal()
  }

  pub fn total_executions(&self) -> u32 {
    self.invocation.total_executions
  }

  pub fn parameters(&self) -> &Parameters {
    &self.invocation.parameters
  }

  pub fn param(&self, name: &str) -> ConveyorResult<&Value> {
    param_value(self.invocation, name)
  }

  pub fn param_as<T: DeserializeOwned>(&self, name: &str) -> ConveyorResult<T> {
    decode(&self.invocation.id, name, param_value(self.invocation, name)?)
  }

  pub fn global(&self, name: &str) -> Option<&Value> {
    self.globals.get(name)
  }

  pub fn global_as<T: DeserializeOwned>(&self, name: &str) -> ConveyorResult<T> {
    decode(&self.invocation.id, name, global_value(self.invocation, self.globals, name)?)
  }

  pub fn globals(&self) -> &GlobalParameters {
    self.globals
  }
}

pub struct RunContext<'a> {
  invocation: &'a StepInvocation,
  state: &'a mut RunState,
}

impl<'a> RunContext<'a> {
  pub fn new(invocation: &'a StepInvocation, state: &'a mut RunState) -> Self {
    Self { invocation, state }
  }

  pub fn invocation(&self) -> &StepInvocation {
    self.invocation
  }

  pub fn id(&self) -> &InvocationId {
    &self.invocation.id
  }

  pub fn step_name(&self) -> &str {
    self.invocation.step_name()
  }

  pub fn ordinal(&self) -> u32 {
    self.invocation.ordinal()
  }

  pub fn total_executions(&self) -> u32 {
    self.invocation.total_executions
  }

  pub fn parameters(&self) -> &Parameters {
    &self.invocation.parameters
  }

  pub fn param(&self, name: &str) -> ConveyorResult<&Value> {
    param_value(self.invocation, name)
  }

  pub fn param_as<T: DeserializeOwned>(&self, name: &str) -> ConveyorResult<T> {
    decode(&self.invocation.id, name, param_value(self.invocation, name)?)
  }

  pub fn global(&self, name: &str) -> Option<&Value> {
    self.state.globals().get(name)
  }

  pub fn global_as<T: DeserializeOwned>(&self, name: &str) -> ConveyorResult<T> {
    decode(
      &self.invocation.id,
      name,
      global_value(self.invocation, self.state.globals(), name)?,
    )
  }

  pub fn globals(&self) -> &GlobalParameters {
    self.state.globals()
  }

  /// Publishes one of the step's declared outputs.
  pub fn publish(&mut self, element: &str, value: ElementValue) -> ConveyorResult<()> {
    let element = self.invocation.qualify_element(element);
    self.state.elements_mut().publish(self.invocation, &element, value)
  }

  /// Wraps and publishes a concrete value.
  pub fn publish_value<T: Any + Send + Sync>(&mut self, element: &str, value: T) -> ConveyorResult<()> {
    self.publish(element, Arc::new(value))
  }

  /// Fetches one of the step's declared inputs from the invocation bound to it.
  pub fn fetch(&self, element: &str) -> ConveyorResult<ElementValue> {
    let element = self.invocation.qualify_element(element);
    self.state.elements().fetch(self.invocation, &element)
  }

  pub fn fetch_as<T: Any + Send + Sync>(&self, element: &str) -> ConveyorResult<Arc<T>> {
    let value = self.fetch(element)?;
    downcast_element::<T>(value, &self.invocation.id, element)
  }

  /// Appends a line to the run's report output.
  pub fn write_output(&mut self, line: impl Into<String>) {
    self.state.append_output(line);
  }

  /// Appends a line to the run's diagnostics.
  pub fn write_diagnostic(&mut self, line: impl Into<String>) {
    self.state.append_diagnostic(line);
  }
}

fn param_value<'v>(invocation: &'v StepInvocation, name: &str) -> ConveyorResult<&'v Value> {
  invocation
    .parameters
    .get(name)
    .ok_or_else(|| ConveyorError::merge(invocation.step_name(), name, "the step does not declare this parameter"))
}

fn global_value<'v>(invocation: &StepInvocation, globals: &'v GlobalParameters, name: &str) -> ConveyorResult<&'v Value> {
  globals
    .get(name)
    .ok_or_else(|| ConveyorError::merge(invocation.step_name(), name, "no such global parameter"))
}

fn decode<T: DeserializeOwned>(invocation: &InvocationId, name: &str, value: &Value) -> ConveyorResult<T> {
  serde_yaml::from_value(value.clone()).map_err(|_| ConveyorError::TypeMismatch {
    invocation: invocation.clone(),
    name: name.to_string(),
    expected_type: std::any::type_name::<T>().to_string(),
  })
}
