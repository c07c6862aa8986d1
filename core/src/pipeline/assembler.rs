// conveyor/src/pipeline/assembler.rs

//! Expands a pipeline definition into the ordered invocations of one run.
//!
//! Assembly takes two passes over the declared step list. The first resolves
//! every reference and counts how often each step runs, since per-execution
//! values need the total. The second assigns ordinals, merges parameters, and
//! resolves element providers into concrete input bindings. Any failure here
//! aborts the run before a single step is checked.

use crate::config::merge::{ExecutionSlot, ParameterLayer, ParameterMerger, Parameters};
use crate::config::user::UserOverrides;
use crate::core::control::InvocationStatus;
use crate::core::step::InvocationId;
use crate::error::{ConveyorError, ConveyorResult};
use crate::registry::definition::{ProviderSpec, StepDefinition, StepReference};
use crate::registry::index::RegistryIndex;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Where a consumer's input element comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputBinding {
  pub provider: InvocationId,
  pub element: String,
}

/// One occurrence of a step in a run, fully resolved.
#[derive(Debug, Clone)]
pub struct StepInvocation {
  pub id: InvocationId,
  pub definition: Arc<StepDefinition>,
  /// Total executions of the step in the pipeline.
  pub total_executions: u32,
  pub parameters: Parameters,
  /// Declared input element to the invocation that provides it.
  pub inputs: IndexMap<String, InputBinding>,
  pub status: InvocationStatus,
}

impl StepInvocation {
  pub fn step_name(&self) -> &str {
    &self.id.step_name
  }

  pub fn ordinal(&self) -> u32 {
    self.id.ordinal
  }

  /// Maps an element name used by the step's implementation to its canonical
  /// form. Steps of an auxiliary registry may use bare names.
  pub fn qualify_element(&self, name: &str) -> String {
    let definition = &self.definition;
    if definition.declares_input(name) || definition.declares_output(name) {
      return name.to_string();
    }
    format!("{}{}", definition.element_prefix(), name)
  }
}

/// The invocations of one pipeline run, in execution order.
#[derive(Debug, Clone)]
pub struct AssembledPipeline {
  pub name: String,
  pub invocations: Vec<StepInvocation>,
}

impl AssembledPipeline {
  pub fn len(&self) -> usize {
    self.invocations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.invocations.is_empty()
  }

  pub fn invocation(&self, id: &InvocationId) -> Option<&StepInvocation> {
    self.invocations.iter().find(|invocation| &invocation.id == id)
  }

  pub fn ids(&self) -> impl Iterator<Item = &InvocationId> {
    self.invocations.iter().map(|invocation| &invocation.id)
  }
}

pub struct PipelineAssembler<'a> {
  index: &'a RegistryIndex,
  user: Option<&'a UserOverrides>,
}

impl<'a> PipelineAssembler<'a> {
  pub fn new(index: &'a RegistryIndex) -> Self {
    Self { index, user: None }
  }

  /// Adds the user's per-step parameters as the highest precedence layer.
  pub fn with_user_overrides(mut self, user: &'a UserOverrides) -> Self {
    self.user = Some(user);
    self
  }

  #[instrument(name = "PipelineAssembler::assemble", skip(self))]
  pub fn assemble(&self, pipeline_name: &str) -> ConveyorResult<AssembledPipeline> {
    let pipeline = self
      .index
      .pipeline(pipeline_name)
      .ok_or_else(|| ConveyorError::UnknownPipeline {
        pipeline: pipeline_name.to_string(),
      })?;

    // Pass 1: resolve references and count executions per step.
    let mut definitions: Vec<&Arc<StepDefinition>> = Vec::with_capacity(pipeline.steps.len());
    let mut totals: HashMap<&str, u32> = HashMap::new();
    for reference in &pipeline.steps {
      let definition = self.index.step(&reference.step).ok_or_else(|| ConveyorError::Assembly {
        pipeline: pipeline_name.to_string(),
        step_name: reference.step.clone(),
        ordinal: 0,
        message: "the step is not registered".to_string(),
      })?;
      *totals.entry(definition.name.as_str()).or_insert(0) += 1;
      definitions.push(definition);
    }

    let user_layers = self.user_layers(&totals)?;

    // Pass 2: assign ordinals, merge parameters, bind inputs.
    let mut seen: HashMap<&str, u32> = HashMap::new();
    let mut invocations: Vec<StepInvocation> = Vec::with_capacity(definitions.len());
    for (reference, definition) in pipeline.steps.iter().zip(definitions) {
      let ordinal = {
        let counter = seen.entry(definition.name.as_str()).or_insert(0);
        *counter += 1;
        *counter
      };
      let total = totals.get(definition.name.as_str()).copied().unwrap_or(ordinal);

      let merger = ParameterMerger::new(&definition.name, &definition.defaults);
      merger.check_layer(&reference.parameters, "pipeline registry")?;
      for parameter in ParameterMerger::unmatched_labels(&reference.parameters, ordinal) {
        event!(
          Level::WARN,
          step_name = %definition.name,
          ordinal,
          parameter,
          "Pipeline override has no entry for this execution and is ignored."
        );
      }
      let parameters = merger.merge(
        ExecutionSlot { ordinal, total },
        &[Some(&reference.parameters), user_layers.get(definition.name.as_str()).copied()],
      )?;

      let id = InvocationId::new(definition.name.clone(), ordinal);
      let inputs = InputResolver {
        index: self.index,
        pipeline: pipeline_name,
        consumer: &id,
        definition,
        prior: &invocations,
        totals: &totals,
      }
      .resolve(reference)?;

      event!(
        Level::DEBUG,
        step_name = %id.step_name,
        ordinal,
        total,
        inputs = inputs.len(),
        "Invocation assembled."
      );
      invocations.push(StepInvocation {
        id,
        definition: Arc::clone(definition),
        total_executions: total,
        parameters,
        inputs,
        status: InvocationStatus::Pending,
      });
    }

    Ok(AssembledPipeline {
      name: pipeline_name.to_string(),
      invocations,
    })
  }

  // User step names are resolved like pipeline references and must name a registered step.
  fn user_layers(&self, totals: &HashMap<&str, u32>) -> ConveyorResult<HashMap<String, &'a ParameterLayer>> {
    let mut layers = HashMap::new();
    let user = match self.user {
      Some(user) => user,
      None => return Ok(layers),
    };
    for (written, layer) in &user.step_parameters {
      let definition = self.index.step(written).ok_or_else(|| {
        ConveyorError::user(format!("step '{}' configured in 'pipeline_config' is not registered", written))
      })?;
      ParameterMerger::new(&definition.name, &definition.defaults).check_layer(layer, "user configuration")?;
      if !totals.contains_key(definition.name.as_str()) {
        event!(
          Level::WARN,
          step_name = %definition.name,
          "Step configured by the user does not occur in the chosen pipeline."
        );
      }
      if layers.insert(definition.name.clone(), layer).is_some() {
        return Err(ConveyorError::user(format!(
          "step '{}' is configured more than once in 'pipeline_config'",
          definition.name
        )));
      }
    }
    Ok(layers)
  }
}

struct InputResolver<'r> {
  index: &'r RegistryIndex,
  pipeline: &'r str,
  consumer: &'r InvocationId,
  definition: &'r StepDefinition,
  prior: &'r [StepInvocation],
  totals: &'r HashMap<&'r str, u32>,
}

impl InputResolver<'_> {
  fn resolve(&self, reference: &StepReference) -> ConveyorResult<IndexMap<String, InputBinding>> {
    let mut bindings = IndexMap::new();
    for (provider_name, spec) in &reference.element_providers {
      let provider = self
        .index
        .step(provider_name)
        .ok_or_else(|| self.error(format!("provider '{}' is not a registered step", provider_name)))?;
      let executed_before = self.prior.iter().filter(|i| i.id.step_name == provider.name).count() as u32;
      if executed_before == 0 {
        return Err(self.error(format!(
          "provider '{}' must occur in the pipeline before the step it provides for",
          provider.name
        )));
      }

      match spec {
        ProviderSpec::Single(element) => {
          let total = self.totals.get(provider.name.as_str()).copied().unwrap_or(0);
          if total != 1 {
            return Err(self.error(format!(
              "provider '{}' runs {} times; name the execution that provides '{}' with 'execution_<n>'",
              provider.name, total, element
            )));
          }
          self.bind(&mut bindings, provider, 1, element)?;
        }
        ProviderSpec::PerExecution(map) => {
          for (ordinal, elements) in map.numbered() {
            if ordinal > executed_before {
              return Err(self.error(format!(
                "execution {} of provider '{}' does not occur before this step ({} so far)",
                ordinal, provider.name, executed_before
              )));
            }
            for element in elements {
              self.bind(&mut bindings, provider, ordinal, element)?;
            }
          }
        }
      }
    }

    let missing: Vec<&str> = self
      .definition
      .inputs
      .iter()
      .filter(|input| !bindings.contains_key(input.as_str()))
      .map(String::as_str)
      .collect();
    if !missing.is_empty() {
      return Err(self.error(format!("no provider declared for input element(s) {:?}", missing)));
    }
    Ok(bindings)
  }

  fn bind(
    &self,
    bindings: &mut IndexMap<String, InputBinding>,
    provider: &StepDefinition,
    ordinal: u32,
    written: &str,
  ) -> ConveyorResult<()> {
    let element = self.provided_element(provider, written)?;
    if !self.definition.declares_input(&element) {
      return Err(self.error(format!(
        "element '{}' from provider '{}' is not a declared input of the step",
        element, provider.name
      )));
    }
    if bindings.contains_key(&element) {
      return Err(self.error(format!("element '{}' is provided more than once", element)));
    }
    bindings.insert(
      element.clone(),
      InputBinding {
        provider: InvocationId::new(provider.name.clone(), ordinal),
        element,
      },
    );
    Ok(())
  }

  // Another registry's elements are named qualified, exactly as the provider declares them.
  fn provided_element(&self, provider: &StepDefinition, written: &str) -> ConveyorResult<String> {
    let canonical = self.index.canonical_element(written);
    if provider.declares_output(canonical) {
      return Ok(canonical.to_string());
    }
    let qualified = format!("{}{}", provider.element_prefix(), written);
    let hint = if provider.namespace.is_some() && provider.declares_output(&qualified) {
      format!(" (write it as '{}')", qualified)
    } else {
      String::new()
    };
    Err(self.error(format!(
      "element '{}' is not a declared output of provider '{}'{}",
      written, provider.name, hint
    )))
  }

  fn error(&self, message: String) -> ConveyorError {
    ConveyorError::Assembly {
      pipeline: self.pipeline.to_string(),
      step_name: self.consumer.step_name.clone(),
      ordinal: self.consumer.ordinal,
      message,
    }
  }
}
