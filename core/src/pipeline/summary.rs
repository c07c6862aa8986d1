// conveyor/src/pipeline/summary.rs

//! A serializable description of an assembled run, written at the head of the
//! host's report before any step executes.

use crate::config::globals::GlobalParameters;
use crate::config::merge::Parameters;
use crate::pipeline::assembler::{AssembledPipeline, InputBinding};
use crate::registry::index::RegistryIndex;
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PipelineSummary {
  pub global_parameters: GlobalParameters,
  pub pipeline: String,
  pub steps: Vec<InvocationSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationSummary {
  pub step: String,
  pub execution: u32,
  pub executions: u32,
  pub implementation: String,
  #[serde(skip_serializing_if = "Parameters::is_empty")]
  pub parameters: Parameters,
  #[serde(skip_serializing_if = "IndexMap::is_empty")]
  pub inputs: IndexMap<String, InputBinding>,
  /// Output element to the container that validates it.
  #[serde(skip_serializing_if = "IndexMap::is_empty")]
  pub outputs: IndexMap<String, String>,
}

impl PipelineSummary {
  pub fn new(index: &RegistryIndex, globals: &GlobalParameters, pipeline: &AssembledPipeline) -> Self {
    let steps = pipeline
      .invocations
      .iter()
      .map(|invocation| InvocationSummary {
        step: invocation.id.step_name.clone(),
        execution: invocation.id.ordinal,
        executions: invocation.total_executions,
        implementation: invocation.definition.implementation.clone(),
        parameters: invocation.parameters.clone(),
        inputs: invocation.inputs.clone(),
        outputs: invocation
          .definition
          .outputs
          .iter()
          .map(|element| {
            let container = index
              .container(element)
              .map(|binding| binding.container.clone())
              .unwrap_or_default();
            (element.clone(), container)
          })
          .collect(),
      })
      .collect();

    Self {
      global_parameters: globals.clone(),
      pipeline: pipeline.name.clone(),
      steps,
    }
  }

  pub fn to_yaml(&self) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(self)?)
  }
}
