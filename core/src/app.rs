// conveyor/src/app.rs

//! Defines `Application`, the host entry point: it owns the loaded registry
//! index and runs exactly one pipeline per user document.

use crate::config::document::{load_document, INPUT_FILENAME};
use crate::config::user::UserOverrides;
use crate::core::control::{InvocationStatus, RunOutcome};
use crate::core::run_state::RunState;
use crate::core::step::InvocationId;
use crate::error::{ConveyorError, ConveyorResult};
use crate::pipeline::assembler::{AssembledPipeline, PipelineAssembler};
use crate::pipeline::broker::ElementBroker;
use crate::pipeline::execution::ExecutionEngine;
use crate::pipeline::summary::PipelineSummary;
use crate::registry::index::{RegistryDocument, RegistryIndex};
use crate::registry::plugins::Plugins;
use serde_yaml::Value;
use std::path::Path;
use tracing::{event, instrument, Level};

#[derive(Debug)]
pub struct Application {
  index: RegistryIndex,
  primary_pipeline: Option<String>,
  engine: ExecutionEngine,
}

impl Application {
  /// Loads the registries. When `primary_pipeline` is given, it must name a
  /// pipeline of the primary registry and is the only pipeline users may run.
  #[instrument(name = "Application::new", skip_all, fields(primary = %primary.name))]
  pub fn new(
    plugins: &Plugins,
    primary: &RegistryDocument,
    auxiliaries: &[RegistryDocument],
    primary_pipeline: Option<String>,
  ) -> ConveyorResult<Self> {
    let index = RegistryIndex::load(primary, auxiliaries, plugins)?;
    if let Some(name) = &primary_pipeline {
      if index.pipeline(name).is_none() {
        return Err(ConveyorError::registry(
          &primary.name,
          format!("primary pipeline '{}' is not defined in 'pipelines_registry'", name),
        ));
      }
    }
    Ok(Self {
      index,
      primary_pipeline,
      engine: ExecutionEngine::new(),
    })
  }

  pub fn index(&self) -> &RegistryIndex {
    &self.index
  }

  pub fn primary_pipeline(&self) -> Option<&str> {
    self.primary_pipeline.as_deref()
  }

  /// Resolves the user document into an assembled, not yet executed run.
  #[instrument(name = "Application::prepare", skip_all)]
  pub fn prepare(&self, user_document: &Value) -> ConveyorResult<PreparedRun> {
    let user = UserOverrides::from_document(user_document)?;
    let chosen = user.chosen_pipeline.as_str();

    if let Some(expected) = &self.primary_pipeline {
      if chosen != expected {
        return Err(ConveyorError::NotPrimaryPipeline {
          requested: chosen.to_string(),
          expected: expected.clone(),
        });
      }
    }
    if self.index.pipeline(chosen).is_none() {
      let available: Vec<&str> = self.index.pipeline_names().collect();
      return Err(ConveyorError::user(format!(
        "chosen pipeline '{}' is not defined; available pipelines: {:?}",
        chosen, available
      )));
    }

    let mut globals = self.index.globals().clone();
    globals.apply_overrides(&user.global_parameters)?;

    let pipeline = PipelineAssembler::new(&self.index)
      .with_user_overrides(&user)
      .assemble(chosen)?;
    let summary = PipelineSummary::new(&self.index, &globals, &pipeline);
    event!(
      Level::INFO,
      pipeline = chosen,
      invocations = pipeline.len(),
      output_file = globals.output_file(),
      "Pipeline assembled."
    );

    let state = RunState::new(globals, ElementBroker::from_index(&self.index));
    Ok(PreparedRun {
      pipeline,
      state,
      summary,
      engine: self.engine,
    })
  }

  /// Assembles and executes the pipeline chosen by `user_document`.
  ///
  /// Errors found before any step is checked are returned as `Err`; the outcome
  /// of the check and execute phases is carried by the report.
  pub fn run_single_pipeline(&self, user_document: &Value) -> ConveyorResult<RunReport> {
    Ok(self.prepare(user_document)?.execute())
  }

  /// Runs the user document found in `directory` under its conventional name.
  pub fn run_in_directory(&self, directory: impl AsRef<Path>) -> ConveyorResult<RunReport> {
    let user_document = load_document(directory.as_ref().join(INPUT_FILENAME))?;
    self.run_single_pipeline(&user_document)
  }
}

/// An assembled run that has not started.
#[derive(Debug)]
pub struct PreparedRun {
  pub pipeline: AssembledPipeline,
  pub state: RunState,
  pub summary: PipelineSummary,
  engine: ExecutionEngine,
}

impl PreparedRun {
  pub fn execute(mut self) -> RunReport {
    let outcome = self.engine.run(&mut self.pipeline, &mut self.state);
    RunReport {
      statuses: self
        .pipeline
        .invocations
        .iter()
        .map(|invocation| (invocation.id.clone(), invocation.status))
        .collect(),
      pipeline: self.pipeline.name,
      outcome,
      summary: self.summary,
      state: self.state,
    }
  }
}

/// Everything a host needs after a run: the outcome, the summary to print, and
/// the run state with its accumulated output.
#[derive(Debug)]
pub struct RunReport {
  pub pipeline: String,
  pub outcome: RunOutcome,
  pub summary: PipelineSummary,
  pub state: RunState,
  /// Final status of every invocation, in execution order.
  pub statuses: Vec<(InvocationId, InvocationStatus)>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.outcome.is_success()
  }

  pub fn into_result(self) -> ConveyorResult<RunState> {
    let state = self.state;
    self.outcome.into_result().map(|()| state)
  }
}
