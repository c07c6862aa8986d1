// conveyor/src/pipeline/execution.rs

//! Drives an assembled pipeline through the check phase and then the execute
//! phase. Both phases visit invocations strictly in assembly order, and the
//! first failure in either phase ends the run.

use crate::core::context::{CheckContext, RunContext};
use crate::core::control::{InvocationStatus, Phase, RunOutcome};
use crate::core::run_state::RunState;
use crate::core::step::Step;
use crate::error::ConveyorError;
use crate::pipeline::assembler::{AssembledPipeline, StepInvocation};
use crate::pipeline::broker::Rejection;
use anyhow::anyhow;
use tracing::{event, instrument, span, Level};

#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionEngine;

impl ExecutionEngine {
  pub fn new() -> Self {
    Self
  }

  /// Runs every invocation of `pipeline` against `state`.
  ///
  /// One step instance is created per invocation and kept across both phases.
  /// Invocation statuses are recorded on `pipeline` as the run progresses.
  #[instrument(
    name = "ExecutionEngine::run",
    skip_all,
    fields(pipeline = %pipeline.name, num_invocations = pipeline.invocations.len())
  )]
  pub fn run(&self, pipeline: &mut AssembledPipeline, state: &mut RunState) -> RunOutcome {
    let mut steps: Vec<Box<dyn Step>> = pipeline
      .invocations
      .iter()
      .map(|invocation| invocation.definition.instantiate())
      .collect();

    event!(Level::DEBUG, "Check phase starting.");
    if let Some(outcome) = self.check_phase(pipeline, state, &mut steps) {
      return outcome;
    }

    event!(Level::DEBUG, "Execute phase starting.");
    if let Some(outcome) = self.execute_phase(pipeline, state, &mut steps) {
      return outcome;
    }

    event!(Level::DEBUG, "Pipeline run completed successfully.");
    RunOutcome::Success
  }

  fn check_phase(
    &self,
    pipeline: &mut AssembledPipeline,
    state: &RunState,
    steps: &mut [Box<dyn Step>],
  ) -> Option<RunOutcome> {
    for (invocation, step) in pipeline.invocations.iter_mut().zip(steps.iter_mut()) {
      let step_span = span!(
        Level::INFO,
        "invocation",
        phase = %Phase::Check,
        step_name = %invocation.id.step_name,
        ordinal = invocation.id.ordinal
      );
      let _step_span_guard = step_span.enter();

      let result = step.validate(&CheckContext::new(invocation, state.globals()));
      match result {
        Ok(()) => {
          event!(Level::TRACE, "Invocation checked.");
          invocation.status = InvocationStatus::Checked;
        }
        Err(cause) => {
          event!(Level::ERROR, error = %cause, "Check failed; no invocation will execute.");
          invocation.status = InvocationStatus::CheckFailed;
          return Some(RunOutcome::CheckFailed {
            invocation: invocation.id.clone(),
            cause,
          });
        }
      }
    }
    None
  }

  fn execute_phase(
    &self,
    pipeline: &mut AssembledPipeline,
    state: &mut RunState,
    steps: &mut [Box<dyn Step>],
  ) -> Option<RunOutcome> {
    for (invocation, step) in pipeline.invocations.iter_mut().zip(steps.iter_mut()) {
      let step_span = span!(
        Level::INFO,
        "invocation",
        phase = %Phase::Execute,
        step_name = %invocation.id.step_name,
        ordinal = invocation.id.ordinal
      );
      let _step_span_guard = step_span.enter();

      let run_result = step.run(&mut RunContext::new(invocation, state));
      // A rejected publish fails the invocation even when the step discarded the error.
      let result = match (run_result, state.elements_mut().take_rejection()) {
        (Err(cause), _) => Err(cause),
        (Ok(()), Some(rejection)) => Err(rejected(rejection)),
        (Ok(()), None) => check_outputs(invocation, state),
      };

      match result {
        Ok(()) => {
          event!(Level::TRACE, "Invocation executed.");
          invocation.status = InvocationStatus::Executed;
        }
        Err(cause) => {
          event!(Level::ERROR, error = %cause, "Execution failed; remaining invocations will not run.");
          invocation.status = InvocationStatus::ExecutionFailed;
          return Some(RunOutcome::ExecutionFailed {
            invocation: invocation.id.clone(),
            cause,
          });
        }
      }
    }
    None
  }
}

// Rebuilds the error the step received from `publish`.
fn rejected(rejection: Rejection) -> anyhow::Error {
  anyhow::Error::new(ConveyorError::ElementValidation {
    invocation: rejection.invocation,
    element: rejection.element,
    container: rejection.container,
    source: anyhow!(rejection.message),
  })
}

// Every declared output must have been published once `run` returns.
fn check_outputs(invocation: &StepInvocation, state: &RunState) -> anyhow::Result<()> {
  let missing: Vec<&str> = invocation
    .definition
    .outputs
    .iter()
    .filter(|element| !state.elements().is_published(&invocation.id, element))
    .map(String::as_str)
    .collect();
  if missing.is_empty() {
    Ok(())
  } else {
    Err(anyhow!("declared output element(s) {:?} were not published", missing))
  }
}
