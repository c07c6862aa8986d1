// conveyor/src/core/step.rs

//! Defines the capability contract every step implementation satisfies, and the
//! identity of one concrete occurrence of a step within a run.

use super::context::{CheckContext, RunContext};
use serde::Serialize;
use std::fmt;

/// Identifies one step invocation: the canonical step name plus its 1-based
/// execution ordinal within the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InvocationId {
  pub step_name: String,
  pub ordinal: u32,
}

impl InvocationId {
  pub fn new(step_name: impl Into<String>, ordinal: u32) -> Self {
    Self {
      step_name: step_name.into(),
      ordinal,
    }
  }
}

impl fmt::Display for InvocationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "step '{}' (execution {})", self.step_name, self.ordinal)
  }
}

/// A unit of work the engine drives through the check and execute phases.
///
/// A fresh instance is created from the step's registered factory for every
/// invocation, and the same instance is used for both phases, so a step may keep
/// whatever it derived during `validate` for use in `run`.
///
/// Errors returned from either method terminate the run; the engine never retries.
pub trait Step: Send {
  /// Rejects a resolved configuration before any step of the pipeline runs.
  fn validate(&mut self, _ctx: &CheckContext<'_>) -> anyhow::Result<()> {
    Ok(())
  }

  /// Does the work. Declared inputs are fetched and declared outputs published
  /// through `ctx`; every declared output must be published before returning.
  fn run(&mut self, ctx: &mut RunContext<'_>) -> anyhow::Result<()>;
}
