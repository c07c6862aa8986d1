// conveyor/src/core/control.rs

//! Defines the lifecycle phases, per-invocation status, and the terminal outcome of a run.

use crate::core::step::InvocationId;
use crate::error::{ConveyorError, ConveyorResult};
use serde::Serialize;
use std::fmt;

/// The two linear phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
  /// Every invocation validates its resolved configuration.
  Check,
  /// Every invocation runs, in the same order.
  Execute,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::Check => f.write_str("check"),
      Phase::Execute => f.write_str("execute"),
    }
  }
}

/// What has happened to one invocation so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvocationStatus {
  Pending,
  Checked,
  CheckFailed,
  Executed,
  ExecutionFailed,
}

/// Outcome of a full run.
#[derive(Debug)]
pub enum RunOutcome {
  /// Every invocation passed the check phase and executed.
  Success,
  /// An invocation rejected its configuration; nothing executed.
  CheckFailed {
    invocation: InvocationId,
    cause: anyhow::Error,
  },
  /// An invocation failed while running; later invocations did not run.
  ExecutionFailed {
    invocation: InvocationId,
    cause: anyhow::Error,
  },
}

impl RunOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, RunOutcome::Success)
  }

  /// The phase that terminated the run, if it did not succeed.
  pub fn failed_phase(&self) -> Option<Phase> {
    match self {
      RunOutcome::Success => None,
      RunOutcome::CheckFailed { .. } => Some(Phase::Check),
      RunOutcome::ExecutionFailed { .. } => Some(Phase::Execute),
    }
  }

  pub fn failed_invocation(&self) -> Option<&InvocationId> {
    match self {
      RunOutcome::Success => None,
      RunOutcome::CheckFailed { invocation, .. } | RunOutcome::ExecutionFailed { invocation, .. } => Some(invocation),
    }
  }

  pub fn cause(&self) -> Option<&anyhow::Error> {
    match self {
      RunOutcome::Success => None,
      RunOutcome::CheckFailed { cause, .. } | RunOutcome::ExecutionFailed { cause, .. } => Some(cause),
    }
  }

  /// Raises a failed outcome as the matching `ConveyorError`.
  pub fn into_result(self) -> ConveyorResult<()> {
    match self {
      RunOutcome::Success => Ok(()),
      RunOutcome::CheckFailed { invocation, cause } => Err(ConveyorError::CheckFailed {
        invocation,
        source: cause,
      }),
      RunOutcome::ExecutionFailed { invocation, cause } => Err(ConveyorError::ExecutionFailed {
        invocation,
        source: cause,
      }),
    }
  }
}
