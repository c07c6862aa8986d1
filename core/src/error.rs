// conveyor/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

use crate::core::step::InvocationId;

/// Every failure the engine can report, grouped by when it can happen.
///
/// `RegistryLoad`, `ConfigMerge`, `UserConfig`, `NotPrimaryPipeline`,
/// `UnknownPipeline` and `Assembly` are static: they abort before any step is
/// checked. `CheckFailed` aborts before the execute phase begins.
/// `ExecutionFailed`, `ElementValidation` and `ElementAccess` abort the
/// remainder of the execute phase.
#[derive(Debug, Error)]
pub enum ConveyorError {
  #[error("Registry error in document '{document}': {message}")]
  RegistryLoad { document: String, message: String },

  #[error("Configuration error for step '{step_name}', parameter '{parameter}': {message}")]
  ConfigMerge {
    step_name: String,
    parameter: String,
    message: String,
  },

  #[error("User configuration error: {message}")]
  UserConfig { message: String },

  #[error("Requested pipeline '{requested}' is not the primary pipeline '{expected}'")]
  NotPrimaryPipeline { requested: String, expected: String },

  #[error("Pipeline '{pipeline}' is not defined in the registry")]
  UnknownPipeline { pipeline: String },

  #[error("Assembly error in pipeline '{pipeline}' at step '{step_name}' (execution {ordinal}): {message}")]
  Assembly {
    pipeline: String,
    step_name: String,
    ordinal: u32,
    message: String,
  },

  #[error("Check phase failed at {invocation}. Source: {source}")]
  CheckFailed {
    invocation: InvocationId,
    #[source]
    source: AnyhowError,
  },

  #[error("Execute phase failed at {invocation}. Source: {source}")]
  ExecutionFailed {
    invocation: InvocationId,
    #[source]
    source: AnyhowError,
  },

  #[error("Element '{element}' published by {invocation} was rejected by container '{container}'. Source: {source}")]
  ElementValidation {
    invocation: InvocationId,
    element: String,
    container: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Element '{element}' cannot be accessed by {invocation}: {message}")]
  ElementAccess {
    invocation: InvocationId,
    element: String,
    message: String,
  },

  #[error("Type mismatch for '{name}' at {invocation} (expected {expected_type})")]
  TypeMismatch {
    invocation: InvocationId,
    name: String,
    expected_type: String,
  },

  #[error("Unable to load document '{path}'. Source: {source}")]
  Document {
    path: String,
    #[source]
    source: AnyhowError,
  },
}

impl ConveyorError {
  /// True for the errors raised before any step has been checked.
  pub fn is_static(&self) -> bool {
    matches!(
      self,
      ConveyorError::RegistryLoad { .. }
        | ConveyorError::ConfigMerge { .. }
        | ConveyorError::UserConfig { .. }
        | ConveyorError::NotPrimaryPipeline { .. }
        | ConveyorError::UnknownPipeline { .. }
        | ConveyorError::Assembly { .. }
        | ConveyorError::Document { .. }
    )
  }

  pub(crate) fn registry(document: &str, message: impl Into<String>) -> Self {
    ConveyorError::RegistryLoad {
      document: document.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn merge(step_name: &str, parameter: &str, message: impl Into<String>) -> Self {
    ConveyorError::ConfigMerge {
      step_name: step_name.to_string(),
      parameter: parameter.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn user(message: impl Into<String>) -> Self {
    ConveyorError::UserConfig { message: message.into() }
  }
}

pub type ConveyorResult<T, E = ConveyorError> = std::result::Result<T, E>;
