// src/lib.rs

//! Conveyor: a registry-driven pipeline engine.
//!
//! Conveyor turns a declarative description of steps and pipelines into an
//! ordered sequence of fully parameterized step invocations and runs them:
//!  - Registry documents bind step names to implementations, default
//!    parameters and declared input/output state elements, and pipeline names
//!    to ordered step lists. Auxiliary registries contribute namespaced steps.
//!  - Parameters are merged from step defaults, pipeline overrides and user
//!    overrides, with `execution_<n>` / `execution_others` giving each
//!    occurrence of a repeated step its own value.
//!  - Element providers are resolved to concrete producing invocations before
//!    anything runs.
//!  - Every invocation is checked before any invocation executes; the first
//!    failure in either phase ends the run.
//!  - Published state elements are validated by the container bound to their
//!    name and are never overwritten.

pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

// --- Re-exports for the Public API ---

pub use crate::app::{Application, PreparedRun, RunReport};

pub use crate::core::context::{CheckContext, RunContext};
pub use crate::core::control::{InvocationStatus, Phase, RunOutcome};
pub use crate::core::element::{element, ElementContainer, ElementValue, TypedContainer};
pub use crate::core::run_state::RunState;
pub use crate::core::step::{InvocationId, Step};

pub use crate::config::{
  ExecutionLabel, ExecutionMap, ExecutionSlot, GlobalParameters, ParameterDefaults, ParameterLayer, ParameterMerger,
  ParameterSpec, Parameters, UserOverrides,
};

pub use crate::pipeline::{
  AssembledPipeline, ElementBroker, ExecutionEngine, InputBinding, PipelineAssembler, PipelineSummary, StepInvocation,
};

pub use crate::registry::{Plugins, RegistryDocument, RegistryIndex, StepDefinition};

pub use crate::error::{ConveyorError, ConveyorResult};

/*
    Host workflow:
    1. Implement `Step` for each unit of work and register a factory for it in a
       `Plugins` catalog under the identifier the registry's `class:` uses.
       Register element containers (e.g. with `register_validator`) the same way.
    2. Load the primary registry (and any auxiliary registries) as
       `RegistryDocument`s and build an `Application`.
    3. Call `run_single_pipeline` with the parsed user document, or
       `run_in_directory` to read `user_input.yaml`.
    4. Print `report.summary`, write `report.state.output()` to the
       `output_file` sink, and inspect `report.outcome`.
*/
