// conveyor/src/pipeline/mod.rs

//! Turns a pipeline definition into invocations and runs them.

pub mod assembler;
pub mod broker;
pub mod execution;
pub mod summary;

pub use assembler::{AssembledPipeline, InputBinding, PipelineAssembler, StepInvocation};
pub use broker::{ElementBroker, PublishedElement};
pub use execution::ExecutionEngine;
pub use summary::{InvocationSummary, PipelineSummary};
