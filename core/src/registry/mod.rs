// conveyor/src/registry/mod.rs

//! Registry documents, the definitions they declare, and the plugin catalog
//! their implementation identifiers resolve against.

pub mod definition;
pub mod index;
pub mod plugins;

pub use definition::{PipelineDefinition, ProviderSpec, StepDefinition, StepReference};
pub use index::{ContainerBinding, RegistryDocument, RegistryIndex};
pub use plugins::{ContainerFactory, Plugins, StepFactory};
