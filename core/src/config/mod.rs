// conveyor/src/config/mod.rs

//! Configuration layers: global parameters, per-execution values, the user
//! override document, and parameter merging.

pub mod document;
pub mod execution;
pub mod globals;
pub mod merge;
pub mod user;

pub use execution::{ExecutionLabel, ExecutionMap};
pub use globals::GlobalParameters;
pub use merge::{ExecutionSlot, ParameterDefaults, ParameterLayer, ParameterMerger, ParameterSpec, Parameters};
pub use user::UserOverrides;
