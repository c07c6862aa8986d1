// conveyor/src/core/mod.rs

pub mod context;
pub mod control;
pub mod element;
pub mod run_state;
pub mod step;

pub use context::{CheckContext, RunContext};
pub use control::{InvocationStatus, Phase, RunOutcome};
pub use element::{element, ElementContainer, ElementValue, TypedContainer};
pub use run_state::RunState;
pub use step::{InvocationId, Step};
