//! Sequence execution: steps, run state and the runner

pub mod context;
pub mod runner;
pub mod step;

pub use context::RunContext;
pub use runner::{AbortHandle, SequenceOutcome, SequenceResult, SequenceRunner, StepReport};
pub use step::{StepKind, StepStatus, TestStep, TestStepResult};
