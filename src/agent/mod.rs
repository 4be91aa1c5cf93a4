//! Agent Core
//!
//! The ReAct reasoning loop and the LLM task planner.

pub mod planner;
pub mod react;

pub use planner::{Plan, PlannedTask, TaskOutcome, TaskPlanner, TaskStatus};
pub use react::{ReActAgent, RunResult, TraceStep};
