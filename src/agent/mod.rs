//! Agent module: the perceive, plan, act loop and its task state.

mod automation;
mod history;
pub mod precondition;

pub use automation::{
    AutomationLoop, CompletionSignal, LoopConfig, TaskOutcome, TaskRun, TaskStatus,
};
pub use history::{TaskHistory, TaskStep, CONTEXT_WINDOW, HISTORY_CAPACITY};
pub use precondition::Precondition;
