//! Actions module: vocabulary, grounding and execution of planner decisions.

mod grounding;
mod handler;
mod vocabulary;

pub use grounding::{deepest_interactive_at, resolve_index, resolve_point, Activation};
pub use handler::{ActionExecutor, ActionHandler, ActionResult, InputBackend};
pub use vocabulary::{ActionError, DeviceAction, SwipeDirection, SwipeSpec, ACTION_VOCABULARY};
