//! Configuration module: planner prompt and app package table.

mod apps;
mod prompts;

pub use apps::{find_app_in_goal, get_package, APP_PACKAGES};
pub use prompts::{planner_system_prompt, PLANNER_PROMPT};
