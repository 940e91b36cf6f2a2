//! Planner client module: request/decision types and the HTTP planner.

mod client;
mod types;

pub use client::{
    parse_decision, HttpPlanner, PlannerClient, PlannerConfig, PlannerError,
    DEFAULT_MAX_RETRIES, DEFAULT_PLANNER_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
};
pub use types::{ActionDecision, PlanRequest};
