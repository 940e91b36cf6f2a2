//! Planner request and decision types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::TaskStep;
use crate::device::DeviceState;

/// One action decision produced by the planner per cycle.
///
/// Parameters may be nested under `"parameters"` or given at the top level
/// next to `"action"`; both land in `parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDecision")]
pub struct ActionDecision {
    pub action: String,
    pub parameters: Map<String, Value>,
    #[serde(rename = "preCondition", skip_serializing_if = "Option::is_none")]
    pub pre_condition: Option<String>,
    #[serde(rename = "isComplete")]
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Set only on decisions synthesized after a planner failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default, alias = "params")]
    parameters: Map<String, Value>,
    #[serde(default, rename = "preCondition", alias = "pre_condition")]
    pre_condition: Option<String>,
    #[serde(default, rename = "isComplete", alias = "is_complete")]
    is_complete: bool,
    #[serde(default, alias = "thinking", alias = "thought")]
    reasoning: Option<String>,
    /// Models sometimes echo an `"error"` key; it never marks a failure.
    #[serde(default, rename = "error")]
    advisory: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawDecision> for ActionDecision {
    fn from(raw: RawDecision) -> Self {
        if let Some(note) = raw.advisory {
            tracing::debug!(%note, "Ignoring error field in planner reply");
        }
        let mut parameters = raw.parameters;
        for (key, value) in raw.extra {
            parameters.entry(key).or_insert(value);
        }
        Self {
            action: raw.action.trim().to_string(),
            parameters,
            pre_condition: raw.pre_condition.filter(|p| !p.trim().is_empty()),
            is_complete: raw.is_complete,
            reasoning: raw.reasoning,
            error: None,
        }
    }
}

impl ActionDecision {
    /// Create a decision with no parameters.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            parameters: Map::new(),
            pre_condition: None,
            is_complete: false,
            reasoning: None,
            error: None,
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set the precondition.
    pub fn with_pre_condition(mut self, pre_condition: impl Into<String>) -> Self {
        self.pre_condition = Some(pre_condition.into());
        self
    }

    /// Mark the decision as the final one.
    pub fn completed(mut self) -> Self {
        self.is_complete = true;
        self
    }

    /// The closed-fail decision used when the planner cannot answer.
    pub fn planner_failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new("complete").completed()
        }
    }

    /// Whether the planner considers the goal reached.
    pub fn completes_task(&self) -> bool {
        self.is_complete || self.action.eq_ignore_ascii_case("complete")
    }
}

/// Bounded request sent to the planner once per cycle.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub goal: String,
    pub state: DeviceState,
    /// Most recent steps, oldest first.
    pub history: Vec<TaskStep>,
    pub memory: BTreeMap<String, String>,
    pub actions: &'static [&'static str],
}

impl PlanRequest {
    /// JSON body describing the request, without the screenshot.
    pub fn to_context_json(&self) -> Value {
        serde_json::json!({
            "goal": self.goal,
            "foreground_package": self.state.foreground_package,
            "screen": {
                "width": self.state.screen_width,
                "height": self.state.screen_height,
            },
            "elements": self.state.indexed_elements(),
            "history": self.history,
            "memory": self.memory,
            "available_actions": self.actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_parameters() {
        let decision: ActionDecision = serde_json::from_value(json!({
            "action": "tap",
            "parameters": {"index": 3},
            "preCondition": "app_is:com.android.settings",
            "isComplete": false
        }))
        .unwrap();
        assert_eq!(decision.action, "tap");
        assert_eq!(decision.parameters["index"], 3);
        assert_eq!(
            decision.pre_condition.as_deref(),
            Some("app_is:com.android.settings")
        );
        assert!(!decision.completes_task());
    }

    #[test]
    fn test_parse_flat_parameters() {
        let decision: ActionDecision = serde_json::from_value(json!({
            "action": "start_app",
            "app_name": "calendar",
            "isComplete": false
        }))
        .unwrap();
        assert_eq!(decision.parameters["app_name"], "calendar");
        assert!(decision.error.is_none());
    }

    #[test]
    fn test_planner_error_field_is_not_a_failure() {
        for note in [json!(""), json!("screen may be stale")] {
            let decision: ActionDecision = serde_json::from_value(json!({
                "action": "back",
                "isComplete": false,
                "error": note
            }))
            .unwrap();
            assert!(decision.error.is_none());
            assert!(!decision.parameters.contains_key("error"));
            assert!(!decision.completes_task());
        }
    }

    #[test]
    fn test_blank_precondition_is_dropped() {
        let decision: ActionDecision = serde_json::from_value(json!({
            "action": "back",
            "pre_condition": "  "
        }))
        .unwrap();
        assert!(decision.pre_condition.is_none());
    }

    #[test]
    fn test_planner_failure_completes_with_error() {
        let decision = ActionDecision::planner_failure("timeout");
        assert_eq!(decision.action, "complete");
        assert!(decision.is_complete);
        assert_eq!(decision.error.as_deref(), Some("timeout"));
        assert!(decision.completes_task());
    }

    #[test]
    fn test_complete_action_completes_without_flag() {
        assert!(ActionDecision::new("complete").completes_task());
        assert!(!ActionDecision::new("back").completes_task());
    }
}
