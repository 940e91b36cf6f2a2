//! Bounded task history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Steps kept per task run.
pub const HISTORY_CAPACITY: usize = 20;

/// Steps shown to the planner per request.
pub const CONTEXT_WINDOW: usize = 5;

/// One executed (or refused) cycle of a task run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStep {
    pub action: String,
    pub parameters: Map<String, Value>,
    pub result: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "preCondition", skip_serializing_if = "Option::is_none")]
    pub pre_condition: Option<String>,
    /// Executor message or failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TaskStep {
    pub fn new(action: impl Into<String>, parameters: Map<String, Value>, result: bool) -> Self {
        Self {
            action: action.into(),
            parameters,
            result,
            timestamp: Utc::now(),
            pre_condition: None,
            output: None,
        }
    }

    pub fn with_pre_condition(mut self, pre_condition: Option<String>) -> Self {
        self.pre_condition = pre_condition;
        self
    }

    pub fn with_output(mut self, output: Option<String>) -> Self {
        self.output = output.filter(|o| !o.is_empty());
        self
    }
}

/// Append-only step log that evicts its oldest entry past capacity.
#[derive(Debug, Clone)]
pub struct TaskHistory {
    steps: VecDeque<TaskStep>,
    capacity: usize,
}

impl Default for TaskHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl TaskHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            steps: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, step: TaskStep) {
        if self.steps.len() == self.capacity {
            self.steps.pop_front();
        }
        self.steps.push_back(step);
    }

    /// The last `n` steps, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TaskStep> {
        let skip = self.steps.len().saturating_sub(n);
        self.steps.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskStep> {
        self.steps.iter()
    }

    pub fn last(&self) -> Option<&TaskStep> {
        self.steps.back()
    }

    pub fn into_vec(self) -> Vec<TaskStep> {
        self.steps.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: usize) -> TaskStep {
        TaskStep::new(format!("tap_{}", n), Map::new(), n % 2 == 0)
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = TaskHistory::default();
        for n in 0..25 {
            history.push(step(n));
            assert!(history.len() <= HISTORY_CAPACITY);
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        let actions: Vec<&str> = history.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions.first(), Some(&"tap_5"));
        assert_eq!(actions.last(), Some(&"tap_24"));
    }

    #[test]
    fn test_recent_returns_window_oldest_first() {
        let mut history = TaskHistory::default();
        for n in 0..8 {
            history.push(step(n));
        }
        let recent: Vec<String> = history
            .recent(CONTEXT_WINDOW)
            .into_iter()
            .map(|s| s.action)
            .collect();
        assert_eq!(recent, vec!["tap_3", "tap_4", "tap_5", "tap_6", "tap_7"]);

        let short = TaskHistory::default();
        assert!(short.recent(CONTEXT_WINDOW).is_empty());
    }

    #[test]
    fn test_step_serializes_camel_case_precondition() {
        let step = TaskStep::new("back", Map::new(), true)
            .with_pre_condition(Some("app_is:com.android.settings".to_string()))
            .with_output(Some(String::new()));
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["preCondition"], "app_is:com.android.settings");
        assert!(json.get("output").is_none());
        assert_eq!(json["result"], true);
    }
}
