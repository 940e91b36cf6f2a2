//! Fixed action vocabulary understood by the automation loop.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ActionDecision;

/// Action names accepted from the planner, in prompt order.
pub const ACTION_VOCABULARY: &[&str] = &[
    "tap",
    "tap_coordinate",
    "swipe",
    "type_text",
    "back",
    "key_press",
    "start_app",
    "screenshot",
    "list_apps",
    "remember",
    "recall",
    "complete",
];

/// Errors turning a decision into a device action.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Swipe direction relative to the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

/// Either a named direction or explicit start/end points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeSpec {
    Direction(SwipeDirection),
    Points { x1: i32, y1: i32, x2: i32, y2: i32 },
}

/// A validated action from the fixed vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    TapIndex { index: usize },
    TapCoordinate { x: i32, y: i32 },
    Swipe(SwipeSpec),
    TypeText { text: String, index: Option<usize> },
    Back,
    KeyPress { key: String },
    StartApp { app_name: String },
    Screenshot,
    ListApps,
    Remember { key: String, value: String },
    Recall { key: String },
    Complete,
}

impl DeviceAction {
    /// Parse the planner's decision into a typed action.
    pub fn from_decision(decision: &ActionDecision) -> Result<Self, ActionError> {
        let p = &decision.parameters;
        let action = match decision.action.to_lowercase().as_str() {
            "tap" | "tap_index" => DeviceAction::TapIndex {
                index: index_param(p, "index")?.ok_or(ActionError::MissingParameter("index"))?,
            },
            "tap_coordinate" => DeviceAction::TapCoordinate {
                x: required_i32(p, "x")?,
                y: required_i32(p, "y")?,
            },
            "swipe" => DeviceAction::Swipe(swipe_spec(p)?),
            "type_text" => DeviceAction::TypeText {
                text: required_str(p, "text")?,
                index: index_param(p, "index")?,
            },
            "back" => DeviceAction::Back,
            "key_press" => DeviceAction::KeyPress {
                key: required_str(p, "key")?,
            },
            "start_app" => DeviceAction::StartApp {
                app_name: required_str(p, "app_name")
                    .or_else(|_| required_str(p, "app"))
                    .map_err(|_| ActionError::MissingParameter("app_name"))?,
            },
            "screenshot" => DeviceAction::Screenshot,
            "list_apps" => DeviceAction::ListApps,
            "remember" => DeviceAction::Remember {
                key: required_str(p, "key")?,
                value: required_str(p, "value")?,
            },
            "recall" => DeviceAction::Recall {
                key: required_str(p, "key")?,
            },
            "complete" => DeviceAction::Complete,
            _ => return Err(ActionError::UnknownAction(decision.action.clone())),
        };
        Ok(action)
    }

    /// Vocabulary name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceAction::TapIndex { .. } => "tap",
            DeviceAction::TapCoordinate { .. } => "tap_coordinate",
            DeviceAction::Swipe(_) => "swipe",
            DeviceAction::TypeText { .. } => "type_text",
            DeviceAction::Back => "back",
            DeviceAction::KeyPress { .. } => "key_press",
            DeviceAction::StartApp { .. } => "start_app",
            DeviceAction::Screenshot => "screenshot",
            DeviceAction::ListApps => "list_apps",
            DeviceAction::Remember { .. } => "remember",
            DeviceAction::Recall { .. } => "recall",
            DeviceAction::Complete => "complete",
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn required_i32(p: &Map<String, Value>, name: &'static str) -> Result<i32, ActionError> {
    let value = p.get(name).ok_or(ActionError::MissingParameter(name))?;
    as_i64(value)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| ActionError::InvalidParameter {
            name,
            reason: format!("expected integer, got {}", value),
        })
}

fn index_param(p: &Map<String, Value>, name: &'static str) -> Result<Option<usize>, ActionError> {
    match p.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_i64(value)
            .and_then(|v| usize::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| ActionError::InvalidParameter {
                name,
                reason: format!("expected non-negative index, got {}", value),
            }),
    }
}

fn required_str(p: &Map<String, Value>, name: &'static str) -> Result<String, ActionError> {
    match p.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) if !other.is_null() => Err(ActionError::InvalidParameter {
            name,
            reason: format!("expected string, got {}", other),
        }),
        _ => Err(ActionError::MissingParameter(name)),
    }
}

fn swipe_spec(p: &Map<String, Value>) -> Result<SwipeSpec, ActionError> {
    if let Some(direction) = p.get("direction") {
        let raw = direction.as_str().unwrap_or_default();
        return SwipeDirection::parse(raw)
            .map(SwipeSpec::Direction)
            .ok_or_else(|| ActionError::InvalidParameter {
                name: "direction",
                reason: format!("unknown direction {}", direction),
            });
    }
    Ok(SwipeSpec::Points {
        x1: required_i32(p, "x1")?,
        y1: required_i32(p, "y1")?,
        x2: required_i32(p, "x2")?,
        y2: required_i32(p, "y2")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_vocabulary_name_parses() {
        for name in ACTION_VOCABULARY {
            let decision = ActionDecision::new(*name)
                .with_param("index", 0)
                .with_param("x", 1)
                .with_param("y", 2)
                .with_param("direction", "up")
                .with_param("text", "hello")
                .with_param("key", "home")
                .with_param("value", "v")
                .with_param("app_name", "calendar");
            let action = DeviceAction::from_decision(&decision).unwrap();
            assert_eq!(action.name(), *name);
        }
    }

    #[test]
    fn test_unknown_action_is_error() {
        let err = DeviceAction::from_decision(&ActionDecision::new("dance")).unwrap_err();
        assert_eq!(err, ActionError::UnknownAction("dance".to_string()));
    }

    #[test]
    fn test_tap_requires_index() {
        let err = DeviceAction::from_decision(&ActionDecision::new("tap")).unwrap_err();
        assert_eq!(err, ActionError::MissingParameter("index"));
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let decision = ActionDecision::new("tap_coordinate")
            .with_param("x", "540")
            .with_param("y", 960.4);
        assert_eq!(
            DeviceAction::from_decision(&decision).unwrap(),
            DeviceAction::TapCoordinate { x: 540, y: 960 }
        );
    }

    #[test]
    fn test_negative_index_is_invalid() {
        let decision = ActionDecision::new("tap").with_param("index", -1);
        assert!(matches!(
            DeviceAction::from_decision(&decision),
            Err(ActionError::InvalidParameter { name: "index", .. })
        ));
    }

    #[test]
    fn test_swipe_points() {
        let decision = ActionDecision::new("swipe")
            .with_param("x1", 500)
            .with_param("y1", 1500)
            .with_param("x2", 500)
            .with_param("y2", 500);
        assert_eq!(
            DeviceAction::from_decision(&decision).unwrap(),
            DeviceAction::Swipe(SwipeSpec::Points {
                x1: 500,
                y1: 1500,
                x2: 500,
                y2: 500
            })
        );
    }

    #[test]
    fn test_start_app_accepts_app_alias() {
        let decision = ActionDecision::new("start_app").with_param("app", "Chrome");
        assert_eq!(
            DeviceAction::from_decision(&decision).unwrap(),
            DeviceAction::StartApp {
                app_name: "Chrome".to_string()
            }
        );
    }
}
