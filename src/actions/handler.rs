//! Action handler: executes device actions through an input backend.

use async_trait::async_trait;

use super::grounding::{resolve_index, resolve_point, Activation};
use super::vocabulary::{DeviceAction, SwipeDirection, SwipeSpec};
use crate::config::get_package;
use crate::device::{DeviceState, UiNode};

/// Result of an action execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    /// Optional output surfaced to the planner (e.g. the installed app list).
    pub message: Option<String>,
}

impl ActionResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Create a successful result carrying output.
    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    /// Create a failure result.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    fn from_bool(ok: bool, failure_message: impl Into<String>) -> Self {
        if ok {
            Self::success()
        } else {
            Self::failure(failure_message)
        }
    }
}

/// Performs one device action against the snapshot the planner saw.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &DeviceAction, state: &DeviceState) -> ActionResult;
}

/// Low-level input injection.
#[async_trait]
pub trait InputBackend: Send + Sync {
    /// Activate a resolved node (click, or focus for editable fields).
    async fn activate_node(&self, node: &UiNode) -> bool;
    /// Raw coordinate tap.
    async fn tap(&self, x: i32, y: i32) -> bool;
    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> bool;
    /// Type into the focused field.
    async fn type_text(&self, text: &str) -> bool;
    async fn back(&self) -> bool;
    async fn key_press(&self, key: &str) -> bool;
    async fn launch_package(&self, package: &str) -> bool;
    async fn list_packages(&self) -> Option<Vec<String>>;
}

/// Executes the fixed action vocabulary with grounding against the UI tree.
pub struct ActionHandler<B> {
    backend: B,
}

impl<B: InputBackend> ActionHandler<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn activate(&self, activation: Activation, state: &DeviceState) -> ActionResult {
        match activation {
            Activation::Node(id) => match state.tree.get(id) {
                Some(node) => {
                    tracing::debug!(node = id.0, text = %node.element.text, "Activating node");
                    ActionResult::from_bool(
                        self.backend.activate_node(node).await,
                        format!("Failed to activate element {}", id.0),
                    )
                }
                None => ActionResult::failure(format!("Element {} not in snapshot", id.0)),
            },
            Activation::Coordinate { x, y } => {
                tracing::debug!(x, y, "No interactive node at point, using gesture");
                ActionResult::from_bool(
                    self.backend.tap(x, y).await,
                    format!("Tap at ({}, {}) failed", x, y),
                )
            }
        }
    }

    fn validate_point(&self, x: i32, y: i32, state: &DeviceState) -> Result<(), ActionResult> {
        let (w, h) = (state.screen_width as i32, state.screen_height as i32);
        if w > 0 && h > 0 && (x < 0 || y < 0 || x >= w || y >= h) {
            return Err(ActionResult::failure(format!(
                "Coordinate ({}, {}) is outside the screen {}x{}",
                x, y, w, h
            )));
        }
        Ok(())
    }

    fn swipe_points(spec: SwipeSpec, state: &DeviceState) -> (i32, i32, i32, i32) {
        match spec {
            SwipeSpec::Points { x1, y1, x2, y2 } => (x1, y1, x2, y2),
            SwipeSpec::Direction(direction) => {
                let w = if state.screen_width > 0 { state.screen_width as i32 } else { 1080 };
                let h = if state.screen_height > 0 { state.screen_height as i32 } else { 2400 };
                let (cx, cy) = (w / 2, h / 2);
                // Stay within 20%-75% of the height to avoid fixed bars.
                match direction {
                    SwipeDirection::Up => (cx, h * 3 / 4, cx, h / 5),
                    SwipeDirection::Down => (cx, h / 5, cx, h * 3 / 4),
                    SwipeDirection::Left => (w * 4 / 5, cy, w / 5, cy),
                    SwipeDirection::Right => (w / 5, cy, w * 4 / 5, cy),
                }
            }
        }
    }

    async fn handle_start_app(&self, app_name: &str) -> ActionResult {
        let package = match get_package(app_name) {
            Some(p) => p.to_string(),
            None if app_name.contains('.') && !app_name.contains(' ') => app_name.to_string(),
            None => return ActionResult::failure(format!("App not found: {}", app_name)),
        };
        ActionResult::from_bool(
            self.backend.launch_package(&package).await,
            format!("Failed to launch {}", package),
        )
    }
}

#[async_trait]
impl<B: InputBackend> ActionExecutor for ActionHandler<B> {
    async fn execute(&self, action: &DeviceAction, state: &DeviceState) -> ActionResult {
        match action {
            DeviceAction::TapIndex { index } => match resolve_index(&state.tree, *index) {
                Some(activation) => self.activate(activation, state).await,
                None => ActionResult::failure(format!("No element with index {}", index)),
            },
            DeviceAction::TapCoordinate { x, y } => {
                if let Err(result) = self.validate_point(*x, *y, state) {
                    return result;
                }
                self.activate(resolve_point(&state.tree, *x, *y), state).await
            }
            DeviceAction::Swipe(spec) => {
                let (x1, y1, x2, y2) = Self::swipe_points(*spec, state);
                for (x, y) in [(x1, y1), (x2, y2)] {
                    if let Err(result) = self.validate_point(x, y, state) {
                        return result;
                    }
                }
                ActionResult::from_bool(self.backend.swipe(x1, y1, x2, y2).await, "Swipe failed")
            }
            DeviceAction::TypeText { text, index } => {
                if let Some(index) = index {
                    let focused = match resolve_index(&state.tree, *index) {
                        Some(activation) => self.activate(activation, state).await,
                        None => ActionResult::failure(format!("No element with index {}", index)),
                    };
                    if !focused.success {
                        return focused;
                    }
                }
                ActionResult::from_bool(self.backend.type_text(text).await, "Text input failed")
            }
            DeviceAction::Back => ActionResult::from_bool(self.backend.back().await, "Back failed"),
            DeviceAction::KeyPress { key } => ActionResult::from_bool(
                self.backend.key_press(key).await,
                format!("Key press {} failed", key),
            ),
            DeviceAction::StartApp { app_name } => self.handle_start_app(app_name).await,
            // The next cycle captures a fresh snapshot anyway.
            DeviceAction::Screenshot => ActionResult::success(),
            DeviceAction::ListApps => match self.backend.list_packages().await {
                Some(packages) => ActionResult::success_with(packages.join(", ")),
                None => ActionResult::failure("Could not list installed packages"),
            },
            DeviceAction::Remember { .. } | DeviceAction::Recall { .. } | DeviceAction::Complete => {
                ActionResult::failure(format!("{} is not a device action", action.name()))
            }
        }
    }
}
