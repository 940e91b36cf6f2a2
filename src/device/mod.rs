//! Device state captured once per automation cycle.

mod ui_tree;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use ui_tree::{Bounds, NodeId, UiElement, UiNode, UiTree};

/// Errors raised while capturing device state.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),
    #[error("UI hierarchy unavailable: {0}")]
    Hierarchy(String),
}

/// One perception snapshot: screenshot, UI tree and foreground app.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub screenshot_base64: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub tree: UiTree,
    pub foreground_package: String,
}

impl DeviceState {
    pub fn new(tree: UiTree, foreground_package: impl Into<String>) -> Self {
        Self {
            tree,
            foreground_package: foreground_package.into(),
            ..Default::default()
        }
    }

    /// Attach a screenshot and its dimensions.
    pub fn with_screenshot(mut self, base64_data: impl Into<String>, width: u32, height: u32) -> Self {
        self.screenshot_base64 = base64_data.into();
        self.screen_width = width;
        self.screen_height = height;
        self
    }

    /// Indexed element list as sent to the planner.
    pub fn indexed_elements(&self) -> Vec<IndexedElement<'_>> {
        self.tree
            .nodes()
            .iter()
            .map(|n| IndexedElement {
                index: n.id.0,
                element: &n.element,
            })
            .collect()
    }
}

/// Element paired with the index the planner uses to refer to it.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedElement<'a> {
    pub index: usize,
    #[serde(flatten)]
    pub element: &'a UiElement,
}

/// Source of device perception snapshots.
#[async_trait]
pub trait DeviceStateProvider: Send + Sync {
    async fn capture_state(&self) -> Result<DeviceState, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_elements_follow_tree_order() {
        let tree = UiTree::from_elements(vec![
            UiElement {
                text: "OK".to_string(),
                clickable: true,
                ..Default::default()
            },
            UiElement {
                text: "Cancel".to_string(),
                clickable: true,
                ..Default::default()
            },
        ]);
        let state = DeviceState::new(tree, "com.android.settings");
        let elements = state.indexed_elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].index, 1);
        assert_eq!(elements[1].element.text, "Cancel");

        let json = serde_json::to_value(&elements[0]).unwrap();
        assert_eq!(json["index"], 0);
        assert_eq!(json["text"], "OK");
        assert_eq!(json["clickable"], true);
    }
}
