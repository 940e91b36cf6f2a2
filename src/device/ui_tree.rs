//! Immutable UI tree snapshot.
//!
//! A capture produces one `UiTree`: a flat arena of nodes in pre-order,
//! addressed by `NodeId`. The whole tree is dropped as one unit when the
//! snapshot goes out of scope; nothing holds references into the device.

use serde::{Deserialize, Serialize};

/// Index of a node inside its `UiTree`. Also the element index the planner
/// sees in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Screen rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Build from corner coordinates `[left, top][right, bottom]`.
    pub fn from_corners(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            w: (right - left).max(0),
            h: (bottom - top).max(0),
        }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && py >= self.y && px < self.x + self.w && py < self.y + self.h
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// One on-screen element as reported to the planner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UiElement {
    /// Widget class, e.g. `android.widget.Button`.
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub clickable: bool,
    pub scrollable: bool,
    pub editable: bool,
    pub bounds: Bounds,
}

impl UiElement {
    /// Whether the element accepts direct activation.
    pub fn is_interactive(&self) -> bool {
        self.clickable || self.editable || self.scrollable
    }
}

/// A node in the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct UiNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: usize,
    pub element: UiElement,
}

/// Arena-backed UI tree. Nodes are stored in pre-order, so `NodeId(0)` is
/// the root when the tree is non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiTree {
    nodes: Vec<UiNode>,
}

impl UiTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a flat tree where every element is a root.
    pub fn from_elements(elements: Vec<UiElement>) -> Self {
        let mut tree = Self::new();
        for element in elements {
            tree.push(None, element);
        }
        tree
    }

    /// Append a node under `parent` and return its id.
    ///
    /// Nodes must be pushed in pre-order (a parent before its children,
    /// siblings in order) to keep ids equal to traversal order.
    pub fn push(&mut self, parent: Option<NodeId>, element: UiElement) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = match parent.and_then(|p| self.nodes.get(p.0)) {
            Some(p) => p.depth + 1,
            None => 0,
        };
        let parent = parent.filter(|p| p.0 < self.nodes.len());
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        self.nodes.push(UiNode {
            id,
            parent,
            children: Vec::new(),
            depth,
            element,
        });
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&UiNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> &[UiNode] {
        &self.nodes
    }

    /// Top-level nodes (those without a parent).
    pub fn roots(&self) -> impl Iterator<Item = &UiNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    /// Elements in index order.
    pub fn elements(&self) -> impl Iterator<Item = &UiElement> {
        self.nodes.iter().map(|n| &n.element)
    }

    /// Whether any element text contains `needle` (case-sensitive substring).
    pub fn any_text_contains(&self, needle: &str) -> bool {
        self.nodes.iter().any(|n| n.element.text.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(text: &str, bounds: Bounds) -> UiElement {
        UiElement {
            kind: "android.widget.TextView".to_string(),
            text: text.to_string(),
            bounds,
            ..Default::default()
        }
    }

    #[test]
    fn test_bounds_contains_is_half_open() {
        let b = Bounds::new(10, 10, 100, 50);
        assert!(b.contains(10, 10));
        assert!(b.contains(109, 59));
        assert!(!b.contains(110, 30));
        assert!(!b.contains(50, 60));
        assert_eq!(b.center(), (60, 35));
    }

    #[test]
    fn test_bounds_from_corners() {
        let b = Bounds::from_corners(0, 100, 1080, 300);
        assert_eq!(b, Bounds::new(0, 100, 1080, 200));
        assert!(Bounds::from_corners(50, 50, 10, 10).is_empty());
    }

    #[test]
    fn test_push_tracks_parent_and_depth() {
        let mut tree = UiTree::new();
        let root = tree.push(None, element("root", Bounds::new(0, 0, 1080, 2400)));
        let child = tree.push(Some(root), element("child", Bounds::new(0, 0, 100, 100)));
        let grandchild = tree.push(Some(child), element("leaf", Bounds::new(0, 0, 10, 10)));

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(root).map(|n| n.children.clone()), Some(vec![child]));
        assert_eq!(tree.get(grandchild).map(|n| n.depth), Some(2));
        assert_eq!(tree.get(grandchild).and_then(|n| n.parent), Some(child));
        assert_eq!(tree.roots().count(), 1);
    }

    #[test]
    fn test_any_text_contains() {
        let tree = UiTree::from_elements(vec![
            element("Settings", Bounds::default()),
            element("Wi-Fi network", Bounds::default()),
        ]);
        assert!(tree.any_text_contains("Wi-Fi"));
        assert!(!tree.any_text_contains("Bluetooth"));
    }
}
