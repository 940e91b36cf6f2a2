//! Resolving screen points and element indices to concrete targets.

use crate::device::{NodeId, UiTree};

/// How a tap should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Activate a resolved UI node directly.
    Node(NodeId),
    /// Raw coordinate gesture; no interactive node covers the point.
    Coordinate { x: i32, y: i32 },
}

/// Depth-first search for the deepest interactive node whose bounds
/// contain the point. Among nodes at the same depth the one visited last
/// wins, since later siblings are drawn on top.
pub fn deepest_interactive_at(tree: &UiTree, x: i32, y: i32) -> Option<NodeId> {
    let mut best: Option<(usize, NodeId)> = None;
    let mut stack: Vec<NodeId> = tree.roots().map(|n| n.id).collect();
    stack.reverse();

    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else { continue };

        if node.element.is_interactive() && node.element.bounds.contains(x, y) {
            match best {
                Some((depth, _)) if depth > node.depth => {}
                _ => best = Some((node.depth, id)),
            }
        }

        // Children can overflow their parent, so descend regardless of bounds.
        stack.extend(node.children.iter().rev().copied());
    }

    best.map(|(_, id)| id)
}

/// Ground a coordinate tap: node activation when an interactive node
/// covers the point, a raw gesture otherwise.
pub fn resolve_point(tree: &UiTree, x: i32, y: i32) -> Activation {
    match deepest_interactive_at(tree, x, y) {
        Some(id) => Activation::Node(id),
        None => Activation::Coordinate { x, y },
    }
}

/// Ground an element index: the element itself when interactive, else its
/// nearest interactive ancestor, else whatever is under its centre.
///
/// Returns `None` for an index outside the tree.
pub fn resolve_index(tree: &UiTree, index: usize) -> Option<Activation> {
    let node = tree.get(NodeId(index))?;
    if node.element.is_interactive() {
        return Some(Activation::Node(node.id));
    }

    let mut parent = node.parent;
    while let Some(pid) = parent {
        let Some(p) = tree.get(pid) else { break };
        if p.element.is_interactive() && !p.element.bounds.is_empty() {
            return Some(Activation::Node(pid));
        }
        parent = p.parent;
    }

    let (cx, cy) = node.element.bounds.center();
    Some(resolve_point(tree, cx, cy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Bounds, UiElement};

    fn node(text: &str, bounds: Bounds, clickable: bool, editable: bool) -> UiElement {
        UiElement {
            kind: "android.view.View".to_string(),
            text: text.to_string(),
            clickable,
            editable,
            scrollable: false,
            bounds,
        }
    }

    fn sample_tree() -> UiTree {
        let mut tree = UiTree::new();
        let root = tree.push(None, node("", Bounds::new(0, 0, 1080, 2400), false, false));
        let list = tree.push(Some(root), node("", Bounds::new(0, 200, 1080, 1800), true, false));
        let row = tree.push(Some(list), node("Row", Bounds::new(0, 200, 1080, 200), true, false));
        tree.push(Some(row), node("Wi-Fi", Bounds::new(40, 240, 300, 80), false, false));
        tree
    }

    #[test]
    fn test_deepest_interactive_wins() {
        let tree = sample_tree();
        assert_eq!(deepest_interactive_at(&tree, 100, 250), Some(NodeId(2)));
        assert_eq!(deepest_interactive_at(&tree, 100, 1000), Some(NodeId(1)));
    }

    #[test]
    fn test_point_outside_interactive_nodes_falls_back_to_gesture() {
        let tree = sample_tree();
        assert_eq!(
            resolve_point(&tree, 100, 100),
            Activation::Coordinate { x: 100, y: 100 }
        );
    }

    #[test]
    fn test_overlapping_editable_fields_use_node_activation() {
        let mut tree = UiTree::new();
        let root = tree.push(None, node("", Bounds::new(0, 0, 1080, 2400), false, false));
        tree.push(Some(root), node("Email", Bounds::new(0, 400, 1080, 160), false, true));
        let overlay = tree.push(Some(root), node("Password", Bounds::new(0, 500, 1080, 160), false, true));

        assert_eq!(resolve_point(&tree, 540, 520), Activation::Node(overlay));
    }

    #[test]
    fn test_resolve_index_climbs_to_interactive_ancestor() {
        let tree = sample_tree();
        assert_eq!(resolve_index(&tree, 3), Some(Activation::Node(NodeId(2))));
        assert_eq!(resolve_index(&tree, 2), Some(Activation::Node(NodeId(2))));
        assert_eq!(resolve_index(&tree, 99), None);
    }

    #[test]
    fn test_resolve_index_without_interactive_ancestor_uses_centre() {
        let tree = UiTree::from_elements(vec![node("Label", Bounds::new(0, 0, 200, 100), false, false)]);
        assert_eq!(
            resolve_index(&tree, 0),
            Some(Activation::Coordinate { x: 100, y: 50 })
        );
    }
}
