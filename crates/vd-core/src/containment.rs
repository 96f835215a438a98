//! Artboard containment resolution.
//!
//! After a batch of mutations, each top-level item is re-homed onto the
//! artboard it most overlaps. An item overlapping no artboard lands on
//! the pasteboard (the root). Reparenting preserves the item's global
//! position by rebasing its transform into the new parent's space.

use crate::model::{NodeIx, NodeKind};
use crate::tree::NodeTree;
use kurbo::Rect;
use log::trace;

/// Resolve containment for every node touched since the last resolve.
/// Drains and clears the tree's change set.
pub(crate) fn resolve(tree: &mut NodeTree) {
    let changed = tree.take_changed();
    if changed.is_empty() {
        return;
    }

    let mut items: Vec<NodeIx> = Vec::new();
    for n in changed {
        if let Some(item) = top_level_item(tree, n)
            && !items.contains(&item)
        {
            items.push(item);
        }
    }

    let artboards: Vec<NodeIx> = tree.artboards();
    for item in items {
        let Some(parent) = tree.node(item).parent else {
            continue;
        };
        let bounds = tree.global_bounds(item);
        let target = best_artboard(tree, &artboards, bounds).unwrap_or_else(|| tree.root());
        if target != parent {
            trace!("re-homing {} onto {}", tree.node(item).guid, tree.node(target).guid);
            reparent_preserving_position(tree, item, target);
        }
    }

    // Reparenting marks nodes dirty again; a settled batch must not
    // re-trigger on the next commit.
    tree.take_changed();
}

/// Walk up to the ancestor whose parent is the root or an artboard.
/// Artboards and the root itself are never containment subjects.
fn top_level_item(tree: &NodeTree, node: NodeIx) -> Option<NodeIx> {
    if !tree.contains(node) {
        return None;
    }
    let mut cur = node;
    loop {
        let n = tree.node(cur);
        if matches!(n.kind, NodeKind::Root | NodeKind::Artboard { .. }) {
            return None;
        }
        let parent = n.parent?;
        match tree.node(parent).kind {
            NodeKind::Root | NodeKind::Artboard { .. } => return Some(cur),
            _ => cur = parent,
        }
    }
}

/// The artboard whose bounds overlap `bounds` with the greatest area.
/// Ties break toward the lower z-index. Zero-area overlap is no
/// overlap.
fn best_artboard(tree: &NodeTree, artboards: &[NodeIx], bounds: Rect) -> Option<NodeIx> {
    let mut best: Option<(NodeIx, f64)> = None;
    for &ab in artboards {
        let area = overlap_area(tree.global_bounds(ab), bounds);
        if area > 0.0 && best.is_none_or(|(_, a)| area > a) {
            best = Some((ab, area));
        }
    }
    best.map(|(ab, _)| ab)
}

fn overlap_area(a: Rect, b: Rect) -> f64 {
    let w = a.x1.min(b.x1) - a.x0.max(b.x0);
    let h = a.y1.min(b.y1) - a.y0.max(b.y0);
    if w > 0.0 && h > 0.0 { w * h } else { 0.0 }
}

/// Move `item` under `target` without visually moving it: its new local
/// transform is the old root-space placement rebased into the target's
/// space.
fn reparent_preserving_position(tree: &mut NodeTree, item: NodeIx, target: NodeIx) {
    let to_root = tree.transform_to_root(item);
    let target_to_root = tree.transform_to_root(target);
    // The caller established `item` has a parent.
    let _ = tree.remove_from_parent(item);
    if tree.attach(target, item, None).is_err() {
        // Target vanished mid-batch; fall back to the pasteboard.
        let root = tree.root();
        let _ = tree.attach(root, item, None);
    }
    let rebased = target_to_root.inverse() * to_root;
    tree.node_mut(item).transform = crate::model::RigidTransform::from_affine(rebased);
    tree.mark_dirty(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::model::Node;

    fn doc_with_two_artboards(tree: &mut NodeTree) -> (NodeIx, NodeIx) {
        let a = tree
            .add_child(
                tree.root(),
                Node::with_name(
                    NodeKind::Artboard { width: 200.0, height: 200.0, viewport_height: None },
                    "A",
                ),
                None,
            )
            .unwrap();
        let b = tree
            .add_child(
                tree.root(),
                Node::with_name(
                    NodeKind::Artboard { width: 200.0, height: 200.0, viewport_height: None },
                    "B",
                ),
                None,
            )
            .unwrap();
        tree.place_in_parent(b, 300.0, 0.0);
        tree.take_changed();
        (a, b)
    }

    fn rect(tree: &mut NodeTree, parent: NodeIx, x: f64, y: f64) -> NodeIx {
        let n = tree
            .add_child(
                parent,
                Node::new(NodeKind::Rectangle { width: 50.0, height: 50.0, corner_radius: 0.0 }),
                None,
            )
            .unwrap();
        tree.place_in_parent(n, x, y);
        n
    }

    #[test]
    fn item_moves_to_most_overlapped_artboard() {
        let mut tree = NodeTree::new();
        let (a, b) = doc_with_two_artboards(&mut tree);
        let r = rect(&mut tree, a, 10.0, 10.0);
        // Drag mostly onto B: global x 290..340, B spans 300..500.
        tree.place_in_parent(r, 290.0, 10.0);
        resolve(&mut tree);
        assert_eq!(tree.node(r).parent, Some(b));
        // Global position preserved: local x rebased to -10.
        let t = tree.node(r).transform();
        assert_eq!((t.tx, t.ty), (-10.0, 10.0));
    }

    #[test]
    fn zero_overlap_ejects_to_pasteboard() {
        let mut tree = NodeTree::new();
        let (a, _b) = doc_with_two_artboards(&mut tree);
        let r = rect(&mut tree, a, 10.0, 10.0);
        tree.place_in_parent(r, 10.0, 600.0);
        resolve(&mut tree);
        assert_eq!(tree.node(r).parent, Some(tree.root()));
        let t = tree.node(r).transform();
        assert_eq!((t.tx, t.ty), (10.0, 600.0));
    }

    #[test]
    fn edge_touching_is_not_containment() {
        let mut tree = NodeTree::new();
        let (a, _b) = doc_with_two_artboards(&mut tree);
        let r = rect(&mut tree, a, 10.0, 10.0);
        // Exactly abutting A's right edge: shared edge, zero area.
        tree.place_in_parent(r, 200.0, 10.0);
        resolve(&mut tree);
        assert_eq!(tree.node(r).parent, Some(tree.root()));
    }

    #[test]
    fn tie_breaks_toward_lower_index_artboard() {
        let mut tree = NodeTree::new();
        let a = tree
            .add_child(
                tree.root(),
                Node::new(NodeKind::Artboard { width: 200.0, height: 200.0, viewport_height: None }),
                None,
            )
            .unwrap();
        // Second artboard exactly coincident with the first.
        let _b = tree
            .add_child(
                tree.root(),
                Node::new(NodeKind::Artboard { width: 200.0, height: 200.0, viewport_height: None }),
                None,
            )
            .unwrap();
        tree.take_changed();
        let root = tree.root();
        let r = rect(&mut tree, root, 10.0, 10.0);
        resolve(&mut tree);
        assert_eq!(tree.node(r).parent, Some(a));
    }

    #[test]
    fn nested_child_moves_its_top_level_group() {
        let mut tree = NodeTree::new();
        let (a, b) = doc_with_two_artboards(&mut tree);
        let g = tree
            .add_child(a, Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        let r = rect(&mut tree, g, 0.0, 0.0);
        tree.place_in_parent(g, 320.0, 10.0);
        resolve(&mut tree);
        // The group re-homed, not the leaf.
        assert_eq!(tree.node(g).parent, Some(b));
        assert_eq!(tree.node(r).parent, Some(g));
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut tree = NodeTree::new();
        let (a, _b) = doc_with_two_artboards(&mut tree);
        let r = rect(&mut tree, a, 10.0, 10.0);
        resolve(&mut tree);
        assert_eq!(tree.node(r).parent, Some(a));
        resolve(&mut tree);
        assert_eq!(tree.node(r).parent, Some(a));
    }
}
