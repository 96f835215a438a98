//! Hit testing: point → node lookup.
//!
//! Reverse-walks the document tree (front-to-back) to find which node
//! is at a given (x, y) canvas position. Bounds come from the tree's
//! own cache, so repeated queries between edits stay cheap.

use kurbo::{Point, Rect};
use vd_core::model::{NodeIx, NodeKind};
use vd_core::tree::NodeTree;
use vd_core::Guid;

/// Find the topmost visible, unlocked node at `point` (canvas space).
/// Returns `None` if nothing is hit (background).
pub fn hit_test(tree: &NodeTree, point: Point) -> Option<Guid> {
    hit_test_node(tree, tree.root(), point)
}

fn hit_test_node(tree: &NodeTree, ix: NodeIx, point: Point) -> Option<Guid> {
    let node = tree.node(ix);
    if !node.visible || node.locked {
        return None;
    }

    // Children in reverse order: last painted is topmost.
    for &child in tree.children(ix).iter().rev() {
        if let Some(hit) = hit_test_node(tree, child, point) {
            return Some(hit);
        }
    }

    if matches!(node.kind, NodeKind::Root) {
        return None;
    }
    if tree.global_bounds(ix).contains(point) {
        return Some(node.guid);
    }
    None
}

/// Find all visible, unlocked, non-root nodes whose bounds intersect
/// the given rectangle. Used for marquee (box) selection. Touching
/// edges do not count as an intersection.
pub fn hit_test_rect(tree: &NodeTree, rect: Rect) -> Vec<Guid> {
    let mut result = Vec::new();
    collect_intersecting(tree, tree.root(), rect, &mut result);
    result
}

fn collect_intersecting(tree: &NodeTree, ix: NodeIx, rect: Rect, out: &mut Vec<Guid>) {
    let node = tree.node(ix);
    if !node.visible || node.locked {
        return;
    }

    if !matches!(node.kind, NodeKind::Root) && overlaps(tree.global_bounds(ix), rect) {
        out.push(node.guid);
    }

    for &child in tree.children(ix) {
        collect_intersecting(tree, child, rect, out);
    }
}

fn overlaps(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}
