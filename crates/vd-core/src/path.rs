//! Outline synthesis and boolean path composition.
//!
//! Every node exposes `path_data` — its outline in local coordinates.
//! For a [`BooleanGroup`](crate::model::NodeKind::BooleanGroup) the
//! outline is the fold of its children's outlines in z-order under the
//! group's op; the result is cached on the node and invalidated whenever
//! any child's path, fill-affecting geometry, or transform changes
//! (mark_dirty clears the composed cache up the ancestor chain).

use crate::boolops::{self, PolySet};
use crate::model::{NodeIx, NodeKind};
use crate::tree::NodeTree;
use kurbo::{BezPath, Ellipse, Point, Rect, RoundedRect, Shape};

const SHAPE_TOLERANCE: f64 = 0.01;

impl NodeTree {
    /// The node's outline in its own local coordinate space.
    ///
    /// Never fails: degenerate geometry yields a degenerate (possibly
    /// empty) path.
    pub fn path_data(&self, ix: NodeIx) -> BezPath {
        let node = self.node(ix);
        match &node.kind {
            NodeKind::Rectangle {
                width,
                height,
                corner_radius,
            } => {
                let rect = Rect::new(0.0, 0.0, *width, *height);
                if *corner_radius > 0.0 {
                    RoundedRect::from_rect(rect, *corner_radius).to_path(SHAPE_TOLERANCE)
                } else {
                    rect.to_path(SHAPE_TOLERANCE)
                }
            }
            NodeKind::Ellipse { rx, ry } => {
                Ellipse::new(Point::new(*rx, *ry), (*rx, *ry), 0.0).to_path(SHAPE_TOLERANCE)
            }
            NodeKind::Line { x2, y2 } => {
                let mut p = BezPath::new();
                p.move_to(Point::new(0.0, 0.0));
                p.line_to(Point::new(*x2, *y2));
                p
            }
            NodeKind::Path { data } => data.clone(),
            NodeKind::BooleanGroup { .. } => self.composed_path(ix).unwrap_or_default(),
            // Text and the remaining containers expose their local box.
            _ => self.local_bounds(ix).to_path(SHAPE_TOLERANCE),
        }
    }

    /// Boolean-combined outline of a boolean group's children, in the
    /// group's local space. `None` for any other node kind.
    pub fn composed_path(&self, ix: NodeIx) -> Option<BezPath> {
        let node = self.node(ix);
        let op = match node.kind {
            NodeKind::BooleanGroup { op } => op,
            _ => return None,
        };
        if let Some(cached) = node.cache.composed.borrow().as_ref() {
            return Some(cached.clone());
        }

        let sets: Vec<PolySet> = self
            .children(ix)
            .iter()
            .map(|&c| {
                let outline = self.node(c).transform().to_affine() * self.path_data(c);
                boolops::flatten(&outline)
            })
            .collect();
        let rings = boolops::combine(&sets, op);
        let path = boolops::rings_to_path(&rings);

        *self.node(ix).cache.composed.borrow_mut() = Some(path.clone());
        Some(path)
    }

    /// Covered area of a boolean group's composed outline. Zero for
    /// degenerate results and for non-boolean nodes.
    pub fn composed_area(&self, ix: NodeIx) -> f64 {
        match self.node(ix).kind {
            NodeKind::BooleanGroup { op } => {
                let sets: Vec<PolySet> = self
                    .children(ix)
                    .iter()
                    .map(|&c| {
                        let outline = self.node(c).transform().to_affine() * self.path_data(c);
                        boolops::flatten(&outline)
                    })
                    .collect();
                boolops::rings_area(&boolops::combine(&sets, op))
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::model::{BoolOp, Node};

    fn rect_node(w: f64, h: f64) -> Node {
        Node::new(NodeKind::Rectangle {
            width: w,
            height: h,
            corner_radius: 0.0,
        })
    }

    fn bool_group(tree: &mut NodeTree, op: BoolOp) -> NodeIx {
        tree.add_child(tree.root(), Node::new(NodeKind::BooleanGroup { op }), None)
            .unwrap()
    }

    #[test]
    fn subtract_area_is_difference() {
        let mut tree = NodeTree::new();
        let bg = bool_group(&mut tree, BoolOp::Subtract);
        tree.add_child(bg, rect_node(10.0, 10.0), None).unwrap();
        let r2 = tree.add_child(bg, rect_node(10.0, 10.0), None).unwrap();
        tree.place_in_parent(r2, 5.0, 5.0);

        // area(R1) − area(R1 ∩ R2) = 100 − 25
        assert!((tree.composed_area(bg) - 75.0).abs() < 1e-6);
    }

    #[test]
    fn composed_cache_invalidated_by_child_move() {
        let mut tree = NodeTree::new();
        let bg = bool_group(&mut tree, BoolOp::Intersect);
        tree.add_child(bg, rect_node(10.0, 10.0), None).unwrap();
        let r2 = tree.add_child(bg, rect_node(10.0, 10.0), None).unwrap();

        // Fully overlapping: intersection is the whole square.
        let before = tree.composed_path(bg).unwrap();
        assert!((before.area().abs() - 100.0).abs() < 1e-6);

        tree.place_in_parent(r2, 5.0, 5.0);
        assert!((tree.composed_area(bg) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_result_is_not_an_error() {
        let mut tree = NodeTree::new();
        let bg = bool_group(&mut tree, BoolOp::Intersect);
        let a = tree.add_child(bg, rect_node(10.0, 10.0), None).unwrap();
        let _ = a;
        let b = tree.add_child(bg, rect_node(10.0, 10.0), None).unwrap();
        tree.place_in_parent(b, 100.0, 100.0);

        assert_eq!(tree.composed_area(bg), 0.0);
        let path = tree.composed_path(bg).unwrap();
        assert!(path.elements().is_empty());
    }

    #[test]
    fn empty_group_composes_to_empty() {
        let mut tree = NodeTree::new();
        let bg = bool_group(&mut tree, BoolOp::Add);
        assert!(tree.composed_path(bg).unwrap().elements().is_empty());
        assert_eq!(tree.composed_area(bg), 0.0);
    }

    #[test]
    fn line_path_is_degenerate_but_valid() {
        let mut tree = NodeTree::new();
        let line = tree
            .add_child(
                tree.root(),
                Node::new(NodeKind::Line { x2: 10.0, y2: 0.0 }),
                None,
            )
            .unwrap();
        let p = tree.path_data(line);
        assert_eq!(p.elements().len(), 2);
    }
}
