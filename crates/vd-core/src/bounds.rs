//! Transform composition and derived bounds.
//!
//! Four bounds per node, all lazily cached and dirtied by `mark_dirty`:
//! `local_bounds` (tight box of own geometry in local space),
//! `bounds_in_parent` (AABB of the four transformed corners of
//! `local_bounds` — not a translated copy unless rotation is zero),
//! `global_bounds` (composed to root), and `global_draw_bounds`
//! (global bounds dilated by outer stroke, blur, and shadow).
//!
//! Read accessors never fail; empty containers and degenerate shapes
//! yield zero-area rects.

use crate::error::GeometryError;
use crate::model::{GraphicStyle, NodeIx, NodeKind, RigidTransform};
use crate::tree::NodeTree;
use kurbo::{Affine, Point, Rect, Shape, Vec2};

impl NodeTree {
    // ─── Transform composition ───────────────────────────────────────────

    /// Composite transform from `ix`'s local space to the root's space —
    /// the chained product of each local transform walking up.
    pub fn transform_to_root(&self, ix: NodeIx) -> Affine {
        let mut affine = self.node(ix).transform.to_affine();
        let mut current = self.node(ix).parent;
        while let Some(p) = current {
            affine = self.node(p).transform.to_affine() * affine;
            current = self.node(p).parent;
        }
        affine
    }

    // ─── Bounds accessors ────────────────────────────────────────────────

    /// Tight axis-aligned box of the node's own geometry in local space.
    pub fn local_bounds(&self, ix: NodeIx) -> Rect {
        if let Some(r) = self.node(ix).cache.local.get() {
            return r;
        }
        let r = self.compute_local_bounds(ix);
        self.node(ix).cache.local.set(Some(r));
        r
    }

    /// AABB of the four transformed corners of `local_bounds`, re-aligned
    /// to the parent's axes.
    pub fn bounds_in_parent(&self, ix: NodeIx) -> Rect {
        if let Some(r) = self.node(ix).cache.in_parent.get() {
            return r;
        }
        let r = self
            .node(ix)
            .transform
            .to_affine()
            .transform_rect_bbox(self.local_bounds(ix));
        self.node(ix).cache.in_parent.set(Some(r));
        r
    }

    /// Bounds composed all the way to the root.
    pub fn global_bounds(&self, ix: NodeIx) -> Rect {
        if let Some(r) = self.node(ix).cache.global.get() {
            return r;
        }
        let r = self
            .transform_to_root(ix)
            .transform_rect_bbox(self.local_bounds(ix));
        self.node(ix).cache.global.set(Some(r));
        r
    }

    /// Global bounds dilated by everything the node paints outside its
    /// outline: outer stroke extent, blur radius, and the shadow's
    /// offset + blur.
    pub fn global_draw_bounds(&self, ix: NodeIx) -> Rect {
        if let Some(r) = self.node(ix).cache.draw.get() {
            return r;
        }
        let r = self.compute_draw_bounds(ix);
        self.node(ix).cache.draw.set(Some(r));
        r
    }

    fn compute_local_bounds(&self, ix: NodeIx) -> Rect {
        let node = self.node(ix);
        match &node.kind {
            NodeKind::Rectangle { width, height, .. } => Rect::new(0.0, 0.0, *width, *height),
            NodeKind::Ellipse { rx, ry } => Rect::new(0.0, 0.0, rx * 2.0, ry * 2.0),
            NodeKind::Line { x2, y2 } => {
                Rect::from_points(Point::new(0.0, 0.0), Point::new(*x2, *y2))
            }
            NodeKind::Path { data } => data.bounding_box(),
            NodeKind::Text { content, font_size } => {
                // Rough metric: real shaping is the text engine's job.
                let width = content.chars().count() as f64 * font_size * 0.6;
                Rect::new(0.0, 0.0, width, font_size * 1.2)
            }
            NodeKind::Artboard { width, height, .. } => Rect::new(0.0, 0.0, *width, *height),
            NodeKind::LinkedGraphic { width, height } => Rect::new(0.0, 0.0, *width, *height),
            NodeKind::RepeatGrid { grid } => Rect::new(0.0, 0.0, grid.width, grid.height),
            NodeKind::BooleanGroup { .. } => match self.composed_path(ix) {
                Some(p) if !p.elements().is_empty() => p.bounding_box(),
                _ => Rect::ZERO,
            },
            NodeKind::Root | NodeKind::Group { .. } | NodeKind::SymbolInstance { .. } => {
                self.union_children_in_parent(ix)
            }
        }
    }

    fn union_children_in_parent(&self, ix: NodeIx) -> Rect {
        let mut acc: Option<Rect> = None;
        for &c in self.children(ix) {
            let r = self.bounds_in_parent(c);
            acc = Some(match acc {
                Some(a) => a.union(r),
                None => r,
            });
        }
        acc.unwrap_or(Rect::ZERO)
    }

    fn compute_draw_bounds(&self, ix: NodeIx) -> Rect {
        let node = self.node(ix);
        match &node.kind {
            NodeKind::Group { mask } => {
                let children = self.children(ix);
                // The mask child contributes no paint of its own — only
                // its outline, which clips the rest.
                let mask_ix = mask
                    .and_then(|m| children.iter().copied().find(|&c| self.node(c).guid == m));
                let mut acc: Option<Rect> = None;
                for &c in children {
                    if Some(c) == mask_ix {
                        continue;
                    }
                    let r = self.global_draw_bounds(c);
                    acc = Some(match acc {
                        Some(a) => a.union(r),
                        None => r,
                    });
                }
                let mut out = acc.unwrap_or(Rect::ZERO);
                if let Some(m) = mask_ix {
                    out = intersect_or_zero(out, self.global_bounds(m));
                }
                out
            }
            NodeKind::Root | NodeKind::Artboard { .. } | NodeKind::SymbolInstance { .. } => {
                let mut acc = self.global_bounds(ix);
                for &c in self.children(ix) {
                    acc = acc.union(self.global_draw_bounds(c));
                }
                acc
            }
            NodeKind::RepeatGrid { .. } => {
                // Cells paint clipped to the grid's own mask bounds.
                self.global_bounds(ix)
            }
            _ => dilate(self.global_bounds(ix), &node.style),
        }
    }

    // ─── Transform mutators ──────────────────────────────────────────────

    /// Replace the node's rigid transform. Artboards are restricted to
    /// translation only — any rotation is discarded.
    pub fn set_transform(&mut self, ix: NodeIx, mut transform: RigidTransform) {
        if matches!(self.node(ix).kind, NodeKind::Artboard { .. }) {
            transform.rotation = 0.0;
        }
        self.node_mut(ix).transform = transform;
        self.mark_dirty(ix);
    }

    /// Translate by (dx, dy) in parent coordinates.
    pub fn move_in_parent(&mut self, ix: NodeIx, dx: f64, dy: f64) {
        let mut t = self.node(ix).transform;
        t.tx += dx;
        t.ty += dy;
        self.set_transform(ix, t);
    }

    /// Place the local origin at (x, y) in parent coordinates.
    pub fn place_in_parent(&mut self, ix: NodeIx, x: f64, y: f64) {
        let mut t = self.node(ix).transform;
        t.tx = x;
        t.ty = y;
        self.set_transform(ix, t);
    }

    /// Rotate by `angle` radians about a pivot given in local
    /// coordinates. Only rotation and translation change.
    pub fn rotate_around(&mut self, ix: NodeIx, angle: f64, pivot: Point) {
        let old = self.node(ix).transform.to_affine();
        let spin = Affine::translate(pivot.to_vec2())
            * Affine::rotate(angle)
            * Affine::translate(-pivot.to_vec2());
        self.set_transform(ix, RigidTransform::from_affine(old * spin));
    }

    /// Resize a node's intrinsic geometry.
    ///
    /// Primitive shapes set their width/height fields directly; negative
    /// dimensions are rejected. Container and aspect-locked variants do
    /// not support independent resizing and are a silent no-op — callers
    /// check the resulting bounds to detect it.
    pub fn resize(&mut self, ix: NodeIx, w: f64, h: f64) -> Result<(), GeometryError> {
        if w < 0.0 || h < 0.0 {
            return Err(GeometryError::NegativeSize {
                width: w,
                height: h,
            });
        }
        let changed = match &mut self.node_mut(ix).kind {
            NodeKind::Rectangle { width, height, .. } => {
                *width = w;
                *height = h;
                true
            }
            NodeKind::Ellipse { rx, ry } => {
                *rx = w / 2.0;
                *ry = h / 2.0;
                true
            }
            NodeKind::Line { x2, y2 } => {
                *x2 = w;
                *y2 = h;
                true
            }
            NodeKind::Artboard { width, height, .. } => {
                *width = w;
                *height = h;
                true
            }
            NodeKind::RepeatGrid { grid } => {
                grid.width = w;
                grid.height = h;
                true
            }
            // Text is metric-driven, LinkedGraphic is read-only, and the
            // remaining containers derive bounds from children.
            _ => false,
        };
        if changed {
            self.mark_dirty(ix);
        }
        Ok(())
    }
}

/// Inflate by stroke + blur, and union in the offset shadow silhouette.
fn dilate(r: Rect, style: &GraphicStyle) -> Rect {
    let stroke_ext = style
        .stroke
        .as_ref()
        .map(|s| s.position.outer_extent(s.width))
        .unwrap_or(0.0);
    let mut out = r.inflate(stroke_ext + style.blur, stroke_ext + style.blur);
    if let Some(sh) = style.shadow {
        let silhouette = r.inflate(sh.blur, sh.blur) + Vec2::new(sh.offset_x, sh.offset_y);
        out = out.union(silhouette);
    }
    out
}

fn intersect_or_zero(a: Rect, b: Rect) -> Rect {
    let r = Rect::new(
        a.x0.max(b.x0),
        a.y0.max(b.y0),
        a.x1.min(b.x1),
        a.y1.min(b.y1),
    );
    if r.x1 > r.x0 && r.y1 > r.y0 { r } else { Rect::ZERO }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::model::{Node, Shadow, Stroke, StrokePosition};
    use std::f64::consts::FRAC_PI_2;

    fn rect_node(w: f64, h: f64) -> Node {
        Node::new(NodeKind::Rectangle {
            width: w,
            height: h,
            corner_radius: 0.0,
        })
    }

    #[test]
    fn bounds_in_parent_translated() {
        let mut tree = NodeTree::new();
        let ix = tree.add_child(tree.root(), rect_node(10.0, 20.0), None).unwrap();
        tree.place_in_parent(ix, 5.0, 7.0);
        assert_eq!(tree.bounds_in_parent(ix), Rect::new(5.0, 7.0, 15.0, 27.0));
    }

    #[test]
    fn rotated_bounds_realign_to_parent_axes() {
        let mut tree = NodeTree::new();
        let ix = tree.add_child(tree.root(), rect_node(10.0, 10.0), None).unwrap();
        tree.rotate_around(ix, FRAC_PI_2, Point::new(0.0, 0.0));
        let b = tree.bounds_in_parent(ix);
        // 90° about the origin maps (10, 0) → (0, 10), (0, 10) → (-10, 0).
        assert!((b.x0 + 10.0).abs() < 1e-9, "x0 = {}", b.x0);
        assert!((b.x1 - 0.0).abs() < 1e-9);
        assert!((b.y0 - 0.0).abs() < 1e-9);
        assert!((b.y1 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn global_bounds_compose_through_chain() {
        let mut tree = NodeTree::new();
        let g = tree
            .add_child(tree.root(), Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        let r = tree.add_child(g, rect_node(10.0, 10.0), None).unwrap();
        tree.place_in_parent(g, 100.0, 0.0);
        tree.place_in_parent(r, 20.0, 30.0);
        assert_eq!(tree.global_bounds(r), Rect::new(120.0, 30.0, 130.0, 40.0));
    }

    #[test]
    fn rotation_mutator_stays_rigid() {
        let mut tree = NodeTree::new();
        let ix = tree.add_child(tree.root(), rect_node(10.0, 10.0), None).unwrap();
        tree.rotate_around(ix, 0.3, Point::new(5.0, 5.0));
        tree.rotate_around(ix, 0.4, Point::new(2.0, 1.0));
        let t = tree.node(ix).transform();
        assert!((t.rotation - 0.7).abs() < 1e-9);
        // Affine round-trip must not have introduced scale: neither AABB
        // side of the rotated square can exceed its diagonal.
        let b = tree.bounds_in_parent(ix);
        let limit = 10.0 * std::f64::consts::SQRT_2 + 1e-6;
        assert!(b.width() <= limit, "width = {}", b.width());
        assert!(b.height() <= limit, "height = {}", b.height());
    }

    #[test]
    fn artboard_rotation_discarded() {
        let mut tree = NodeTree::new();
        let board = tree
            .add_child(
                tree.root(),
                Node::new(NodeKind::Artboard {
                    width: 100.0,
                    height: 100.0,
                    viewport_height: None,
                }),
                None,
            )
            .unwrap();
        tree.rotate_around(board, 1.0, Point::new(0.0, 0.0));
        assert_eq!(tree.node(board).transform().rotation, 0.0);
    }

    #[test]
    fn caches_invalidate_up_the_ancestor_chain() {
        let mut tree = NodeTree::new();
        let g = tree
            .add_child(tree.root(), Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        let r = tree.add_child(g, rect_node(10.0, 10.0), None).unwrap();
        assert_eq!(tree.local_bounds(g), Rect::new(0.0, 0.0, 10.0, 10.0));

        tree.resize(r, 40.0, 40.0).unwrap();
        assert_eq!(tree.local_bounds(g), Rect::new(0.0, 0.0, 40.0, 40.0));
    }

    #[test]
    fn ancestor_move_invalidates_descendant_global() {
        let mut tree = NodeTree::new();
        let g = tree
            .add_child(tree.root(), Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        let r = tree.add_child(g, rect_node(10.0, 10.0), None).unwrap();
        assert_eq!(tree.global_bounds(r), Rect::new(0.0, 0.0, 10.0, 10.0));

        tree.move_in_parent(g, 50.0, 0.0);
        assert_eq!(tree.global_bounds(r), Rect::new(50.0, 0.0, 60.0, 10.0));
    }

    #[test]
    fn resize_rejects_negative() {
        let mut tree = NodeTree::new();
        let ix = tree.add_child(tree.root(), rect_node(10.0, 10.0), None).unwrap();
        let err = tree.resize(ix, -1.0, 5.0).unwrap_err();
        assert!(matches!(err, GeometryError::NegativeSize { .. }));
        // Rejected atomically.
        assert_eq!(tree.local_bounds(ix), Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn resize_noop_on_group() {
        let mut tree = NodeTree::new();
        let g = tree
            .add_child(tree.root(), Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        tree.add_child(g, rect_node(10.0, 10.0), None).unwrap();
        tree.resize(g, 500.0, 500.0).unwrap();
        // No error, no effect — callers compare bounds to detect it.
        assert_eq!(tree.local_bounds(g), Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn draw_bounds_dilation() {
        let mut tree = NodeTree::new();
        let mut n = rect_node(10.0, 10.0);
        n.style.stroke = Some(Stroke {
            width: 4.0,
            position: StrokePosition::Center,
            ..Default::default()
        });
        n.style.blur = 3.0;
        let ix = tree.add_child(tree.root(), n, None).unwrap();
        // 4/2 stroke + 3 blur = 5 on every side.
        assert_eq!(tree.global_draw_bounds(ix), Rect::new(-5.0, -5.0, 15.0, 15.0));
    }

    #[test]
    fn draw_bounds_include_shadow() {
        let mut tree = NodeTree::new();
        let mut n = rect_node(10.0, 10.0);
        n.style.shadow = Some(Shadow {
            offset_x: 6.0,
            offset_y: 0.0,
            blur: 2.0,
            color: crate::model::Color::BLACK,
        });
        let ix = tree.add_child(tree.root(), n, None).unwrap();
        let b = tree.global_draw_bounds(ix);
        // Silhouette reaches 10 + 6 + 2 on the right and ±2 vertically;
        // the base geometry keeps the left edge at 0.
        assert_eq!(b, Rect::new(0.0, -2.0, 18.0, 12.0));
    }

    #[test]
    fn masked_group_clips_draw_bounds() {
        let mut tree = NodeTree::new();
        let g = tree
            .add_child(tree.root(), Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        tree.add_child(g, rect_node(100.0, 100.0), None).unwrap();
        let mask = tree.add_child(g, rect_node(20.0, 20.0), None).unwrap();
        tree.set_mask(g, Some(mask)).unwrap();
        assert_eq!(tree.global_draw_bounds(g), Rect::new(0.0, 0.0, 20.0, 20.0));
    }
}
