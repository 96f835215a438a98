//! Core scenegraph data model.
//!
//! A document is a tree of visual nodes (artboards, shapes, groups, text,
//! repeat grids, symbol instances). Ownership flows strictly parent →
//! children through each node's ordered child list (index 0 = bottom of
//! z-order); the parent link is a lookup-only back-reference. Transforms
//! are rigid (rotation + translation, no skew or scale); artboards are
//! further restricted to translation only.

use crate::id::Guid;
use kurbo::{Affine, BezPath, Rect, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};

// ─── Colors & Paint ──────────────────────────────────────────────────────

/// RGBA color. Stored as 4 × f64 [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgba(
                byte(0)? as f64 / 255.0,
                byte(2)? as f64 / 255.0,
                byte(4)? as f64 / 255.0,
                1.0,
            )),
            8 => Some(Self::rgba(
                byte(0)? as f64 / 255.0,
                byte(2)? as f64 / 255.0,
                byte(4)? as f64 / 255.0,
                byte(6)? as f64 / 255.0,
            )),
            _ => None,
        }
    }

    /// Emit as `#RRGGBB`, or `#RRGGBBAA` when the alpha is not opaque.
    pub fn to_hex(&self) -> String {
        let r = (self.r * 255.0).round() as u8;
        let g = (self.g * 255.0).round() as u8;
        let b = (self.b * 255.0).round() as u8;
        let a = (self.a * 255.0).round() as u8;
        if a == 255 {
            format!("#{r:02X}{g:02X}{b:02X}")
        } else {
            format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

/// A gradient stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f64, // 0.0 .. 1.0
    pub color: Color,
}

/// Fill or stroke paint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Paint {
    Solid(Color),
    LinearGradient { angle: f64, stops: Vec<GradientStop> },
}

// ─── Stroke ──────────────────────────────────────────────────────────────

/// Where the stroke sits relative to the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrokePosition {
    Inside,
    #[default]
    Center,
    Outside,
}

impl StrokePosition {
    /// How far the stroke extends beyond the outline, for a given width.
    /// Feeds draw-bounds dilation.
    pub fn outer_extent(self, width: f64) -> f64 {
        match self {
            StrokePosition::Inside => 0.0,
            StrokePosition::Center => width / 2.0,
            StrokePosition::Outside => width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub paint: Paint,
    pub width: f64,
    pub position: StrokePosition,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            paint: Paint::Solid(Color::BLACK),
            width: 1.0,
            position: StrokePosition::Center,
        }
    }
}

// ─── Shadow / blur ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub offset_x: f64,
    pub offset_y: f64,
    pub blur: f64,
    pub color: Color,
}

/// Paint attributes shared by every paintable node kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphicStyle {
    pub fill: Option<Paint>,
    pub stroke: Option<Stroke>,
    pub shadow: Option<Shadow>,
    /// Gaussian blur radius, 0 = none.
    pub blur: f64,
}

// ─── Rigid transform ─────────────────────────────────────────────────────

/// Rotation + translation mapping from local space to parent space.
///
/// Stored decomposed so scale/skew are unrepresentable. Returned by value
/// from getters; state changes only go through tree setters, which also
/// invalidate bounds caches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Rotation in radians, counter-clockwise.
    pub rotation: f64,
    pub tx: f64,
    pub ty: f64,
}

impl RigidTransform {
    pub const IDENTITY: RigidTransform = RigidTransform {
        rotation: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            rotation: 0.0,
            tx,
            ty,
        }
    }

    pub fn to_affine(self) -> Affine {
        Affine::translate(Vec2::new(self.tx, self.ty)) * Affine::rotate(self.rotation)
    }

    /// Decompose an affine back into rotation + translation.
    /// Any scale/skew component the affine may carry is discarded.
    pub fn from_affine(a: Affine) -> Self {
        let [ca, sa, _, _, e, f] = a.as_coeffs();
        Self {
            rotation: sa.atan2(ca),
            tx: e,
            ty: f,
        }
    }
}

// ─── Boolean ops ─────────────────────────────────────────────────────────

/// How a [`NodeKind::BooleanGroup`] combines its children's outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    /// Union of all children.
    Add,
    /// First child minus the union of the rest.
    Subtract,
    /// Intersection of all children.
    Intersect,
    /// Symmetric difference.
    ExcludeOverlap,
}

// ─── Repeat grid geometry ────────────────────────────────────────────────

/// Grid extent and spacing for a [`NodeKind::RepeatGrid`].
///
/// `cell_width`/`cell_height` hold the componentwise max over all live
/// cells' content bounds, maintained by the repeat-grid manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepeatGridSpec {
    pub width: f64,
    pub height: f64,
    pub padding_x: f64,
    pub padding_y: f64,
    pub cell_width: f64,
    pub cell_height: f64,
}

impl RepeatGridSpec {
    /// `max(1, floor((extent + pad) / (cell + pad)))` — a trailing cell
    /// that only partially fits is kept and clipped, not discarded.
    pub fn columns(&self) -> usize {
        grid_count(self.width, self.padding_x, self.cell_width)
    }

    pub fn rows(&self) -> usize {
        grid_count(self.height, self.padding_y, self.cell_height)
    }
}

fn grid_count(extent: f64, pad: f64, cell: f64) -> usize {
    if cell + pad <= 0.0 {
        return 1;
    }
    (((extent + pad) / (cell + pad)).floor() as usize).max(1)
}

// ─── Node kinds ──────────────────────────────────────────────────────────

/// The closed set of node variants in the scenegraph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Exactly one per document; container for artboards and pasteboard
    /// content. Artboards form a contiguous run at the bottom of its
    /// z-order.
    Root,

    /// Top-level canvas/page. Child of Root only; translation-only
    /// transform.
    Artboard {
        width: f64,
        height: f64,
        /// Scrollable viewport height, when the artboard scrolls.
        viewport_height: Option<f64>,
    },

    /// Plain container. `mask` names the child whose outline clips the
    /// rest of the group; the tree keeps that child last in z-order and
    /// it contributes no paint of its own.
    Group { mask: Option<Guid> },

    /// Container whose rendered outline is a boolean combination of its
    /// children's outlines.
    BooleanGroup { op: BoolOp },

    /// An instance of a reusable symbol. Instances sharing `symbol_id`
    /// stay synchronized except for per-instance overrides.
    SymbolInstance { symbol_id: Guid },

    /// A grid of synchronized cell subtrees.
    RepeatGrid { grid: RepeatGridSpec },

    Rectangle {
        width: f64,
        height: f64,
        corner_radius: f64,
    },

    Ellipse {
        rx: f64,
        ry: f64,
    },

    /// Segment from the local origin to (x2, y2).
    Line {
        x2: f64,
        y2: f64,
    },

    /// Freeform outline in local coordinates.
    Path {
        data: BezPath,
    },

    Text {
        content: String,
        font_size: f64,
    },

    /// Imported asset; opaque and read-only.
    LinkedGraphic {
        width: f64,
        height: f64,
    },
}

impl NodeKind {
    /// Whether this variant may own children.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Root
                | NodeKind::Artboard { .. }
                | NodeKind::Group { .. }
                | NodeKind::BooleanGroup { .. }
                | NodeKind::SymbolInstance { .. }
                | NodeKind::RepeatGrid { .. }
        )
    }

    /// Guid prefix for freshly created nodes of this kind.
    pub fn guid_prefix(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Artboard { .. } => "artboard",
            NodeKind::Group { .. } => "group",
            NodeKind::BooleanGroup { .. } => "boolgroup",
            NodeKind::SymbolInstance { .. } => "instance",
            NodeKind::RepeatGrid { .. } => "grid",
            NodeKind::Rectangle { .. } => "rect",
            NodeKind::Ellipse { .. } => "ellipse",
            NodeKind::Line { .. } => "line",
            NodeKind::Path { .. } => "path",
            NodeKind::Text { .. } => "text",
            NodeKind::LinkedGraphic { .. } => "linked",
        }
    }
}

// ─── Bounds cache ────────────────────────────────────────────────────────

/// Lazily computed bounds, dirtied on any geometry-affecting mutation to
/// the node or any ancestor. `None` = dirty.
#[derive(Debug, Clone, Default)]
pub(crate) struct BoundsCache {
    pub local: Cell<Option<Rect>>,
    pub in_parent: Cell<Option<Rect>>,
    pub global: Cell<Option<Rect>>,
    pub draw: Cell<Option<Rect>>,
    /// Composed outline for boolean groups.
    pub composed: RefCell<Option<BezPath>>,
}

impl BoundsCache {
    /// Drop everything derived from geometry (own or inherited).
    pub fn clear(&self) {
        self.local.set(None);
        self.in_parent.set(None);
        self.global.set(None);
        self.draw.set(None);
        *self.composed.borrow_mut() = None;
    }

    /// Drop only the caches that depend on ancestor transforms.
    pub fn clear_global(&self) {
        self.global.set(None);
        self.draw.set(None);
    }
}

// ─── Node ────────────────────────────────────────────────────────────────

/// Index of a node slot inside the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIx(pub(crate) u32);

impl NodeIx {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single node in the document tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub guid: Guid,
    pub name: String,
    pub kind: NodeKind,
    pub style: GraphicStyle,
    pub visible: bool,
    pub locked: bool,
    pub selected: bool,
    /// Clamped to [0, 1] by the setter.
    pub opacity: f64,

    pub(crate) transform: RigidTransform,
    pub(crate) parent: Option<NodeIx>,
    pub(crate) children: SmallVec<[NodeIx; 8]>,

    #[serde(skip)]
    pub(crate) cache: BoundsCache,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        let guid = Guid::fresh(kind.guid_prefix());
        Self {
            guid,
            name: kind.guid_prefix().to_string(),
            kind,
            style: GraphicStyle::default(),
            visible: true,
            locked: false,
            selected: false,
            opacity: 1.0,
            transform: RigidTransform::IDENTITY,
            parent: None,
            children: SmallVec::new(),
            cache: BoundsCache::default(),
        }
    }

    pub fn with_name(kind: NodeKind, name: &str) -> Self {
        let mut node = Self::new(kind);
        node.name = name.to_string();
        node
    }

    /// Current rigid transform (by value — mutate via tree setters only).
    pub fn transform(&self) -> RigidTransform {
        self.transform
    }

    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn color_hex_roundtrip() {
        let c = Color::from_hex("#6C5CE7").unwrap();
        assert_eq!(c.to_hex(), "#6C5CE7");

        let c2 = Color::from_hex("FF000080").unwrap();
        assert!((c2.a - 128.0 / 255.0).abs() < 0.01);
        assert_eq!(c2.to_hex().len(), 9); // #RRGGBBAA
    }

    #[test]
    fn rigid_transform_affine_roundtrip() {
        let t = RigidTransform {
            rotation: 0.7,
            tx: 12.0,
            ty: -3.5,
        };
        let back = RigidTransform::from_affine(t.to_affine());
        assert!((back.rotation - 0.7).abs() < 1e-9);
        assert!((back.tx - 12.0).abs() < 1e-9);
        assert!((back.ty + 3.5).abs() < 1e-9);
    }

    #[test]
    fn grid_counts() {
        let spec = RepeatGridSpec {
            width: 500.0,
            height: 300.0,
            padding_x: 10.0,
            padding_y: 10.0,
            cell_width: 100.0,
            cell_height: 100.0,
        };
        assert_eq!(spec.columns(), 4);
        assert_eq!(spec.rows(), 2);
    }

    #[test]
    fn grid_count_never_zero() {
        let spec = RepeatGridSpec {
            width: 10.0,
            height: 10.0,
            padding_x: 0.0,
            padding_y: 0.0,
            cell_width: 100.0,
            cell_height: 100.0,
        };
        assert_eq!(spec.columns(), 1);
        assert_eq!(spec.rows(), 1);
    }

    #[test]
    fn stroke_outer_extent() {
        assert_eq!(StrokePosition::Inside.outer_extent(4.0), 0.0);
        assert_eq!(StrokePosition::Center.outer_extent(4.0), 2.0);
        assert_eq!(StrokePosition::Outside.outer_extent(4.0), 4.0);
    }
}
