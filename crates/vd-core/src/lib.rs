mod boolops;
mod bounds;
mod containment;
pub mod document;
pub mod error;
pub mod id;
pub mod lint;
pub mod model;
mod path;
pub mod props;
mod repeat;
pub mod sync;
pub mod tree;

pub use document::Document;
pub use error::{DocError, GeometryError, StructuralError};
pub use id::Guid;
pub use lint::{LintDiagnostic, LintSeverity, lint_document};
pub use model::*;
pub use props::{PropEdit, PropKind};
pub use sync::{InstanceSyncEngine, NodePath, OverrideKey};
pub use tree::NodeTree;

// Re-export kurbo geometry types so downstream crates don't need a
// direct dependency.
pub use kurbo::{Affine, BezPath, Point, Rect, Shape, Vec2};
