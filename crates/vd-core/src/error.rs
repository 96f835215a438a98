//! Error taxonomy for document mutations.
//!
//! Every error is local and recoverable: the triggering operation is
//! rejected atomically and the tree is left exactly as before the call.
//! Read accessors (bounds, path data, enumeration) never fail — they
//! degrade to zero-area geometry instead.

use crate::id::Guid;
use thiserror::Error;

/// Structural contract violations on tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("inserting {child} under {target} would create a cycle")]
    Cycle { child: Guid, target: Guid },

    #[error("{target} is not a container and cannot take children")]
    NotAContainer { target: Guid },

    #[error("{child} already has a parent — detach it first")]
    AlreadyParented { child: Guid },

    #[error("{node} is not attached to any parent")]
    NotAttached { node: Guid },

    #[error("{node} is the document root and cannot be moved or removed")]
    RootImmovable { node: Guid },
}

/// Geometric contract violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("resize to {width}x{height} rejected: dimensions must be >= 0")]
    NegativeSize { width: f64, height: f64 },
}

/// Top-level error type for document operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Two overrides raced for the same (instance, path, property) slot
    /// within a single transaction.
    #[error("conflicting overrides for {property} at {path:?} on instance {instance}")]
    OverrideConflict {
        instance: Guid,
        path: Vec<usize>,
        property: &'static str,
    },
}
