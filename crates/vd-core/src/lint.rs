//! Lint diagnostics for documents.
//!
//! Reports suspicious document state without modifying it. Results are
//! meant for an editor's issues panel.

use crate::id::Guid;
use crate::model::{NodeIx, NodeKind};
use crate::sync::InstanceSyncEngine;
use crate::tree::NodeTree;

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintSeverity {
    /// Should be fixed — likely a mistake.
    Warning,
    /// Informational — style suggestion.
    Info,
}

/// A single lint diagnostic for a document node.
#[derive(Debug, Clone)]
pub struct LintDiagnostic {
    /// The node this diagnostic refers to.
    pub guid: Guid,
    /// Human-readable message.
    pub message: String,
    /// Severity level.
    pub severity: LintSeverity,
    /// Short rule identifier (e.g. "empty-container", "degenerate-shape").
    pub rule: &'static str,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Run all lint rules over the document and return diagnostics.
#[must_use]
pub fn lint_document(tree: &NodeTree, sync: &InstanceSyncEngine) -> Vec<LintDiagnostic> {
    let mut diags = Vec::new();
    lint_empty_containers(tree, &mut diags);
    lint_degenerate_shapes(tree, &mut diags);
    lint_default_names(tree, &mut diags);
    lint_opacity_range(tree, &mut diags);
    lint_orphaned_overrides(tree, sync, &mut diags);
    diags
}

// ─── Rules ────────────────────────────────────────────────────────────────

/// Warn on groups and boolean groups with no children. They render
/// nothing and usually survive an over-eager delete.
fn lint_empty_containers(tree: &NodeTree, diags: &mut Vec<LintDiagnostic>) {
    for ix in tree.indices() {
        let node = tree.node(ix);
        let empty_kind = matches!(
            node.kind,
            NodeKind::Group { .. } | NodeKind::BooleanGroup { .. } | NodeKind::RepeatGrid { .. }
        );
        if empty_kind && node.children.is_empty() {
            diags.push(LintDiagnostic {
                guid: node.guid,
                message: format!("`{}` is an empty container.", node.guid),
                severity: LintSeverity::Warning,
                rule: "empty-container",
            });
        }
    }
}

/// Warn on shapes with no area to paint.
fn lint_degenerate_shapes(tree: &NodeTree, diags: &mut Vec<LintDiagnostic>) {
    for ix in tree.indices() {
        let node = tree.node(ix);
        let degenerate = match &node.kind {
            NodeKind::Rectangle { width, height, .. } => *width <= 0.0 || *height <= 0.0,
            NodeKind::Ellipse { rx, ry } => *rx <= 0.0 || *ry <= 0.0,
            NodeKind::Line { x2, y2 } => *x2 == 0.0 && *y2 == 0.0,
            NodeKind::Path { data } => data.elements().is_empty(),
            _ => false,
        };
        if degenerate {
            diags.push(LintDiagnostic {
                guid: node.guid,
                message: format!("`{}` has zero extent and will not render.", node.guid),
                severity: LintSeverity::Warning,
                rule: "degenerate-shape",
            });
        }
    }
}

/// Info on nodes still wearing their auto-generated name.
fn lint_default_names(tree: &NodeTree, diags: &mut Vec<LintDiagnostic>) {
    for ix in tree.indices() {
        let node = tree.node(ix);
        if matches!(node.kind, NodeKind::Root) {
            continue;
        }
        if node.name == node.kind.guid_prefix() || node.name.is_empty() {
            diags.push(LintDiagnostic {
                guid: node.guid,
                message: format!(
                    "`{}` still has its default name; consider a semantic one like \"Primary button\".",
                    node.guid
                ),
                severity: LintSeverity::Info,
                rule: "default-name",
            });
        }
    }
}

/// Warn on opacity outside [0, 1]. Edits clamp on the way in, so this
/// only fires on documents built by hand or loaded from elsewhere.
fn lint_opacity_range(tree: &NodeTree, diags: &mut Vec<LintDiagnostic>) {
    for ix in tree.indices() {
        let node = tree.node(ix);
        if !(0.0..=1.0).contains(&node.opacity) {
            diags.push(LintDiagnostic {
                guid: node.guid,
                message: format!(
                    "`{}` has opacity {} outside [0, 1].",
                    node.guid, node.opacity
                ),
                severity: LintSeverity::Warning,
                rule: "opacity-range",
            });
        }
    }
}

/// Warn on overrides whose instance or target node no longer exists.
/// These never fire again and keep stale values alive.
fn lint_orphaned_overrides(
    tree: &NodeTree,
    sync: &InstanceSyncEngine,
    diags: &mut Vec<LintDiagnostic>,
) {
    for (key, _) in sync.overrides() {
        let resolved = tree
            .index_of(key.instance)
            .and_then(|root| walk_path(tree, root, &key.path));
        if resolved.is_none() {
            diags.push(LintDiagnostic {
                guid: key.instance,
                message: format!(
                    "Override on `{}` no longer resolves to a node.",
                    key.instance
                ),
                severity: LintSeverity::Warning,
                rule: "orphaned-override",
            });
        }
    }
}

fn walk_path(tree: &NodeTree, root: NodeIx, path: &[usize]) -> Option<NodeIx> {
    let mut cur = root;
    for &step in path {
        cur = *tree.children(cur).get(step)?;
    }
    Some(cur)
}

// ─── Tests ────────────────────────────────────────────────────────────────
