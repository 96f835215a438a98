//! Instance sync: propagation of edits across symbol instances and
//! repeat-grid cells, with per-target overrides.
//!
//! Every symbol id (and every repeat grid) has a canonical subtree
//! shape; instances of it stay structurally isomorphic. A property edit
//! inside an instance resolves to a (path, property) slot relative to
//! the subtree root. Non-overridden slots propagate the new value to
//! every sibling instance — creating missing nodes on the way
//! (structural repair). An override pins a slot on one instance and
//! excludes it from propagation until cleared, at which point the value
//! reverts to canonical and resumes tracking.

use crate::error::DocError;
use crate::id::Guid;
use crate::model::{NodeIx, NodeKind};
use crate::props::{self, PropEdit, PropKind};
use crate::tree::NodeTree;
use log::debug;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

/// Child-index path from an instance root down to a node.
pub type NodePath = SmallVec<[usize; 8]>;

/// Identity of an override slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverrideKey {
    pub instance: Guid,
    pub path: NodePath,
    pub prop: PropKind,
}

/// Which family of sibling subtrees an edit fans out over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncScope {
    /// All instances sharing this symbol id.
    Symbol(Guid),
    /// All cells of this repeat grid.
    GridCell(NodeIx),
}

/// The override ledger and propagation engine.
#[derive(Debug, Clone, Default)]
pub struct InstanceSyncEngine {
    overrides: HashMap<OverrideKey, PropEdit>,
    /// Override slots written in the current transaction, for conflict
    /// detection.
    txn_marks: HashSet<OverrideKey>,
}

impl InstanceSyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a property edit through the sync machinery.
    ///
    /// Outside any instance subtree the edit applies directly. Inside
    /// one, a non-override edit propagates to all sibling instances
    /// (skipping their overridden slots); `mark_override` records the
    /// slot as overridden on this instance instead, if the property
    /// supports it.
    pub fn apply(
        &mut self,
        tree: &mut NodeTree,
        target: NodeIx,
        edit: PropEdit,
        mark_override: bool,
    ) -> Result<(), DocError> {
        let Some((root, scope)) = enclosing_subtree(tree, target) else {
            props::apply_edit(tree, target, &edit);
            return Ok(());
        };

        let path = path_to(tree, root, target);
        let kind = edit.kind();
        let key = OverrideKey {
            instance: tree.node(root).guid,
            path: path.clone(),
            prop: kind,
        };

        if mark_override && kind.overridable() {
            if self.txn_marks.contains(&key) {
                return Err(DocError::OverrideConflict {
                    instance: key.instance,
                    path: key.path.to_vec(),
                    property: kind.name(),
                });
            }
            debug!("override {:?} on {}", kind, key.instance);
            self.txn_marks.insert(key.clone());
            self.overrides.insert(key, edit.clone());
            props::apply_edit(tree, target, &edit);
            return Ok(());
        }

        props::apply_edit(tree, target, &edit);

        if self.overrides.contains_key(&key) {
            // The slot is overridden on this instance: keep tracking the
            // local value, stay excluded from propagation.
            self.overrides.insert(key, edit);
            return Ok(());
        }

        for sibling in sibling_roots(tree, root, scope) {
            if sibling == root {
                continue;
            }
            let sib_key = OverrideKey {
                instance: tree.node(sibling).guid,
                path: path.clone(),
                prop: kind,
            };
            if self.overrides.contains_key(&sib_key) {
                continue;
            }
            if let Some(sib_target) = resolve_or_repair(tree, root, sibling, &path) {
                props::apply_edit(tree, sib_target, &edit);
            }
        }
        Ok(())
    }

    /// Clear an override: the slot reverts to the canonical value and
    /// resumes tracking it.
    pub fn clear_override(
        &mut self,
        tree: &mut NodeTree,
        instance_root: NodeIx,
        path: &NodePath,
        prop: PropKind,
    ) {
        let key = OverrideKey {
            instance: tree.node(instance_root).guid,
            path: path.clone(),
            prop,
        };
        if self.overrides.remove(&key).is_none() {
            return;
        }
        self.txn_marks.remove(&key);

        let Some(scope) = scope_of(tree, instance_root) else {
            return;
        };
        // Canonical value: read off the first sibling that isn't itself
        // overridden on this slot.
        for sibling in sibling_roots(tree, instance_root, scope) {
            if sibling == instance_root {
                continue;
            }
            let sib_key = OverrideKey {
                instance: tree.node(sibling).guid,
                path: path.clone(),
                prop,
            };
            if self.overrides.contains_key(&sib_key) {
                continue;
            }
            if let Some(src) = resolve_path(tree, sibling, path) {
                let canonical = props::read_prop(tree, src, prop);
                if let Some(local) = resolve_path(tree, instance_root, path) {
                    props::apply_edit(tree, local, &canonical);
                }
                break;
            }
        }
    }

    pub fn is_overridden(&self, key: &OverrideKey) -> bool {
        self.overrides.contains_key(key)
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&OverrideKey, &PropEdit)> {
        self.overrides.iter()
    }

    /// Copy one instance's overrides onto another — a freshly cloned
    /// repeat-grid cell inherits the overrides of its donor.
    pub(crate) fn inherit_overrides(&mut self, from: Guid, to: Guid) {
        let inherited: Vec<(OverrideKey, PropEdit)> = self
            .overrides
            .iter()
            .filter(|(k, _)| k.instance == from)
            .map(|(k, v)| {
                (
                    OverrideKey {
                        instance: to,
                        path: k.path.clone(),
                        prop: k.prop,
                    },
                    v.clone(),
                )
            })
            .collect();
        self.overrides.extend(inherited);
    }

    /// Drop every override belonging to a destroyed instance or cell.
    pub(crate) fn drop_instance(&mut self, instance: Guid) {
        self.overrides.retain(|k, _| k.instance != instance);
        self.txn_marks.retain(|k| k.instance != instance);
    }

    /// Reset per-transaction conflict tracking.
    pub(crate) fn settle_txn(&mut self) {
        self.txn_marks.clear();
    }
}

// ─── Subtree resolution ──────────────────────────────────────────────────

/// Innermost instance/cell subtree containing `ix` (inclusive), if any.
fn enclosing_subtree(tree: &NodeTree, ix: NodeIx) -> Option<(NodeIx, SyncScope)> {
    let mut current = Some(ix);
    while let Some(n) = current {
        if let Some(scope) = scope_of(tree, n) {
            return Some((n, scope));
        }
        current = tree.parent(n);
    }
    None
}

/// The sync scope `n` roots, if it roots one.
fn scope_of(tree: &NodeTree, n: NodeIx) -> Option<SyncScope> {
    if let NodeKind::SymbolInstance { symbol_id } = tree.node(n).kind {
        return Some(SyncScope::Symbol(symbol_id));
    }
    if let Some(p) = tree.parent(n)
        && matches!(tree.node(p).kind, NodeKind::RepeatGrid { .. })
    {
        return Some(SyncScope::GridCell(p));
    }
    None
}

fn sibling_roots(tree: &NodeTree, _root: NodeIx, scope: SyncScope) -> Vec<NodeIx> {
    match scope {
        SyncScope::Symbol(symbol_id) => tree
            .indices()
            .filter(|&n| {
                matches!(tree.node(n).kind, NodeKind::SymbolInstance { symbol_id: sid } if sid == symbol_id)
            })
            .collect(),
        SyncScope::GridCell(grid) => tree.children(grid).to_vec(),
    }
}

/// Child-index path from `root` down to `ix`.
fn path_to(tree: &NodeTree, root: NodeIx, ix: NodeIx) -> NodePath {
    let mut path = NodePath::new();
    let mut current = ix;
    while current != root {
        let Some(parent) = tree.parent(current) else {
            break;
        };
        let pos = tree
            .children(parent)
            .iter()
            .position(|&c| c == current)
            .expect("child missing from its parent's list");
        path.push(pos);
        current = parent;
    }
    path.reverse();
    path
}

fn resolve_path(tree: &NodeTree, root: NodeIx, path: &NodePath) -> Option<NodeIx> {
    let mut current = root;
    for &i in path {
        current = *tree.children(current).get(i)?;
    }
    Some(current)
}

/// Resolve `path` under `dst_root`, cloning missing nodes over from the
/// source subtree so the sibling becomes isomorphic again.
fn resolve_or_repair(
    tree: &mut NodeTree,
    src_root: NodeIx,
    dst_root: NodeIx,
    path: &NodePath,
) -> Option<NodeIx> {
    let mut src = src_root;
    let mut dst = dst_root;
    for &i in path {
        src = *tree.children(src).get(i)?;
        dst = match tree.children(dst).get(i) {
            Some(&existing) => existing,
            None => {
                debug!(
                    "structural repair: cloning {} into {}",
                    tree.node(src).guid,
                    tree.node(dst).guid
                );
                let clone = tree.clone_subtree_detached(src);
                tree.attach(dst, clone, Some(i)).ok()?;
                clone
            }
        };
    }
    Some(dst)
}
