//! Document facade: the public mutation surface and its transaction
//! machinery.
//!
//! Every mutation runs inside a transaction. Single calls outside an
//! explicit `begin`/`commit` pair settle immediately; an explicit
//! transaction batches mutations and settles once at the outermost
//! commit. Settling runs the commit pipeline: repeat grids reconcile,
//! containment resolves, and override conflict marks reset. `abort`
//! rolls the whole transaction back to the state at the outermost
//! `begin`.

use crate::containment;
use crate::error::{DocError, GeometryError, StructuralError};
use crate::id::Guid;
use crate::model::{Node, NodeIx, RigidTransform};
use crate::props::{PropEdit, PropKind};
use crate::repeat;
use crate::sync::{InstanceSyncEngine, NodePath};
use crate::tree::NodeTree;
use kurbo::Point;
use log::{debug, warn};

/// An open design document.
#[derive(Debug, Default)]
pub struct Document {
    tree: NodeTree,
    sync: InstanceSyncEngine,
    txn_depth: u32,
    snapshot: Option<(NodeTree, InstanceSyncEngine)>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh document. Alias of `new`, named for the editor's
    /// open/close lifecycle.
    #[must_use]
    pub fn open() -> Self {
        Self::new()
    }

    /// Close the document, discarding any transaction still open.
    pub fn close(mut self) {
        if self.txn_depth > 0 {
            warn!("document closed with an open transaction; rolling back");
            self.abort();
        }
    }

    /// Read access to the node tree. Mutations go through the document
    /// so they settle and sync correctly.
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn sync(&self) -> &InstanceSyncEngine {
        &self.sync
    }

    pub fn root(&self) -> NodeIx {
        self.tree.root()
    }

    // ─── Transactions ────────────────────────────────────────────────────

    /// Open a transaction. Nested calls join the outermost one.
    pub fn begin(&mut self) {
        if self.txn_depth == 0 {
            self.snapshot = Some((self.tree.clone(), self.sync.clone()));
        }
        self.txn_depth += 1;
    }

    /// Close a transaction. The outermost commit settles the document.
    pub fn commit(&mut self) {
        match self.txn_depth {
            0 => warn!("commit without an open transaction"),
            1 => {
                self.txn_depth = 0;
                self.snapshot = None;
                self.settle();
            }
            _ => self.txn_depth -= 1,
        }
    }

    /// Discard every mutation since the outermost `begin`.
    pub fn abort(&mut self) {
        if let Some((tree, sync)) = self.snapshot.take() {
            debug!("transaction aborted, rolling back");
            self.tree = tree;
            self.sync = sync;
        }
        self.txn_depth = 0;
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, DocError>,
    ) -> Result<T, DocError> {
        self.begin();
        match f(self) {
            Ok(v) => {
                self.commit();
                Ok(v)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    fn settle(&mut self) {
        repeat::settle_all(&mut self.tree, &mut self.sync);
        containment::resolve(&mut self.tree);
        self.sync.settle_txn();
    }

    /// Settle immediately unless an explicit transaction is open.
    fn after_mutation(&mut self) {
        if self.txn_depth == 0 {
            self.settle();
        }
    }

    // ─── Structure ───────────────────────────────────────────────────────

    pub fn add_child(
        &mut self,
        parent: NodeIx,
        node: Node,
        index: Option<usize>,
    ) -> Result<NodeIx, StructuralError> {
        let ix = self.tree.add_child(parent, node, index)?;
        self.after_mutation();
        Ok(ix)
    }

    pub fn add_child_before(
        &mut self,
        node: Node,
        reference: NodeIx,
    ) -> Result<NodeIx, StructuralError> {
        let ix = self.tree.add_child_before(node, reference)?;
        self.after_mutation();
        Ok(ix)
    }

    pub fn add_child_after(
        &mut self,
        node: Node,
        reference: NodeIx,
    ) -> Result<NodeIx, StructuralError> {
        let ix = self.tree.add_child_after(node, reference)?;
        self.after_mutation();
        Ok(ix)
    }

    /// Move a subtree under a new parent at the given z-order slot.
    pub fn reparent(
        &mut self,
        child: NodeIx,
        new_parent: NodeIx,
        index: Option<usize>,
    ) -> Result<(), StructuralError> {
        // Validate the attach before detaching so a rejection leaves the
        // tree unchanged.
        if !self.tree.node(new_parent).is_container() {
            return Err(StructuralError::NotAContainer {
                target: self.tree.node(new_parent).guid,
            });
        }
        if child == new_parent || self.tree.is_ancestor_ix(child, new_parent) {
            return Err(StructuralError::Cycle {
                child: self.tree.node(child).guid,
                target: self.tree.node(new_parent).guid,
            });
        }
        self.tree.remove_from_parent(child)?;
        self.tree.attach(new_parent, child, index)?;
        self.after_mutation();
        Ok(())
    }

    pub fn remove_from_parent(&mut self, child: NodeIx) -> Result<(), StructuralError> {
        self.tree.remove_from_parent(child)?;
        self.after_mutation();
        Ok(())
    }

    /// Detach every child of `parent`, returning them for re-homing.
    pub fn remove_all_children(&mut self, parent: NodeIx) -> Result<Vec<NodeIx>, StructuralError> {
        let removed = self.tree.remove_all_children(parent)?;
        self.after_mutation();
        Ok(removed)
    }

    /// Destroy a subtree and drop any overrides held by instances in it.
    pub fn destroy(&mut self, ix: NodeIx) -> Result<(), StructuralError> {
        let guids: Vec<Guid> = self
            .tree
            .descendants(ix)
            .into_iter()
            .map(|n| self.tree.node(n).guid)
            .collect();
        self.tree.destroy(ix)?;
        for g in guids {
            self.sync.drop_instance(g);
        }
        self.after_mutation();
        Ok(())
    }

    /// Clone a subtree above the original. The copy inherits the
    /// original's overrides.
    pub fn duplicate(&mut self, ix: NodeIx) -> Result<NodeIx, StructuralError> {
        let original_guid = self.tree.node(ix).guid;
        let copy = self.tree.duplicate(ix)?;
        let copy_guid = self.tree.node(copy).guid;
        self.sync.inherit_overrides(original_guid, copy_guid);
        self.after_mutation();
        Ok(copy)
    }

    // ─── Z-order ─────────────────────────────────────────────────────────

    pub fn send_backward(&mut self, ix: NodeIx) -> bool {
        let moved = self.tree.send_backward(ix);
        self.after_mutation();
        moved
    }

    pub fn bring_forward(&mut self, ix: NodeIx) -> bool {
        let moved = self.tree.bring_forward(ix);
        self.after_mutation();
        moved
    }

    pub fn send_to_back(&mut self, ix: NodeIx) -> bool {
        let moved = self.tree.send_to_back(ix);
        self.after_mutation();
        moved
    }

    pub fn bring_to_front(&mut self, ix: NodeIx) -> bool {
        let moved = self.tree.bring_to_front(ix);
        self.after_mutation();
        moved
    }

    pub fn set_locked(&mut self, ix: NodeIx, locked: bool) {
        self.tree.set_locked(ix, locked);
    }

    /// Make `mask` the group's clipping child, or clear it with `None`.
    pub fn set_mask(&mut self, group: NodeIx, mask: Option<NodeIx>) -> Result<(), StructuralError> {
        self.tree.set_mask(group, mask)?;
        self.after_mutation();
        Ok(())
    }

    // ─── Geometry ────────────────────────────────────────────────────────

    pub fn set_transform(&mut self, ix: NodeIx, transform: RigidTransform) {
        self.tree.set_transform(ix, transform);
        self.after_mutation();
    }

    pub fn move_in_parent(&mut self, ix: NodeIx, dx: f64, dy: f64) {
        self.tree.move_in_parent(ix, dx, dy);
        self.after_mutation();
    }

    pub fn place_in_parent(&mut self, ix: NodeIx, x: f64, y: f64) {
        self.tree.place_in_parent(ix, x, y);
        self.after_mutation();
    }

    pub fn rotate_around(&mut self, ix: NodeIx, angle: f64, pivot: Point) {
        self.tree.rotate_around(ix, angle, pivot);
        self.after_mutation();
    }

    pub fn resize(&mut self, ix: NodeIx, w: f64, h: f64) -> Result<(), GeometryError> {
        self.tree.resize(ix, w, h)?;
        self.after_mutation();
        Ok(())
    }

    // ─── Properties ──────────────────────────────────────────────────────

    /// Apply a property edit. Inside a symbol instance or grid cell the
    /// edit runs through the sync engine; `mark_override` pins the slot
    /// on this instance instead of propagating.
    pub fn apply_prop(
        &mut self,
        target: NodeIx,
        edit: PropEdit,
        mark_override: bool,
    ) -> Result<(), DocError> {
        self.sync.apply(&mut self.tree, target, edit, mark_override)?;
        self.after_mutation();
        Ok(())
    }

    /// Release an override so the slot tracks its siblings again.
    pub fn clear_override(&mut self, instance_root: NodeIx, path: &NodePath, prop: PropKind) {
        self.sync
            .clear_override(&mut self.tree, instance_root, path, prop);
        self.after_mutation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::model::{Color, NodeKind, Paint};
    use smallvec::smallvec;

    fn fill(hex: &str) -> PropEdit {
        PropEdit::Fill(Some(Paint::Solid(Color::from_hex(hex).unwrap())))
    }

    fn artboard() -> Node {
        Node::new(NodeKind::Artboard {
            width: 400.0,
            height: 400.0,
            viewport_height: None,
        })
    }

    fn rect(w: f64, h: f64) -> Node {
        Node::new(NodeKind::Rectangle {
            width: w,
            height: h,
            corner_radius: 0.0,
        })
    }

    #[test]
    fn single_op_settles_immediately() {
        let mut doc = Document::new();
        let ab = doc.add_child(doc.root(), artboard(), None).unwrap();
        let r = doc.add_child(doc.root(), rect(50.0, 50.0), None).unwrap();
        doc.place_in_parent(r, 10.0, 10.0);
        // Containment ran: the rect overlaps the artboard, so it re-homed.
        assert_eq!(doc.tree().parent(r), Some(ab));
    }

    #[test]
    fn transaction_batches_settling() {
        let mut doc = Document::new();
        let ab = doc.add_child(doc.root(), artboard(), None).unwrap();

        doc.begin();
        let r = doc.add_child(doc.root(), rect(50.0, 50.0), None).unwrap();
        doc.place_in_parent(r, 10.0, 10.0);
        // Inside the transaction containment has not run yet.
        assert_eq!(doc.tree().parent(r), Some(doc.root()));
        doc.commit();
        assert_eq!(doc.tree().parent(r), Some(ab));
    }

    #[test]
    fn abort_restores_everything() {
        let mut doc = Document::new();
        let ab = doc.add_child(doc.root(), artboard(), None).unwrap();
        let r = doc.add_child(ab, rect(50.0, 50.0), None).unwrap();
        let before = doc.tree().len();

        doc.begin();
        doc.destroy(r).unwrap();
        doc.add_child(ab, rect(9.0, 9.0), None).unwrap();
        doc.abort();

        assert_eq!(doc.tree().len(), before);
        let r_guid = doc.tree().node(r).guid;
        assert_eq!(doc.tree().index_of(r_guid), Some(r));
    }

    #[test]
    fn nested_transactions_settle_once_at_outermost_commit() {
        let mut doc = Document::new();
        let ab = doc.add_child(doc.root(), artboard(), None).unwrap();

        doc.begin();
        doc.begin();
        let r = doc.add_child(doc.root(), rect(50.0, 50.0), None).unwrap();
        doc.place_in_parent(r, 10.0, 10.0);
        doc.commit();
        // Inner commit must not settle.
        assert_eq!(doc.tree().parent(r), Some(doc.root()));
        doc.commit();
        assert_eq!(doc.tree().parent(r), Some(ab));
    }

    #[test]
    fn transact_rolls_back_on_error() {
        let mut doc = Document::new();
        let ab = doc.add_child(doc.root(), artboard(), None).unwrap();
        let r = doc.add_child(ab, rect(50.0, 50.0), None).unwrap();

        let result = doc.transact(|doc| {
            doc.destroy(r)?;
            doc.resize(ab, -1.0, 10.0)?;
            Ok(())
        });
        assert!(result.is_err());
        let r_guid = doc.tree().node(r).guid;
        assert_eq!(doc.tree().index_of(r_guid), Some(r));
    }

    #[test]
    fn override_conflict_in_one_transaction_is_rejected() {
        let mut doc = Document::new();
        let sym = Guid::intern("button");
        doc.begin();
        let a = doc
            .add_child(doc.root(), Node::new(NodeKind::SymbolInstance { symbol_id: sym }), None)
            .unwrap();
        let _b = doc
            .add_child(doc.root(), Node::new(NodeKind::SymbolInstance { symbol_id: sym }), None)
            .unwrap();
        let label = doc
            .add_child(a, Node::new(NodeKind::Text { content: "Go".into(), font_size: 12.0 }), None)
            .unwrap();
        doc.commit();

        doc.begin();
        doc.apply_prop(label, fill("#ff0000"), true)
            .unwrap();
        let again = doc.apply_prop(label, fill("#00ff00"), true);
        assert!(matches!(again, Err(DocError::OverrideConflict { .. })));
        doc.commit();

        // A fresh transaction may override the same slot again.
        doc.begin();
        doc.apply_prop(label, fill("#00ff00"), true)
            .unwrap();
        doc.commit();
        assert!(doc.sync().is_overridden(&crate::sync::OverrideKey {
            instance: doc.tree().node(a).guid,
            path: smallvec![0],
            prop: PropKind::Fill,
        }));
    }

    #[test]
    fn reparent_rejection_leaves_tree_untouched() {
        let mut doc = Document::new();
        let g = doc
            .add_child(doc.root(), Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        let inner = doc.add_child(g, Node::new(NodeKind::Group { mask: None }), None).unwrap();
        let err = doc.reparent(g, inner, None).unwrap_err();
        assert!(matches!(err, StructuralError::Cycle { .. }));
        assert_eq!(doc.tree().parent(g), Some(doc.root()));
    }
}
