//! Node tree: parent/child structure and z-order.
//!
//! Nodes live in a slab arena. Each container owns its ordered child
//! list (index 0 = bottom of z-order); the parent link is a back-index
//! used only for lookup. Structural mutations validate their contracts
//! up front and reject atomically — a failed call leaves the tree
//! untouched.

use crate::error::StructuralError;
use crate::id::Guid;
use crate::model::{Node, NodeIx, NodeKind};
use log::trace;
use std::collections::{HashMap, HashSet};

/// The document's node arena plus structural indices.
#[derive(Debug, Clone)]
pub struct NodeTree {
    slots: Vec<Option<Node>>,
    free: Vec<NodeIx>,
    root: NodeIx,
    guid_index: HashMap<Guid, NodeIx>,
    /// Nodes whose bounds may have changed since the last containment
    /// pass. Drained by the resolver at commit.
    pub(crate) changed: HashSet<NodeIx>,
}

impl NodeTree {
    /// Create a tree holding only the root node.
    #[must_use]
    pub fn new() -> Self {
        let root_node = Node::with_name(NodeKind::Root, "root");
        let root_guid = root_node.guid;
        let mut guid_index = HashMap::new();
        guid_index.insert(root_guid, NodeIx(0));
        Self {
            slots: vec![Some(root_node)],
            free: Vec::new(),
            root: NodeIx(0),
            guid_index,
            changed: HashSet::new(),
        }
    }

    pub fn root(&self) -> NodeIx {
        self.root
    }

    /// Borrow a node. Panics on a stale index — arena indices are only
    /// handed out by this tree and stay valid until `destroy`.
    pub fn node(&self, ix: NodeIx) -> &Node {
        self.slots[ix.index()].as_ref().expect("stale node index")
    }

    pub(crate) fn node_mut(&mut self, ix: NodeIx) -> &mut Node {
        self.slots[ix.index()].as_mut().expect("stale node index")
    }

    /// Whether `ix` refers to a live node.
    pub fn contains(&self, ix: NodeIx) -> bool {
        self.slots.get(ix.index()).is_some_and(|s| s.is_some())
    }

    /// Look up a live node by guid.
    pub fn index_of(&self, guid: Guid) -> Option<NodeIx> {
        self.guid_index.get(&guid).copied()
    }

    pub fn get(&self, guid: Guid) -> Option<&Node> {
        self.index_of(guid).map(|ix| self.node(ix))
    }

    pub fn parent(&self, ix: NodeIx) -> Option<NodeIx> {
        self.node(ix).parent
    }

    /// Ordered child list, bottom of z-order first.
    pub fn children(&self, ix: NodeIx) -> &[NodeIx] {
        &self.node(ix).children
    }

    /// Number of live nodes (root included).
    pub fn len(&self) -> usize {
        self.guid_index.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the root always exists
    }

    // ─── Insertion ───────────────────────────────────────────────────────

    /// Put a detached node value into the arena without attaching it.
    pub fn insert_detached(&mut self, node: Node) -> NodeIx {
        let guid = node.guid;
        let ix = match self.free.pop() {
            Some(ix) => {
                self.slots[ix.index()] = Some(node);
                ix
            }
            None => {
                self.slots.push(Some(node));
                NodeIx((self.slots.len() - 1) as u32)
            }
        };
        self.guid_index.insert(guid, ix);
        ix
    }

    /// Add a fresh node as a child of `parent`. `index` past the end (or
    /// `None`) appends at the top of z-order. Returns the new node's index.
    pub fn add_child(
        &mut self,
        parent: NodeIx,
        node: Node,
        index: Option<usize>,
    ) -> Result<NodeIx, StructuralError> {
        self.check_container(parent)?;
        if node.parent.is_some() {
            return Err(StructuralError::AlreadyParented { child: node.guid });
        }
        let child = self.insert_detached(node);
        self.attach_unchecked(parent, child, index);
        Ok(child)
    }

    /// Insert a fresh node directly below `reference` in z-order.
    pub fn add_child_before(
        &mut self,
        node: Node,
        reference: NodeIx,
    ) -> Result<NodeIx, StructuralError> {
        let (parent, pos) = self.position_of(reference)?;
        self.add_child(parent, node, Some(pos))
    }

    /// Insert a fresh node directly above `reference` in z-order.
    pub fn add_child_after(
        &mut self,
        node: Node,
        reference: NodeIx,
    ) -> Result<NodeIx, StructuralError> {
        let (parent, pos) = self.position_of(reference)?;
        self.add_child(parent, node, Some(pos + 1))
    }

    /// Re-attach a detached subtree under `parent`. The child must have
    /// no current parent, and may not be an ancestor of `parent`.
    pub fn attach(
        &mut self,
        parent: NodeIx,
        child: NodeIx,
        index: Option<usize>,
    ) -> Result<(), StructuralError> {
        self.check_container(parent)?;
        let child_node = self.node(child);
        if child == self.root {
            return Err(StructuralError::RootImmovable {
                node: child_node.guid,
            });
        }
        if child_node.parent.is_some() {
            return Err(StructuralError::AlreadyParented {
                child: child_node.guid,
            });
        }
        if child == parent || self.is_ancestor_ix(child, parent) {
            return Err(StructuralError::Cycle {
                child: child_node.guid,
                target: self.node(parent).guid,
            });
        }
        self.attach_unchecked(parent, child, index);
        Ok(())
    }

    fn attach_unchecked(&mut self, parent: NodeIx, child: NodeIx, index: Option<usize>) {
        let pos = self.clamp_insert_index(parent, child, index);
        self.node_mut(parent).children.insert(pos, child);
        self.node_mut(child).parent = Some(parent);
        trace!(
            "attach {} under {} at {}",
            self.node(child).guid,
            self.node(parent).guid,
            pos
        );
        self.mark_dirty(child);
    }

    /// Clamp an insertion index to the container's valid range.
    ///
    /// Two invariants constrain the slot beyond plain range clamping:
    /// artboards form a contiguous run at the bottom of root's z-order
    /// (pasteboard content sits above it), and a masked group keeps its
    /// mask as the last child.
    fn clamp_insert_index(&self, parent: NodeIx, child: NodeIx, index: Option<usize>) -> usize {
        let len = self.node(parent).children.len();
        let mut pos = index.unwrap_or(len).min(len);

        if parent == self.root {
            let run = self.artboard_run_len();
            if matches!(self.node(child).kind, NodeKind::Artboard { .. }) {
                pos = pos.min(run);
            } else {
                pos = pos.max(run);
            }
        } else if let NodeKind::Group { mask: Some(m) } = self.node(parent).kind {
            if self.node(child).guid == m {
                pos = len;
            } else if let Some(mpos) = self.mask_position(parent, m) {
                pos = pos.min(mpos);
            }
        }
        pos
    }

    /// Index of the group's recorded mask among its children, if present.
    fn mask_position(&self, group: NodeIx, mask: Guid) -> Option<usize> {
        self.node(group)
            .children
            .iter()
            .position(|&c| self.node(c).guid == mask)
    }

    /// Length of the artboard run at the bottom of root's children.
    pub(crate) fn artboard_run_len(&self) -> usize {
        self.node(self.root)
            .children
            .iter()
            .take_while(|&&c| matches!(self.node(c).kind, NodeKind::Artboard { .. }))
            .count()
    }

    /// All artboards in z-order (index = artboard index for tie-breaks).
    pub fn artboards(&self) -> Vec<NodeIx> {
        let run = self.artboard_run_len();
        self.node(self.root).children[..run].to_vec()
    }

    // ─── Removal ─────────────────────────────────────────────────────────

    /// Detach a node (and its subtree) from its parent. The subtree stays
    /// in the arena and can be re-attached.
    pub fn remove_from_parent(&mut self, child: NodeIx) -> Result<(), StructuralError> {
        let Some(parent) = self.node(child).parent else {
            return Err(StructuralError::NotAttached {
                node: self.node(child).guid,
            });
        };
        self.mark_dirty(child); // ancestors invalidated while still linked
        let children = &mut self.node_mut(parent).children;
        if let Some(pos) = children.iter().position(|&c| c == child) {
            children.remove(pos);
        }
        self.node_mut(child).parent = None;
        Ok(())
    }

    /// Detach every child of `parent` in one pass — equivalent to
    /// removing each child, but with a single cache invalidation.
    pub fn remove_all_children(&mut self, parent: NodeIx) -> Result<Vec<NodeIx>, StructuralError> {
        self.check_container(parent)?;
        let children: Vec<NodeIx> = self.node(parent).children.to_vec();
        for &c in &children {
            self.node_mut(c).parent = None;
        }
        self.node_mut(parent).children.clear();
        self.mark_dirty(parent);
        Ok(children)
    }

    /// Detach and destroy a subtree, freeing its arena slots.
    pub fn destroy(&mut self, ix: NodeIx) -> Result<(), StructuralError> {
        if ix == self.root {
            return Err(StructuralError::RootImmovable {
                node: self.node(ix).guid,
            });
        }
        if self.node(ix).parent.is_some() {
            self.remove_from_parent(ix)?;
        }
        self.free_subtree(ix);
        Ok(())
    }

    fn free_subtree(&mut self, ix: NodeIx) {
        let children: Vec<NodeIx> = self.node(ix).children.to_vec();
        for c in children {
            self.free_subtree(c);
        }
        let guid = self.node(ix).guid;
        self.guid_index.remove(&guid);
        self.changed.remove(&ix);
        self.slots[ix.index()] = None;
        self.free.push(ix);
    }

    // ─── Flags ───────────────────────────────────────────────────────────

    /// Show or hide a node. Hidden subtrees still occupy layout space
    /// but stop painting and hit-testing.
    pub fn set_visible(&mut self, ix: NodeIx, visible: bool) {
        if self.node(ix).visible != visible {
            self.node_mut(ix).visible = visible;
            self.mark_dirty(ix);
        }
    }

    pub fn set_locked(&mut self, ix: NodeIx, locked: bool) {
        self.node_mut(ix).locked = locked;
    }

    // ─── Masking ─────────────────────────────────────────────────────────

    /// Record `mask` as the group's clipping child and move it to the
    /// top of the group's z-order. `None` clears the mask. The mask must
    /// already be a child of `group`.
    pub fn set_mask(&mut self, group: NodeIx, mask: Option<NodeIx>) -> Result<(), StructuralError> {
        if !matches!(self.node(group).kind, NodeKind::Group { .. }) {
            return Err(StructuralError::NotAContainer {
                target: self.node(group).guid,
            });
        }
        let guid = match mask {
            Some(m) => {
                if self.node(m).parent != Some(group) {
                    return Err(StructuralError::NotAttached {
                        node: self.node(m).guid,
                    });
                }
                Some(self.node(m).guid)
            }
            None => None,
        };
        if let NodeKind::Group { mask: slot } = &mut self.node_mut(group).kind {
            *slot = guid;
        }
        if let Some(m) = mask {
            let children = &mut self.node_mut(group).children;
            if let Some(pos) = children.iter().position(|&c| c == m) {
                children.remove(pos);
                children.push(m);
            }
        }
        self.mark_dirty(group);
        Ok(())
    }

    // ─── Z-order ─────────────────────────────────────────────────────────

    /// Move a child one step toward the bottom of z-order.
    /// Returns true if the order changed.
    pub fn send_backward(&mut self, child: NodeIx) -> bool {
        match self.position_of(child) {
            Ok((parent, pos)) if pos > 0 => self.shift_child(parent, pos, pos - 1),
            _ => false,
        }
    }

    /// Move a child one step toward the top of z-order.
    pub fn bring_forward(&mut self, child: NodeIx) -> bool {
        match self.position_of(child) {
            Ok((parent, pos)) if pos + 1 < self.node(parent).children.len() => {
                self.shift_child(parent, pos, pos + 1)
            }
            _ => false,
        }
    }

    /// Move a child to the bottom of z-order.
    pub fn send_to_back(&mut self, child: NodeIx) -> bool {
        match self.position_of(child) {
            Ok((parent, pos)) if pos > 0 => self.shift_child(parent, pos, 0),
            _ => false,
        }
    }

    /// Move a child to the top of z-order.
    pub fn bring_to_front(&mut self, child: NodeIx) -> bool {
        match self.position_of(child) {
            Ok((parent, pos)) => {
                let last = self.node(parent).children.len() - 1;
                if pos == last {
                    false
                } else {
                    self.shift_child(parent, pos, last)
                }
            }
            _ => false,
        }
    }

    fn shift_child(&mut self, parent: NodeIx, from: usize, mut to: usize) -> bool {
        // The mask of a masked group pins the top slot: it never moves
        // down, and nothing moves above it.
        if let NodeKind::Group { mask: Some(m) } = self.node(parent).kind {
            let len = self.node(parent).children.len();
            let child = self.node(parent).children[from];
            if self.node(child).guid == m {
                to = len - 1;
            } else {
                to = to.min(len.saturating_sub(2));
            }
        }
        if to == from {
            return false;
        }
        let children = &mut self.node_mut(parent).children;
        let child = children.remove(from);
        children.insert(to, child);
        self.mark_dirty(parent);
        true
    }

    fn position_of(&self, child: NodeIx) -> Result<(NodeIx, usize), StructuralError> {
        let Some(parent) = self.node(child).parent else {
            return Err(StructuralError::NotAttached {
                node: self.node(child).guid,
            });
        };
        let pos = self
            .node(parent)
            .children
            .iter()
            .position(|&c| c == child)
            .expect("child missing from its parent's list");
        Ok((parent, pos))
    }

    // ─── Duplication ─────────────────────────────────────────────────────

    /// Clone a subtree with fresh guids and attach the copy directly
    /// above the original. Returns the clone's index.
    pub fn duplicate(&mut self, ix: NodeIx) -> Result<NodeIx, StructuralError> {
        let (_, _) = self.position_of(ix)?;
        let clone = self.clone_subtree_detached(ix);
        self.attach_clone_after(ix, clone);
        Ok(clone)
    }

    fn attach_clone_after(&mut self, original: NodeIx, clone: NodeIx) {
        let (parent, pos) = self
            .position_of(original)
            .expect("original was attached above");
        self.attach_unchecked(parent, clone, Some(pos + 1));
    }

    /// Deep-clone a subtree into detached arena slots, assigning fresh
    /// guids throughout.
    pub(crate) fn clone_subtree_detached(&mut self, ix: NodeIx) -> NodeIx {
        let mut node = self.node(ix).clone();
        node.guid = Guid::fresh(node.kind.guid_prefix());
        node.parent = None;
        node.children.clear();
        node.cache.clear();
        let copy = self.insert_detached(node);

        let children: Vec<NodeIx> = self.node(ix).children.to_vec();
        for child in children {
            let child_copy = self.clone_subtree_detached(child);
            self.node_mut(child_copy).parent = Some(copy);
            self.node_mut(copy).children.push(child_copy);
        }

        // A cloned masked group must point at its own mask copy, not the
        // original's guid.
        if let NodeKind::Group { mask: Some(m) } = self.node(ix).kind
            && let Some(mpos) = self.mask_position(ix, m)
        {
            let fresh = self.node(self.node(copy).children[mpos]).guid;
            if let NodeKind::Group { mask: slot } = &mut self.node_mut(copy).kind {
                *slot = Some(fresh);
            }
        }
        copy
    }

    // ─── Ancestry ────────────────────────────────────────────────────────

    /// Check if `ancestor` is a parent/grandparent/… of `descendant`.
    pub fn is_ancestor_of(&self, ancestor: Guid, descendant: Guid) -> bool {
        match (self.index_of(ancestor), self.index_of(descendant)) {
            (Some(a), Some(d)) => self.is_ancestor_ix(a, d),
            _ => false,
        }
    }

    pub(crate) fn is_ancestor_ix(&self, ancestor: NodeIx, descendant: NodeIx) -> bool {
        let mut current = self.node(descendant).parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.node(p).parent;
        }
        false
    }

    /// Indices of every live node, in slot order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIx> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| NodeIx(i as u32)))
    }

    /// Pre-order traversal of a subtree, the root of the walk included.
    pub fn descendants(&self, ix: NodeIx) -> Vec<NodeIx> {
        let mut out = Vec::new();
        let mut stack = vec![ix];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &c in self.node(n).children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    // ─── Invalidation ────────────────────────────────────────────────────

    /// Invalidate bounds caches after a geometry-affecting mutation to
    /// `ix`: the node and its ancestors lose everything (container bounds
    /// derive from children), the subtree below loses global/draw (it
    /// inherits the node's transform).
    pub(crate) fn mark_dirty(&mut self, ix: NodeIx) {
        self.changed.insert(ix);
        self.node(ix).cache.clear();
        for d in self.descendants(ix) {
            self.node(d).cache.clear_global();
        }
        let mut current = self.node(ix).parent;
        while let Some(p) = current {
            self.node(p).cache.clear();
            current = self.node(p).parent;
        }
    }

    /// Drain the set of nodes touched since the last containment pass.
    pub(crate) fn take_changed(&mut self) -> Vec<NodeIx> {
        let mut out: Vec<NodeIx> = self.changed.drain().collect();
        out.sort();
        out
    }

    fn check_container(&self, ix: NodeIx) -> Result<(), StructuralError> {
        if self.node(ix).is_container() {
            Ok(())
        } else {
            Err(StructuralError::NotAContainer {
                target: self.node(ix).guid,
            })
        }
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}
