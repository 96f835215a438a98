//! Repeat-grid cell management.
//!
//! A repeat grid owns a row-major list of cell subtrees. The manager
//! derives the live cell count from the grid extent, padding, and cell
//! size, destroys surplus cells, clones missing ones from the nearest
//! existing cell (inheriting its overrides), and re-flows cell
//! positions. A trailing cell that only partially fits the extent is
//! kept and clipped to the grid's own mask bounds, never destroyed.

use crate::model::{NodeIx, NodeKind, RepeatGridSpec};
use crate::sync::InstanceSyncEngine;
use crate::tree::NodeTree;
use log::debug;

/// Settle every repeat grid in the document: recompute cell size from
/// live content, reconcile the cell count, and re-flow positions. Runs
/// once per committed transaction.
pub(crate) fn settle_all(tree: &mut NodeTree, sync: &mut InstanceSyncEngine) {
    let grids: Vec<NodeIx> = tree
        .indices()
        .filter(|&n| matches!(tree.node(n).kind, NodeKind::RepeatGrid { .. }))
        .collect();
    for grid in grids {
        refresh_cell_size(tree, grid);
        reconcile(tree, sync, grid);
    }
}

fn spec_of(tree: &NodeTree, grid: NodeIx) -> RepeatGridSpec {
    match tree.node(grid).kind {
        NodeKind::RepeatGrid { grid: spec } => spec,
        _ => unreachable!("settle_all only visits repeat grids"),
    }
}

/// `cell_size` is the componentwise max over all live cells' content
/// bounds. Declared values stand in while the grid has no measurable
/// content.
fn refresh_cell_size(tree: &mut NodeTree, grid: NodeIx) {
    let cells: Vec<NodeIx> = tree.children(grid).to_vec();
    if cells.is_empty() {
        return;
    }
    let mut w = 0.0f64;
    let mut h = 0.0f64;
    for &c in &cells {
        let b = tree.local_bounds(c);
        w = w.max(b.width());
        h = h.max(b.height());
    }
    if w <= 0.0 || h <= 0.0 {
        return;
    }
    let spec = spec_of(tree, grid);
    if (spec.cell_width - w).abs() > 1e-9 || (spec.cell_height - h).abs() > 1e-9 {
        if let NodeKind::RepeatGrid { grid: s } = &mut tree.node_mut(grid).kind {
            s.cell_width = w;
            s.cell_height = h;
        }
        tree.mark_dirty(grid);
    }
}

/// Bring the live cell list up to `columns × rows` and re-flow.
fn reconcile(tree: &mut NodeTree, sync: &mut InstanceSyncEngine, grid: NodeIx) {
    let spec = spec_of(tree, grid);
    let target = spec.columns() * spec.rows();
    let cells: Vec<NodeIx> = tree.children(grid).to_vec();

    if cells.is_empty() {
        return; // no template to clone from yet
    }

    if cells.len() > target {
        debug!("grid {}: destroying {} surplus cells", tree.node(grid).guid, cells.len() - target);
        for &c in &cells[target..] {
            let guid = tree.node(c).guid;
            sync.drop_instance(guid);
            let _ = tree.destroy(c);
        }
    }

    while tree.children(grid).len() < target {
        // Nearest existing cell in canonical position donates content
        // and overrides.
        let Some(&donor) = tree.children(grid).last() else {
            break;
        };
        let donor_guid = tree.node(donor).guid;
        let clone = tree.clone_subtree_detached(donor);
        if tree.attach(grid, clone, None).is_err() {
            break;
        }
        sync.inherit_overrides(donor_guid, tree.node(clone).guid);
    }

    reflow(tree, grid);
}

/// Place cell i at (col·(cw+px), row·(ch+py)), row-major.
fn reflow(tree: &mut NodeTree, grid: NodeIx) {
    let spec = spec_of(tree, grid);
    let cols = spec.columns();
    let cells: Vec<NodeIx> = tree.children(grid).to_vec();
    for (i, &cell) in cells.iter().enumerate() {
        let col = (i % cols) as f64;
        let row = (i / cols) as f64;
        tree.place_in_parent(
            cell,
            col * (spec.cell_width + spec.padding_x),
            row * (spec.cell_height + spec.padding_y),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::model::Node;

    fn grid_node(w: f64, h: f64, pad: f64, cell: f64) -> Node {
        Node::new(NodeKind::RepeatGrid {
            grid: RepeatGridSpec {
                width: w,
                height: h,
                padding_x: pad,
                padding_y: pad,
                cell_width: cell,
                cell_height: cell,
            },
        })
    }

    fn cell_with_rect(tree: &mut NodeTree, grid: NodeIx, size: f64) -> NodeIx {
        let cell = tree
            .add_child(grid, Node::new(NodeKind::Group { mask: None }), None)
            .unwrap();
        tree.add_child(
            cell,
            Node::new(NodeKind::Rectangle {
                width: size,
                height: size,
                corner_radius: 0.0,
            }),
            None,
        )
        .unwrap();
        cell
    }

    #[test]
    fn settle_fills_grid_to_cols_times_rows() {
        let mut tree = NodeTree::new();
        let mut sync = InstanceSyncEngine::new();
        let grid = tree
            .add_child(tree.root(), grid_node(500.0, 300.0, 10.0, 100.0), None)
            .unwrap();
        cell_with_rect(&mut tree, grid, 100.0);

        settle_all(&mut tree, &mut sync);
        // 4 columns × 2 rows
        assert_eq!(tree.children(grid).len(), 8);
    }

    #[test]
    fn shrinking_destroys_surplus_cells() {
        let mut tree = NodeTree::new();
        let mut sync = InstanceSyncEngine::new();
        let grid = tree
            .add_child(tree.root(), grid_node(500.0, 300.0, 10.0, 100.0), None)
            .unwrap();
        cell_with_rect(&mut tree, grid, 100.0);
        settle_all(&mut tree, &mut sync);
        assert_eq!(tree.children(grid).len(), 8);

        tree.resize(grid, 210.0, 100.0).unwrap();
        settle_all(&mut tree, &mut sync);
        // floor(220/110) = 2 columns × 1 row
        assert_eq!(tree.children(grid).len(), 2);
    }

    #[test]
    fn cells_flow_row_major_with_padding() {
        let mut tree = NodeTree::new();
        let mut sync = InstanceSyncEngine::new();
        let grid = tree
            .add_child(tree.root(), grid_node(230.0, 230.0, 10.0, 100.0), None)
            .unwrap();
        cell_with_rect(&mut tree, grid, 100.0);
        settle_all(&mut tree, &mut sync);

        let cells: Vec<NodeIx> = tree.children(grid).to_vec();
        assert_eq!(cells.len(), 4);
        let t = tree.node(cells[3]).transform();
        assert_eq!((t.tx, t.ty), (110.0, 110.0));
    }

    #[test]
    fn cell_size_tracks_content_growth() {
        let mut tree = NodeTree::new();
        let mut sync = InstanceSyncEngine::new();
        let grid = tree
            .add_child(tree.root(), grid_node(500.0, 300.0, 10.0, 100.0), None)
            .unwrap();
        let cell = cell_with_rect(&mut tree, grid, 100.0);
        settle_all(&mut tree, &mut sync);
        assert_eq!(tree.children(grid).len(), 8);

        // Growing one cell's content grows cell_size, shrinking the count.
        let rect = tree.children(cell)[0];
        tree.resize(rect, 150.0, 100.0).unwrap();
        settle_all(&mut tree, &mut sync);

        let spec = spec_of(&tree, grid);
        assert_eq!(spec.cell_width, 150.0);
        // floor(510/160) = 3 columns × 2 rows
        assert_eq!(tree.children(grid).len(), 6);
    }

    #[test]
    fn empty_grid_is_left_alone() {
        let mut tree = NodeTree::new();
        let mut sync = InstanceSyncEngine::new();
        let grid = tree
            .add_child(tree.root(), grid_node(500.0, 300.0, 10.0, 100.0), None)
            .unwrap();
        settle_all(&mut tree, &mut sync);
        assert!(tree.children(grid).is_empty());
    }
}
