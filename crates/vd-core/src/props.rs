//! Settable node properties.
//!
//! [`PropEdit`] is the closed mutation vocabulary consumed by the
//! document layer: one payload per settable property. It is also the
//! unit of instance sync — propagation and override keying both work on
//! the edit's [`PropKind`].

use crate::model::{NodeIx, NodeKind, Paint, Shadow, Stroke};
use crate::tree::NodeTree;
use serde::{Deserialize, Serialize};

/// A single property assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropEdit {
    Fill(Option<Paint>),
    Stroke(Option<Stroke>),
    Shadow(Option<Shadow>),
    Blur(f64),
    Opacity(f64),
    Visible(bool),
    Name(String),
    TextContent(String),
    CornerRadius(f64),
}

/// Property identity, independent of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropKind {
    Fill,
    Stroke,
    Shadow,
    Blur,
    Opacity,
    Visible,
    Name,
    TextContent,
    CornerRadius,
}

impl PropKind {
    /// Properties that may carry a per-instance override.
    pub fn overridable(self) -> bool {
        matches!(self, PropKind::Fill | PropKind::TextContent | PropKind::Visible)
    }

    pub fn name(self) -> &'static str {
        match self {
            PropKind::Fill => "fill",
            PropKind::Stroke => "stroke",
            PropKind::Shadow => "shadow",
            PropKind::Blur => "blur",
            PropKind::Opacity => "opacity",
            PropKind::Visible => "visible",
            PropKind::Name => "name",
            PropKind::TextContent => "text-content",
            PropKind::CornerRadius => "corner-radius",
        }
    }
}

impl PropEdit {
    pub fn kind(&self) -> PropKind {
        match self {
            PropEdit::Fill(_) => PropKind::Fill,
            PropEdit::Stroke(_) => PropKind::Stroke,
            PropEdit::Shadow(_) => PropKind::Shadow,
            PropEdit::Blur(_) => PropKind::Blur,
            PropEdit::Opacity(_) => PropKind::Opacity,
            PropEdit::Visible(_) => PropKind::Visible,
            PropEdit::Name(_) => PropKind::Name,
            PropEdit::TextContent(_) => PropKind::TextContent,
            PropEdit::CornerRadius(_) => PropKind::CornerRadius,
        }
    }
}

/// Write an edit onto a node, invalidating bounds where the property is
/// geometry- or paint-extent-affecting.
pub(crate) fn apply_edit(tree: &mut NodeTree, ix: NodeIx, edit: &PropEdit) {
    let mut geometry_affecting = false;
    {
        let node = tree.node_mut(ix);
        match edit {
            PropEdit::Fill(p) => node.style.fill = p.clone(),
            PropEdit::Stroke(s) => {
                node.style.stroke = s.clone();
                geometry_affecting = true; // outer stroke dilates draw bounds
            }
            PropEdit::Shadow(s) => {
                node.style.shadow = *s;
                geometry_affecting = true;
            }
            PropEdit::Blur(b) => {
                node.style.blur = b.max(0.0);
                geometry_affecting = true;
            }
            PropEdit::Opacity(o) => node.opacity = o.clamp(0.0, 1.0),
            PropEdit::Visible(v) => node.visible = *v,
            PropEdit::Name(n) => node.name = n.clone(),
            PropEdit::TextContent(content) => {
                if let NodeKind::Text { content: c, .. } = &mut node.kind {
                    *c = content.clone();
                    geometry_affecting = true; // metric estimate tracks length
                }
            }
            PropEdit::CornerRadius(r) => {
                if let NodeKind::Rectangle { corner_radius, .. } = &mut node.kind {
                    *corner_radius = r.max(0.0);
                    geometry_affecting = true; // outline feeds boolean parents
                }
            }
        }
    }
    if geometry_affecting {
        tree.mark_dirty(ix);
    }
}

/// Read the current value of a property off a node, as an edit that
/// would reproduce it. Used to revert cleared overrides to canonical.
pub(crate) fn read_prop(tree: &NodeTree, ix: NodeIx, kind: PropKind) -> PropEdit {
    let node = tree.node(ix);
    match kind {
        PropKind::Fill => PropEdit::Fill(node.style.fill.clone()),
        PropKind::Stroke => PropEdit::Stroke(node.style.stroke.clone()),
        PropKind::Shadow => PropEdit::Shadow(node.style.shadow),
        PropKind::Blur => PropEdit::Blur(node.style.blur),
        PropKind::Opacity => PropEdit::Opacity(node.opacity),
        PropKind::Visible => PropEdit::Visible(node.visible),
        PropKind::Name => PropEdit::Name(node.name.clone()),
        PropKind::TextContent => match &node.kind {
            NodeKind::Text { content, .. } => PropEdit::TextContent(content.clone()),
            _ => PropEdit::TextContent(String::new()),
        },
        PropKind::CornerRadius => match &node.kind {
            NodeKind::Rectangle { corner_radius, .. } => PropEdit::CornerRadius(*corner_radius),
            _ => PropEdit::CornerRadius(0.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::model::{Color, Node};

    #[test]
    fn opacity_clamps() {
        let mut tree = NodeTree::new();
        let ix = tree
            .add_child(
                tree.root(),
                Node::new(NodeKind::Rectangle {
                    width: 10.0,
                    height: 10.0,
                    corner_radius: 0.0,
                }),
                None,
            )
            .unwrap();
        apply_edit(&mut tree, ix, &PropEdit::Opacity(3.0));
        assert_eq!(tree.node(ix).opacity, 1.0);
        apply_edit(&mut tree, ix, &PropEdit::Opacity(-0.5));
        assert_eq!(tree.node(ix).opacity, 0.0);
    }

    #[test]
    fn read_back_matches_applied() {
        let mut tree = NodeTree::new();
        let ix = tree
            .add_child(
                tree.root(),
                Node::new(NodeKind::Text {
                    content: "hi".into(),
                    font_size: 14.0,
                }),
                None,
            )
            .unwrap();
        let edit = PropEdit::Fill(Some(Paint::Solid(Color::BLACK)));
        apply_edit(&mut tree, ix, &edit);
        assert_eq!(read_prop(&tree, ix, PropKind::Fill), edit);

        let text = PropEdit::TextContent("hello".into());
        apply_edit(&mut tree, ix, &text);
        assert_eq!(read_prop(&tree, ix, PropKind::TextContent), text);
    }
}
