//! Arena-backed syntax tree.
//!
//! Nodes live in a flat `Vec` and address each other with [`NodeId`]
//! indices. A node's parent is a back-index rather than an owning
//! reference, which keeps the graph acyclic while preserving O(1) ancestor
//! walks. The parent link is assigned exactly once, at attach time.
//!
//! # Spans
//!
//! Spans are 1-based line ranges. The root module node starts at line 0.
//! A node's span contains the spans of all of its children, with one
//! documented exception: the decorator list of a decorated definition sits
//! *before* the definition's own span (the definition starts on its
//! `def`/`class` line).

use crate::nodes::{NodeKind, NodeTag};
use crate::scope::ScopeInfo;

// ============================================================================
// Ids and spans
// ============================================================================

/// Stable index of a node within its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Line span of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First line, 1-based (0 for the root module node).
    pub from_line: u32,
    /// Last line, inclusive.
    pub to_line: u32,
    /// For compound statements: the line on which the block header ends
    /// (the colon line), e.g. the last base of a multi-line class header.
    pub block_start_line: Option<u32>,
}

impl Span {
    pub fn lines(from_line: u32, to_line: u32) -> Self {
        Span {
            from_line,
            to_line,
            block_start_line: None,
        }
    }

    pub fn with_block_start(mut self, line: u32) -> Self {
        self.block_start_line = Some(line);
        self
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.from_line <= other.from_line && other.to_line <= self.to_line
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// One tree element: kind, span, ownership links, and (for scope kinds)
/// the symbol table.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    scope: Option<Box<ScopeInfo>>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn tag(&self) -> NodeTag {
        self.kind.tag()
    }

    pub fn scope_info(&self) -> Option<&ScopeInfo> {
        self.scope.as_deref()
    }

    pub fn scope_info_mut(&mut self) -> Option<&mut ScopeInfo> {
        self.scope.as_deref_mut()
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Arena of nodes. The node created first is the root.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The root node id. Panics on an empty tree; builders always create
    /// the module node first.
    pub fn root(&self) -> NodeId {
        debug_assert!(!self.nodes.is_empty(), "tree has no root");
        NodeId(0)
    }

    /// Append a node and attach it to `parent` (appended to the parent's
    /// ordered child list). The parent link is never reassigned.
    pub fn add(&mut self, kind: NodeKind, span: Span, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            span,
            parent,
            children: Vec::new(),
            scope: None,
        });
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// All ids in creation order (roughly pre-order for builder output).
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Give `id` a fresh symbol table. Called once per scope node.
    pub fn init_scope(&mut self, id: NodeId, describe: impl Into<String>) {
        debug_assert!(self.nodes[id.index()].tag().is_scope());
        self.nodes[id.index()].scope = Some(Box::new(ScopeInfo::new(describe)));
    }

    pub fn scope_info(&self, id: NodeId) -> Option<&ScopeInfo> {
        self.nodes[id.index()].scope.as_deref()
    }

    pub fn scope_info_mut(&mut self, id: NodeId) -> Option<&mut ScopeInfo> {
        self.nodes[id.index()].scope.as_deref_mut()
    }

    // ------------------------------------------------------------------
    // Ancestor and scope walks
    // ------------------------------------------------------------------

    /// Walk from the parent of `id` up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = self.parent(id);
        std::iter::from_fn(move || {
            let next = current?;
            current = self.parent(next);
            Some(next)
        })
    }

    /// The nearest scope node containing `id` (including `id` itself when
    /// it is a scope).
    pub fn scope_of(&self, id: NodeId) -> NodeId {
        if self.node(id).tag().is_scope() {
            return id;
        }
        self.enclosing_scope(id)
    }

    /// The nearest scope node strictly above `id`.
    pub fn enclosing_scope(&self, id: NodeId) -> NodeId {
        for ancestor in self.ancestors(id) {
            if self.node(ancestor).tag().is_scope() {
                return ancestor;
            }
        }
        self.root()
    }

    /// The nearest frame (module/class/function) containing `id`,
    /// including `id` itself.
    pub fn frame_of(&self, id: NodeId) -> NodeId {
        if self.node(id).tag().is_frame() {
            return id;
        }
        for ancestor in self.ancestors(id) {
            if self.node(ancestor).tag().is_frame() {
                return ancestor;
            }
        }
        self.root()
    }

    // ------------------------------------------------------------------
    // Span maintenance
    // ------------------------------------------------------------------

    /// Extend `id`'s `to_line` to cover its children (trailing `else` /
    /// `except` / `finally` clauses included, since those are children).
    /// Decorator-list children are skipped; they sit outside the span.
    pub fn widen_from_children(&mut self, id: NodeId) {
        let mut to_line = self.span(id).to_line;
        for &child in self.children(id) {
            if matches!(self.kind(child), NodeKind::Decorators { .. }) {
                continue;
            }
            to_line = to_line.max(self.span(child).to_line);
        }
        self.nodes[id.index()].span.to_line = to_line;
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Pre-order visit of the subtree rooted at `id`.
    pub fn visit(&self, id: NodeId, f: &mut impl FnMut(NodeId)) {
        f(id);
        // children() borrows self, so clone the small id list
        let children = self.children(id).to_vec();
        for child in children {
            self.visit(child, f);
        }
    }

    /// Post-order ids of the subtree rooted at `id` (children first, the
    /// order transforms are applied in).
    pub fn postorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.postorder_into(id, &mut out);
        out
    }

    fn postorder_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(id) {
            self.postorder_into(child, out);
        }
        out.push(id);
    }

    // ------------------------------------------------------------------
    // Grafting
    // ------------------------------------------------------------------

    /// Copy every top-level subtree of `other` (the children of its root)
    /// into this tree, attached under `under`. All internal [`NodeId`]
    /// references are remapped. Returns the new ids of the copied
    /// top-level nodes.
    ///
    /// Used to inject synthetic declarations parsed from a snippet into an
    /// already-built module; the grafted nodes keep their snippet-relative
    /// line numbers.
    pub fn graft(&mut self, other: &Tree, under: NodeId) -> Vec<NodeId> {
        if other.is_empty() {
            return Vec::new();
        }
        let offset = self.nodes.len() as u32;
        let other_root = other.root();
        // Root is not copied; every other node shifts by (offset - 1).
        let map = |id: NodeId| -> NodeId {
            debug_assert!(id != other_root, "grafted subtrees never reference the root");
            NodeId(id.0 - 1 + offset)
        };
        for id in other.ids() {
            if id == other_root {
                continue;
            }
            let mut node = other.node(id).clone();
            node.kind.remap(&map);
            if let Some(scope) = node.scope.as_deref_mut() {
                scope.remap(&map);
            }
            node.parent = match node.parent {
                Some(p) if p == other_root => Some(under),
                Some(p) => Some(map(p)),
                None => Some(under),
            };
            for child in &mut node.children {
                *child = map(*child);
            }
            self.nodes.push(node);
        }
        let tops: Vec<NodeId> = other.children(other_root).iter().map(|&c| map(c)).collect();
        for &top in &tops {
            self.nodes[under.index()].children.push(top);
        }
        // Bindings recorded on the donor root move to the receiving scope,
        // appended after any existing occurrences of the same name.
        if let Some(donor_scope) = other.scope_info(other_root) {
            let mapped: Vec<(String, Vec<NodeId>)> = donor_scope
                .iter_locals()
                .map(|(name, bindings)| {
                    (
                        name.to_string(),
                        bindings.iter().map(|&b| map(b)).collect(),
                    )
                })
                .collect();
            if let Some(scope) = self.nodes[under.index()].scope.as_deref_mut() {
                for (name, bindings) in mapped {
                    for binding in bindings {
                        scope.add_local(name.clone(), binding);
                    }
                }
            }
        }
        tops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::ConstValue;

    fn leaf(value: i64) -> NodeKind {
        NodeKind::Const {
            value: ConstValue::Int(value),
        }
    }

    #[test]
    fn parent_links_are_set_on_attach() {
        let mut tree = Tree::new();
        let root = tree.add(
            NodeKind::Module { name: "m".into() },
            Span::lines(0, 3),
            None,
        );
        let child = tree.add(leaf(1), Span::lines(1, 1), Some(root));
        assert_eq!(tree.parent(child), Some(root));
        assert_eq!(tree.children(root), &[child]);
        assert_eq!(tree.parent(root), None);
    }

    #[test]
    fn widen_covers_trailing_children() {
        let mut tree = Tree::new();
        let root = tree.add(
            NodeKind::Module { name: "m".into() },
            Span::lines(0, 1),
            None,
        );
        tree.add(leaf(1), Span::lines(1, 1), Some(root));
        tree.add(leaf(2), Span::lines(4, 6), Some(root));
        tree.widen_from_children(root);
        assert_eq!(tree.span(root).to_line, 6);
        assert!(tree.span(root).contains(&Span::lines(4, 6)));
    }

    #[test]
    fn scope_walks_find_nearest_scope() {
        let mut tree = Tree::new();
        let root = tree.add(
            NodeKind::Module { name: "m".into() },
            Span::lines(0, 5),
            None,
        );
        tree.init_scope(root, "module 'm'");
        let func = tree.add(
            NodeKind::FunctionDef {
                name: "f".into(),
                params: vec![],
                body: vec![],
                decorators: None,
                returns: None,
                is_async: false,
            },
            Span::lines(1, 3),
            Some(root),
        );
        tree.init_scope(func, "function 'f'");
        let name = tree.add(
            NodeKind::Name { name: "x".into() },
            Span::lines(2, 2),
            Some(func),
        );
        assert_eq!(tree.scope_of(name), func);
        assert_eq!(tree.scope_of(func), func);
        assert_eq!(tree.enclosing_scope(func), root);
        assert_eq!(tree.frame_of(name), func);
    }

    #[test]
    fn graft_remaps_ids_and_parents() {
        let mut host = Tree::new();
        let root = host.add(
            NodeKind::Module { name: "m".into() },
            Span::lines(0, 2),
            None,
        );
        host.add(leaf(1), Span::lines(1, 1), Some(root));

        let mut donor = Tree::new();
        let droot = donor.add(
            NodeKind::Module { name: "d".into() },
            Span::lines(0, 2),
            None,
        );
        let value = donor.add(leaf(9), Span::lines(1, 1), Some(droot));
        let assign = donor.add(
            NodeKind::Assign {
                targets: vec![],
                value,
            },
            Span::lines(1, 1),
            Some(droot),
        );
        let target = donor.add(NodeKind::AssignName { name: "x".into() }, Span::lines(1, 1), Some(assign));
        if let NodeKind::Assign { targets, .. } = &mut donor.node_mut(assign).kind {
            targets.push(target);
        }

        let tops = host.graft(&donor, root);
        assert_eq!(tops.len(), 2);
        for &top in &tops {
            assert_eq!(host.parent(top), Some(root));
        }
        // the Assign's value slot must point at the copied Const
        let copied_assign = tops[1];
        match host.kind(copied_assign) {
            NodeKind::Assign { value, targets } => {
                assert!(matches!(
                    host.kind(*value),
                    NodeKind::Const {
                        value: ConstValue::Int(9)
                    }
                ));
                assert_eq!(targets.len(), 1);
                assert_eq!(host.parent(targets[0]), Some(copied_assign));
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }
}
