//! Helpers for locating nodes in built trees.
//!
//! Mostly used by tests, which need to say "the last `x` in this snippet"
//! without threading ids through by hand.

use std::rc::Rc;

use pyscry_core::{Module, NodeId, NodeKind};

use crate::infer::NodeRef;

pub fn node_ref(module: &Rc<Module>, id: NodeId) -> NodeRef {
    NodeRef::new(Rc::clone(module), id)
}

/// The last load-position occurrence of `name`.
pub fn find_name(module: &Module, name: &str) -> Option<NodeId> {
    module
        .tree
        .ids()
        .filter(|&id| matches!(module.tree.kind(id), NodeKind::Name { name: n } if n == name))
        .last()
}

pub fn find_function(module: &Module, name: &str) -> Option<NodeId> {
    module.tree.ids().find(|&id| {
        matches!(module.tree.kind(id), NodeKind::FunctionDef { name: n, .. } if n == name)
    })
}

pub fn find_class(module: &Module, name: &str) -> Option<NodeId> {
    module.tree.ids().find(|&id| {
        matches!(module.tree.kind(id), NodeKind::ClassDef { name: n, .. } if n == name)
    })
}

/// The first call expression in the module.
pub fn find_call(module: &Module) -> Option<NodeId> {
    module
        .tree
        .ids()
        .find(|&id| matches!(module.tree.kind(id), NodeKind::Call { .. }))
}
