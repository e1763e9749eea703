//! Module representation: a named root scope plus its tree.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::errors::LookupResult;
use crate::scope::ScopeInfo;
use crate::tree::{NodeId, Tree};

/// Where a module's tree came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Built from in-memory source text.
    Text,
    /// Built from a file on disk.
    File(PathBuf),
    /// Synthesized from live-object introspection (no analyzable source).
    Introspection,
}

/// A built module: qualified name, package flag, origin, the `__future__`
/// features it activates, and the tree whose root is the module scope.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    /// True when the module represents a directory package (`__init__`).
    pub package: bool,
    pub origin: ModuleOrigin,
    /// Feature names activated via `from __future__ import …`.
    pub future_features: HashSet<String>,
    pub tree: Tree,
}

impl Module {
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Top-level statements of the module body.
    pub fn body(&self) -> &[NodeId] {
        self.tree.children(self.root())
    }

    fn root_scope(&self) -> &ScopeInfo {
        self.tree
            .scope_info(self.root())
            .expect("module root always has a scope")
    }

    /// All binding occurrences of `name` in the module scope, in source
    /// order.
    pub fn locals(&self, name: &str) -> LookupResult<&[NodeId]> {
        self.root_scope().locals(name)
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.root_scope().has_local(name)
    }

    /// Names bound at module level, sorted.
    pub fn local_names(&self) -> Vec<&str> {
        self.root_scope().local_names()
    }
}
