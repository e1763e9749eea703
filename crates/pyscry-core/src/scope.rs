//! Per-scope symbol tables.
//!
//! Every scope node (module, class, function, lambda, comprehension) owns a
//! [`ScopeInfo`]. Tables map a name to the *ordered* list of binding
//! occurrences: a name bound in two branches keeps both occurrences, in
//! left-to-right top-to-bottom source order, and all of them are reachable
//! by inference.
//!
//! Class scopes additionally carry an instance-attribute table for
//! `self.<name> = …` assignments found in their methods. The table lives
//! only on class scopes; built-in/immutable values have no [`ScopeInfo`]
//! at all, so over-approximate receiver inference can never pollute them.

use std::collections::{HashMap, HashSet};

use crate::errors::{LookupError, LookupResult};
use crate::tree::NodeId;

/// Symbol table of one scope node.
#[derive(Debug, Clone, Default)]
pub struct ScopeInfo {
    locals: HashMap<String, Vec<NodeId>>,
    instance_attrs: HashMap<String, Vec<NodeId>>,
    global_names: HashSet<String>,
    /// Human-readable scope description used in error messages.
    describe: String,
}

impl ScopeInfo {
    pub fn new(describe: impl Into<String>) -> Self {
        ScopeInfo {
            describe: describe.into(),
            ..ScopeInfo::default()
        }
    }

    /// Record a binding occurrence for `name`. Occurrences accumulate in
    /// insertion order; the builder calls this in source order.
    pub fn add_local(&mut self, name: impl Into<String>, binding: NodeId) {
        self.locals.entry(name.into()).or_default().push(binding);
    }

    /// All binding occurrences of `name`, in insertion order.
    pub fn locals(&self, name: &str) -> LookupResult<&[NodeId]> {
        match self.locals.get(name) {
            Some(bindings) => Ok(bindings),
            None => Err(LookupError::NotBound {
                name: name.to_string(),
                scope: self.describe.clone(),
            }),
        }
    }

    /// Non-failing variant of [`ScopeInfo::locals`].
    pub fn get_local(&self, name: &str) -> Option<&[NodeId]> {
        self.locals.get(name).map(Vec::as_slice)
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    /// Names bound in this scope, sorted for stable iteration.
    pub fn local_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.locals.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Record an instance attribute binding (`self.<name> = …`).
    pub fn add_instance_attr(&mut self, name: impl Into<String>, binding: NodeId) {
        self.instance_attrs
            .entry(name.into())
            .or_default()
            .push(binding);
    }

    pub fn instance_attr(&self, name: &str) -> Option<&[NodeId]> {
        self.instance_attrs.get(name).map(Vec::as_slice)
    }

    pub fn has_instance_attr(&self, name: &str) -> bool {
        self.instance_attrs.contains_key(name)
    }

    /// Mark `name` as declared `global` in this (function) scope. Bindings
    /// processed after this point are attributed to the module scope.
    pub fn declare_global(&mut self, name: impl Into<String>) {
        self.global_names.insert(name.into());
    }

    pub fn is_declared_global(&self, name: &str) -> bool {
        self.global_names.contains(name)
    }

    pub fn describe(&self) -> &str {
        &self.describe
    }

    /// Iterate `(name, bindings)` pairs in unspecified order.
    pub fn iter_locals(&self) -> impl Iterator<Item = (&str, &[NodeId])> {
        self.locals
            .iter()
            .map(|(name, bindings)| (name.as_str(), bindings.as_slice()))
    }

    /// Rewrite every stored [`NodeId`] through `map`. Used when a scope is
    /// copied between trees and the arena indices shift.
    pub fn remap(&mut self, map: &impl Fn(NodeId) -> NodeId) {
        for bindings in self.locals.values_mut().chain(self.instance_attrs.values_mut()) {
            for binding in bindings {
                *binding = map(*binding);
            }
        }
    }
}
