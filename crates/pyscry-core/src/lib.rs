//! Core data model for pyscry: the arena syntax tree, node kinds, spans,
//! scopes/symbol tables, and the module type.
//!
//! This crate is the dependency-free leaf of the workspace; parsing,
//! registries and inference live in the `pyscry` crate.

pub mod errors;
pub mod module;
pub mod nodes;
pub mod scope;
pub mod tree;

pub use errors::{LookupError, LookupResult};
pub use module::{Module, ModuleOrigin};
pub use nodes::{
    BinaryOp, BoolOpKind, CompareOp, ConstValue, ImportAlias, NodeKind, NodeTag, UnaryOpKind,
};
pub use scope::ScopeInfo;
pub use tree::{Node, NodeId, Span, Tree};
