//! pyscry analyzes Python source without running it: it parses modules
//! into typed arena trees, records scopes and binding occurrences, and
//! lazily infers the possible values of expressions.
//!
//! The pieces, bottom to top:
//!
//! * [`builder`] turns source text or files into [`pyscry_core::Module`]
//!   trees, computing line spans and symbol tables;
//! * [`manager`] is the explicit analysis environment: module resolution,
//!   caching, transforms, extenders and failed-import hooks;
//! * [`runtime`] + [`synth`] describe introspected object graphs and
//!   synthesize stub source for modules that have no Python source;
//! * [`infer`] answers "what can this expression be", multi-valued and
//!   cycle-guarded, with [`mro`] supplying class linearization.
//!
//! ```no_run
//! use pyscry::{InferenceEngine, Manager};
//! use pyscry::test_support::{find_name, node_ref};
//!
//! let mut manager = Manager::new();
//! let module = manager.build_from_text("x = 1 + 2\nx\n", "demo")?;
//! let x = node_ref(&module, find_name(&module, "x").unwrap());
//! for candidate in InferenceEngine::new(&mut manager).infer(&x) {
//!     println!("{candidate:?}");
//! }
//! # Ok::<(), pyscry::BuildingError>(())
//! ```

pub mod builder;
pub mod infer;
pub mod manager;
pub mod mro;
pub mod runtime;
pub mod synth;
pub mod test_support;

pub use builder::{build_from_path, build_from_text, BuildError, SyntaxError};
pub use infer::{
    lookup_name, AttributePrecedence, Candidate, InferenceContext, InferenceEngine,
    InferenceError, Inferred, NodeRef,
};
pub use manager::{BuildingError, Manager};
pub use mro::{method_resolution_order, MroError, MroPolicy};
pub use runtime::{RuntimeClass, RuntimeMember, RuntimeModule, RuntimeValue};
pub use synth::{modules_stub, SynthError};

// The data model is a separate crate; re-export the common types so most
// users only import `pyscry`.
pub use pyscry_core::{
    BinaryOp, BoolOpKind, CompareOp, ConstValue, ImportAlias, LookupError, LookupResult, Module,
    ModuleOrigin, Node, NodeId, NodeKind, NodeTag, ScopeInfo, Span, Tree, UnaryOpKind,
};
