//! Value inference.
//!
//! Inference asks "what could this expression evaluate to" and answers
//! with a *set* of candidates: every binding of a name contributes,
//! control flow is not narrowed, and anything outside the model collapses
//! to the [`Candidate::Uninferable`] sentinel rather than an error.
//!
//! Evaluation is lazy and cycle-guarded: an [`InferenceContext`] records
//! every `(node, attribute)` pair visited on the current path, and
//! re-entering one yields no candidates instead of recursing. An empty
//! result surfaces as a single sentinel at the public API, so callers can
//! always iterate.
//!
//! The engine borrows the [`Manager`] mutably because resolving an import
//! may build (and cache) further modules on demand.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use thiserror::Error;
use tracing::trace;

use pyscry_core::{
    BinaryOp, ConstValue, ImportAlias, LookupError, LookupResult, Module, NodeId, NodeKind,
    NodeTag, UnaryOpKind,
};

use crate::manager::Manager;
use crate::mro::{self, MroError, MroPolicy};

// ============================================================================
// References and candidates
// ============================================================================

/// A node addressed across module boundaries: the owning module plus the
/// arena id. Identity is by module identity and id, not tree equality.
#[derive(Clone)]
pub struct NodeRef {
    pub module: Rc<Module>,
    pub id: NodeId,
}

impl NodeRef {
    pub fn new(module: Rc<Module>, id: NodeId) -> Self {
        NodeRef { module, id }
    }

    pub fn kind(&self) -> &NodeKind {
        self.module.tree.kind(self.id)
    }

    fn at(&self, id: NodeId) -> NodeRef {
        NodeRef {
            module: Rc::clone(&self.module),
            id,
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.module, &other.module) && self.id == other.id
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.module) as usize).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{:?}", self.module.name, self.module.tree.kind(self.id).tag())
    }
}

/// One possible value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    /// A definition or literal container node (class, function, module,
    /// tuple, …) standing for itself.
    Node(NodeRef),
    /// An instance of the referenced class definition.
    Instance(NodeRef),
    /// A concrete constant value.
    Const(ConstValue),
    /// The sentinel: the engine cannot tell. Iteration still works.
    Uninferable,
}

impl Candidate {
    pub fn is_uninferable(&self) -> bool {
        matches!(self, Candidate::Uninferable)
    }

    pub fn as_const(&self) -> Option<&ConstValue> {
        match self {
            Candidate::Const(value) => Some(value),
            _ => None,
        }
    }
}

/// The result of one inference call: an owning iterator over candidates.
#[derive(Debug, Clone)]
pub struct Inferred {
    candidates: Vec<Candidate>,
    at: usize,
}

impl Inferred {
    /// Dedup preserving first-occurrence order; empty becomes the lone
    /// sentinel so iteration always yields something.
    fn from_candidates(candidates: Vec<Candidate>) -> Self {
        let mut unique: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        if unique.is_empty() {
            unique.push(Candidate::Uninferable);
        }
        Inferred {
            candidates: unique,
            at: 0,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// True when no concrete candidate was found.
    pub fn is_uninferable(&self) -> bool {
        self.candidates.iter().all(Candidate::is_uninferable)
    }
}

impl Iterator for Inferred {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let next = self.candidates.get(self.at).cloned();
        self.at += 1;
        next
    }
}

// ============================================================================
// Errors and policy
// ============================================================================

#[derive(Debug, Error)]
pub enum InferenceError {
    /// Every candidate was the sentinel.
    #[error("no definite value could be inferred")]
    NoDefiniteValue,

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Where instance attribute lookup checks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributePrecedence {
    /// Instance attribute tables before class bodies (assignment wins
    /// over the class-level default).
    #[default]
    InstanceFirst,
    /// Class bodies before instance attribute tables.
    ClassFirst,
}

/// Cycle guard: the set of `(module, node, attribute)` steps taken on the
/// current inference path.
#[derive(Debug, Default)]
pub struct InferenceContext {
    visited: HashSet<(usize, u32, Option<String>)>,
}

impl InferenceContext {
    pub fn new() -> Self {
        InferenceContext::default()
    }

    /// Record a step; false means the step is already on the path.
    fn enter(&mut self, node: &NodeRef, attr: Option<&str>) -> bool {
        self.visited.insert(Self::key(node, attr))
    }

    /// Pop a step once its inference has finished, so sibling branches of
    /// the same query can visit the node again.
    fn exit(&mut self, node: &NodeRef, attr: Option<&str>) {
        self.visited.remove(&Self::key(node, attr));
    }

    fn key(node: &NodeRef, attr: Option<&str>) -> (usize, u32, Option<String>) {
        (
            Rc::as_ptr(&node.module) as usize,
            node.id.raw(),
            attr.map(str::to_string),
        )
    }
}

// ============================================================================
// Scoped name lookup
// ============================================================================

/// All binding occurrences of `name` visible from `node`, walking the
/// scope chain outward. Class scopes other than the starting scope are
/// skipped: class-level names are not visible from nested functions.
pub fn lookup_name(node: &NodeRef, name: &str) -> LookupResult<Vec<NodeRef>> {
    let tree = &node.module.tree;
    let mut scope = tree.scope_of(node.id);
    let mut first = true;
    loop {
        let skip = !first && tree.node(scope).tag() == NodeTag::ClassDef;
        if !skip {
            if let Some(bindings) = tree.scope_info(scope).and_then(|info| info.get_local(name)) {
                return Ok(bindings.iter().map(|&b| node.at(b)).collect());
            }
        }
        if scope == tree.root() {
            break;
        }
        first = false;
        scope = tree.enclosing_scope(scope);
    }
    let describe = tree
        .scope_info(tree.scope_of(node.id))
        .map(|info| info.describe().to_string())
        .unwrap_or_default();
    Err(LookupError::NotBound {
        name: name.to_string(),
        scope: describe,
    })
}

// ============================================================================
// Engine
// ============================================================================

pub struct InferenceEngine<'m> {
    manager: &'m mut Manager,
    precedence: AttributePrecedence,
    mro_policy: MroPolicy,
}

impl<'m> InferenceEngine<'m> {
    pub fn new(manager: &'m mut Manager) -> Self {
        InferenceEngine {
            manager,
            precedence: AttributePrecedence::default(),
            mro_policy: MroPolicy::default(),
        }
    }

    pub fn with_precedence(mut self, precedence: AttributePrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_mro_policy(mut self, policy: MroPolicy) -> Self {
        self.mro_policy = policy;
        self
    }

    /// Infer the possible values of `node`. Never empty: a node nothing
    /// is known about yields exactly one sentinel.
    pub fn infer(&mut self, node: &NodeRef) -> Inferred {
        let mut ctx = InferenceContext::new();
        Inferred::from_candidates(self.infer_inner(node, &mut ctx))
    }

    /// The first concrete candidate, or an error when there is none.
    pub fn infer_definite(&mut self, node: &NodeRef) -> Result<Candidate, InferenceError> {
        self.infer(node)
            .find(|c| !c.is_uninferable())
            .ok_or(InferenceError::NoDefiniteValue)
    }

    /// Linearized ancestry of a class definition, the class itself first.
    pub fn class_mro(&mut self, class: &NodeRef) -> Result<Vec<NodeRef>, MroError> {
        let graph = self.class_graph(class);
        let bases_of = |c: &NodeRef| graph.get(c).cloned().unwrap_or_default();
        mro::method_resolution_order(class.clone(), &bases_of, self.mro_policy)
    }

    // ------------------------------------------------------------------
    // Rule dispatch
    // ------------------------------------------------------------------

    fn infer_inner(&mut self, node: &NodeRef, ctx: &mut InferenceContext) -> Vec<Candidate> {
        if !ctx.enter(node, None) {
            trace!(node = ?node, "inference cycle cut");
            return Vec::new();
        }
        let out = self.infer_dispatch(node, ctx);
        ctx.exit(node, None);
        out
    }

    fn infer_dispatch(&mut self, node: &NodeRef, ctx: &mut InferenceContext) -> Vec<Candidate> {
        match node.kind().clone() {
            NodeKind::Const { value } => vec![Candidate::Const(value)],
            NodeKind::Module { .. }
            | NodeKind::ClassDef { .. }
            | NodeKind::FunctionDef { .. }
            | NodeKind::Lambda { .. }
            | NodeKind::Tuple { .. }
            | NodeKind::List { .. }
            | NodeKind::Set { .. }
            | NodeKind::Dict { .. }
            | NodeKind::ListComp { .. }
            | NodeKind::SetComp { .. }
            | NodeKind::DictComp { .. }
            | NodeKind::GeneratorExp { .. } => vec![Candidate::Node(node.clone())],

            NodeKind::Name { name } | NodeKind::AssignName { name } => {
                self.infer_name(node, &name, ctx)
            }
            NodeKind::Attribute { receiver, attr } => {
                self.infer_attribute(&node.at(receiver), &attr, ctx)
            }
            NodeKind::AssignAttr { .. } => self.infer_assigned_value(node, ctx),
            NodeKind::Call { func, .. } => self.infer_call(&node.at(func), ctx),
            NodeKind::BinOp { left, op, right } => {
                self.infer_binop(&node.at(left), op, &node.at(right), ctx)
            }
            NodeKind::UnaryOp { op, operand } => self.infer_unaryop(op, &node.at(operand), ctx),
            NodeKind::BoolOp { values, .. } => {
                // both short-circuit outcomes are possible values
                let mut out = Vec::new();
                for value in values {
                    out.extend(self.infer_inner(&node.at(value), ctx));
                }
                out
            }
            NodeKind::IfExp { body, orelse, .. } => {
                let mut out = self.infer_inner(&node.at(body), ctx);
                out.extend(self.infer_inner(&node.at(orelse), ctx));
                out
            }
            NodeKind::Subscript { value, index } => {
                self.infer_subscript(&node.at(value), &node.at(index), ctx)
            }
            NodeKind::NamedExpr { value, .. } => self.infer_inner(&node.at(value), ctx),
            NodeKind::ExprStmt { value } => self.infer_inner(&node.at(value), ctx),
            NodeKind::Param { default, .. } => match default {
                Some(default) => self.infer_inner(&node.at(default), ctx),
                None => vec![Candidate::Uninferable],
            },
            _ => vec![Candidate::Uninferable],
        }
    }

    // ------------------------------------------------------------------
    // Names and bindings
    // ------------------------------------------------------------------

    fn infer_name(&mut self, node: &NodeRef, name: &str, ctx: &mut InferenceContext) -> Vec<Candidate> {
        let Ok(bindings) = lookup_name(node, name) else {
            return vec![Candidate::Uninferable];
        };
        let mut out = Vec::new();
        for binding in bindings {
            out.extend(self.infer_binding(&binding, name, ctx));
        }
        out
    }

    /// What a single binding occurrence binds `name` to.
    fn infer_binding(
        &mut self,
        binding: &NodeRef,
        name: &str,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        match binding.kind() {
            NodeKind::FunctionDef { .. } | NodeKind::ClassDef { .. } => {
                vec![Candidate::Node(binding.clone())]
            }
            NodeKind::Param { default, .. } => match default {
                Some(default) => self.infer_inner(&binding.at(*default), ctx),
                None => vec![Candidate::Uninferable],
            },
            NodeKind::AssignName { .. } => self.infer_assigned_value(binding, ctx),
            NodeKind::Import { names } => self.infer_import(names.clone(), name),
            NodeKind::ImportFrom {
                module,
                names,
                level,
            } => {
                let (module, names, level) = (module.clone(), names.clone(), *level);
                self.infer_from_import(binding, module, names, level, name, ctx)
            }
            _ => vec![Candidate::Uninferable],
        }
    }

    /// Follow a binding-position node (`AssignName` / `AssignAttr`) to the
    /// value it receives.
    fn infer_assigned_value(&mut self, binding: &NodeRef, ctx: &mut InferenceContext) -> Vec<Candidate> {
        let tree = &binding.module.tree;
        let Some(parent) = tree.parent(binding.id) else {
            return vec![Candidate::Uninferable];
        };
        match tree.kind(parent) {
            NodeKind::Assign { value, .. } => self.infer_inner(&binding.at(*value), ctx),
            NodeKind::AnnAssign { value: Some(value), .. } => {
                self.infer_inner(&binding.at(*value), ctx)
            }
            NodeKind::NamedExpr { value, .. } => self.infer_inner(&binding.at(*value), ctx),
            // one level of tuple/list unpacking against a literal sequence
            NodeKind::Tuple { elts } | NodeKind::List { elts } => {
                let Some(position) = elts.iter().position(|&e| e == binding.id) else {
                    return vec![Candidate::Uninferable];
                };
                let Some(grandparent) = tree.parent(parent) else {
                    return vec![Candidate::Uninferable];
                };
                let NodeKind::Assign { value, .. } = tree.kind(grandparent) else {
                    return vec![Candidate::Uninferable];
                };
                let sources = self.infer_inner(&binding.at(*value), ctx);
                let mut out = Vec::new();
                for source in sources {
                    match source {
                        Candidate::Node(seq) => match seq.kind() {
                            NodeKind::Tuple { elts } | NodeKind::List { elts }
                                if position < elts.len() =>
                            {
                                out.extend(self.infer_inner(&seq.at(elts[position]), ctx));
                            }
                            _ => out.push(Candidate::Uninferable),
                        },
                        _ => out.push(Candidate::Uninferable),
                    }
                }
                out
            }
            _ => vec![Candidate::Uninferable],
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn infer_import(&mut self, names: Vec<ImportAlias>, bound: &str) -> Vec<Candidate> {
        let mut out = Vec::new();
        for alias in &names {
            if alias.bound_name() != bound {
                continue;
            }
            // `import a.b as c` binds the leaf module; `import a.b` binds `a`
            let target = if alias.asname.is_some() {
                alias.name.clone()
            } else {
                alias.bound_name().to_string()
            };
            match self.manager.ast_from_module_name(&target) {
                Ok(module) => {
                    let root = module.root();
                    out.push(Candidate::Node(NodeRef::new(module, root)));
                }
                Err(_) => out.push(Candidate::Uninferable),
            }
        }
        if out.is_empty() {
            out.push(Candidate::Uninferable);
        }
        out
    }

    fn infer_from_import(
        &mut self,
        binding: &NodeRef,
        module: Option<String>,
        names: Vec<ImportAlias>,
        level: u32,
        bound: &str,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        let Some(source_name) = resolve_relative(&binding.module, module.as_deref(), level) else {
            return vec![Candidate::Uninferable];
        };
        let Ok(source) = self.manager.ast_from_module_name(&source_name) else {
            return vec![Candidate::Uninferable];
        };
        let mut out = Vec::new();
        for alias in &names {
            if alias.bound_name() != bound || alias.name == "*" {
                continue;
            }
            if let Ok(bindings) = source.locals(&alias.name) {
                let bindings: Vec<NodeId> = bindings.to_vec();
                for b in bindings {
                    let target = NodeRef::new(Rc::clone(&source), b);
                    out.extend(self.infer_binding(&target, &alias.name, ctx));
                }
            } else if let Ok(submodule) = self
                .manager
                .ast_from_module_name(&format!("{source_name}.{}", alias.name))
            {
                let root = submodule.root();
                out.push(Candidate::Node(NodeRef::new(submodule, root)));
            } else {
                out.push(Candidate::Uninferable);
            }
        }
        if out.is_empty() {
            out.push(Candidate::Uninferable);
        }
        out
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    fn infer_attribute(
        &mut self,
        receiver: &NodeRef,
        attr: &str,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        if !ctx.enter(receiver, Some(attr)) {
            return Vec::new();
        }
        let receivers = self.infer_inner(receiver, ctx);
        let mut out = Vec::new();
        for candidate in receivers {
            match candidate {
                Candidate::Node(target) => match target.kind() {
                    NodeKind::Module { .. } => {
                        out.extend(self.infer_module_attr(&target, attr, ctx));
                    }
                    NodeKind::ClassDef { .. } => {
                        out.extend(self.infer_class_attr(&target, attr, ctx));
                    }
                    _ => out.push(Candidate::Uninferable),
                },
                Candidate::Instance(class) => {
                    out.extend(self.infer_instance_attr(&class, attr, ctx));
                }
                // constants and the sentinel re-emit the sentinel
                _ => out.push(Candidate::Uninferable),
            }
        }
        ctx.exit(receiver, Some(attr));
        out
    }

    fn infer_module_attr(
        &mut self,
        module_node: &NodeRef,
        attr: &str,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        match module_node.module.locals(attr) {
            Ok(bindings) => {
                let bindings: Vec<NodeId> = bindings.to_vec();
                let mut out = Vec::new();
                for b in bindings {
                    out.extend(self.infer_binding(&module_node.at(b), attr, ctx));
                }
                out
            }
            Err(_) => vec![Candidate::Uninferable],
        }
    }

    /// Attribute on the class object itself: first hit along the MRO.
    fn infer_class_attr(
        &mut self,
        class: &NodeRef,
        attr: &str,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        for ancestor in self.mro_for_lookup(class) {
            let bindings = ancestor
                .module
                .tree
                .scope_info(ancestor.id)
                .and_then(|info| info.get_local(attr))
                .map(<[NodeId]>::to_vec);
            if let Some(bindings) = bindings {
                let mut out = Vec::new();
                for b in bindings {
                    out.extend(self.infer_binding(&ancestor.at(b), attr, ctx));
                }
                return out;
            }
        }
        vec![Candidate::Uninferable]
    }

    /// Attribute on an instance: instance tables and class bodies along
    /// the MRO, ordered by the configured precedence.
    fn infer_instance_attr(
        &mut self,
        class: &NodeRef,
        attr: &str,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        let mro = self.mro_for_lookup(class);
        let passes: [bool; 2] = match self.precedence {
            AttributePrecedence::InstanceFirst => [true, false],
            AttributePrecedence::ClassFirst => [false, true],
        };
        for instance_pass in passes {
            for ancestor in &mro {
                let info = ancestor.module.tree.scope_info(ancestor.id);
                let bindings = if instance_pass {
                    info.and_then(|i| i.instance_attr(attr))
                } else {
                    info.and_then(|i| i.get_local(attr))
                }
                .map(<[NodeId]>::to_vec);
                if let Some(bindings) = bindings {
                    let mut out = Vec::new();
                    for b in bindings {
                        out.extend(self.infer_binding_or_value(&ancestor.at(b), attr, ctx));
                    }
                    return out;
                }
            }
        }
        vec![Candidate::Uninferable]
    }

    fn infer_binding_or_value(
        &mut self,
        binding: &NodeRef,
        name: &str,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        match binding.kind() {
            NodeKind::AssignAttr { .. } => self.infer_assigned_value(binding, ctx),
            _ => self.infer_binding(binding, name, ctx),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn infer_call(&mut self, func: &NodeRef, ctx: &mut InferenceContext) -> Vec<Candidate> {
        let callees = self.infer_inner(func, ctx);
        let mut out = Vec::new();
        for callee in callees {
            match callee {
                Candidate::Node(target) => match target.kind() {
                    NodeKind::ClassDef { .. } => out.push(Candidate::Instance(target.clone())),
                    NodeKind::FunctionDef { body, .. } => {
                        out.extend(self.infer_return_values(&target, &body.clone(), ctx));
                    }
                    NodeKind::Lambda { body, .. } => {
                        out.extend(self.infer_inner(&target.at(*body), ctx));
                    }
                    _ => out.push(Candidate::Uninferable),
                },
                _ => out.push(Candidate::Uninferable),
            }
        }
        out
    }

    /// Union of a function's return expressions. A generator body or a
    /// path with no `return` contributes `None` / the sentinel the way the
    /// runtime would.
    fn infer_return_values(
        &mut self,
        func: &NodeRef,
        body: &[NodeId],
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        let tree = &func.module.tree;
        let mut returns = Vec::new();
        let mut has_yield = false;
        let mut stack: Vec<NodeId> = body.to_vec();
        while let Some(id) = stack.pop() {
            match tree.kind(id) {
                // nested scopes keep their own returns
                NodeKind::FunctionDef { .. } | NodeKind::ClassDef { .. } | NodeKind::Lambda { .. } => {}
                NodeKind::Yield { .. } | NodeKind::YieldFrom { .. } => has_yield = true,
                NodeKind::Return { value } => returns.push(*value),
                _ => stack.extend(tree.children(id)),
            }
        }
        if has_yield {
            return vec![Candidate::Uninferable];
        }
        if returns.is_empty() {
            return vec![Candidate::Const(ConstValue::None)];
        }
        let mut out = Vec::new();
        for value in returns {
            match value {
                Some(value) => out.extend(self.infer_inner(&func.at(value), ctx)),
                None => out.push(Candidate::Const(ConstValue::None)),
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Class hierarchy
    // ------------------------------------------------------------------

    /// Direct bases of a class that infer to class definitions.
    fn class_bases(&mut self, class: &NodeRef, ctx: &mut InferenceContext) -> Vec<NodeRef> {
        let NodeKind::ClassDef { bases, .. } = class.kind() else {
            return Vec::new();
        };
        let bases = bases.clone();
        let mut out = Vec::new();
        for base in bases {
            for candidate in self.infer_inner(&class.at(base), ctx) {
                if let Candidate::Node(target) = candidate {
                    if matches!(target.kind(), NodeKind::ClassDef { .. }) {
                        out.push(target);
                    }
                }
            }
        }
        out
    }

    /// The reachable class graph, with base lists resolved up front so
    /// linearization runs over plain data. Base expressions are inferred
    /// on a fresh path; the current one must not cut them off.
    fn class_graph(&mut self, class: &NodeRef) -> HashMap<NodeRef, Vec<NodeRef>> {
        let mut graph = HashMap::new();
        let mut queue = vec![class.clone()];
        while let Some(current) = queue.pop() {
            if graph.contains_key(&current) {
                continue;
            }
            let mut base_ctx = InferenceContext::new();
            let bases = self.class_bases(&current, &mut base_ctx);
            queue.extend(bases.iter().cloned());
            graph.insert(current, bases);
        }
        graph
    }

    fn mro_for_lookup(&mut self, class: &NodeRef) -> Vec<NodeRef> {
        let graph = self.class_graph(class);
        let bases_of = |c: &NodeRef| graph.get(c).cloned().unwrap_or_default();
        mro::method_resolution_order(class.clone(), &bases_of, self.mro_policy)
            .unwrap_or_else(|_| vec![class.clone()])
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn infer_binop(
        &mut self,
        left: &NodeRef,
        op: BinaryOp,
        right: &NodeRef,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        let lefts = self.infer_inner(left, ctx);
        let rights = self.infer_inner(right, ctx);
        let mut out = Vec::new();
        for l in &lefts {
            for r in &rights {
                out.push(match (l.as_const(), r.as_const()) {
                    (Some(l), Some(r)) => fold_binop(l, op, r),
                    _ => Candidate::Uninferable,
                });
            }
        }
        if out.is_empty() {
            out.push(Candidate::Uninferable);
        }
        out
    }

    fn infer_unaryop(
        &mut self,
        op: UnaryOpKind,
        operand: &NodeRef,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        self.infer_inner(operand, ctx)
            .iter()
            .map(|candidate| match candidate.as_const() {
                Some(value) => fold_unaryop(op, value),
                None => Candidate::Uninferable,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Subscripts
    // ------------------------------------------------------------------

    fn infer_subscript(
        &mut self,
        value: &NodeRef,
        index: &NodeRef,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        let containers = self.infer_inner(value, ctx);
        let indices = self.infer_inner(index, ctx);
        let mut out = Vec::new();
        for container in &containers {
            for idx in &indices {
                out.extend(self.subscript_one(container, idx, ctx));
            }
        }
        if out.is_empty() {
            out.push(Candidate::Uninferable);
        }
        out
    }

    fn subscript_one(
        &mut self,
        container: &Candidate,
        index: &Candidate,
        ctx: &mut InferenceContext,
    ) -> Vec<Candidate> {
        let Candidate::Node(target) = container else {
            return vec![Candidate::Uninferable];
        };
        match (target.kind(), index.as_const()) {
            (NodeKind::Tuple { elts } | NodeKind::List { elts }, Some(ConstValue::Int(i))) => {
                let position = if *i < 0 { elts.len() as i64 + i } else { *i };
                match usize::try_from(position).ok().and_then(|p| elts.get(p)) {
                    Some(&elt) => self.infer_inner(&target.at(elt), ctx),
                    None => vec![Candidate::Uninferable],
                }
            }
            (NodeKind::Dict { keys, values }, Some(wanted)) => {
                let pairs: Vec<(Option<NodeId>, NodeId)> = keys
                    .iter()
                    .copied()
                    .zip(values.iter().copied())
                    .collect();
                let wanted = wanted.clone();
                for (key, value) in pairs {
                    let Some(key) = key else { continue };
                    if let NodeKind::Const { value: key_value } = target.kind_at(key) {
                        if *key_value == wanted {
                            return self.infer_inner(&target.at(value), ctx);
                        }
                    }
                }
                vec![Candidate::Uninferable]
            }
            _ => vec![Candidate::Uninferable],
        }
    }
}

impl NodeRef {
    fn kind_at(&self, id: NodeId) -> &NodeKind {
        self.module.tree.kind(id)
    }
}

// ============================================================================
// Constant folding
// ============================================================================

fn fold_binop(left: &ConstValue, op: BinaryOp, right: &ConstValue) -> Candidate {
    use ConstValue::{Float, Int, Str};
    let folded = match (left, op, right) {
        (Int(a), BinaryOp::Add, Int(b)) => a.checked_add(*b).map(Int),
        (Int(a), BinaryOp::Sub, Int(b)) => a.checked_sub(*b).map(Int),
        (Int(a), BinaryOp::Mult, Int(b)) => a.checked_mul(*b).map(Int),
        (Int(a), BinaryOp::FloorDiv, Int(b)) if *b != 0 => a.checked_div_euclid(*b).map(Int),
        (Int(a), BinaryOp::Mod, Int(b)) if *b != 0 => a.checked_rem_euclid(*b).map(Int),
        (Int(a), BinaryOp::Div, Int(b)) if *b != 0 => Some(Float(*a as f64 / *b as f64)),
        (Int(a), BinaryOp::Pow, Int(b)) => u32::try_from(*b)
            .ok()
            .and_then(|b| a.checked_pow(b))
            .map(Int),
        (Int(a), BinaryOp::BitOr, Int(b)) => Some(Int(a | b)),
        (Int(a), BinaryOp::BitAnd, Int(b)) => Some(Int(a & b)),
        (Int(a), BinaryOp::BitXor, Int(b)) => Some(Int(a ^ b)),
        (Float(a), BinaryOp::Add, Float(b)) => Some(Float(a + b)),
        (Float(a), BinaryOp::Sub, Float(b)) => Some(Float(a - b)),
        (Float(a), BinaryOp::Mult, Float(b)) => Some(Float(a * b)),
        (Float(a), BinaryOp::Div, Float(b)) if *b != 0.0 => Some(Float(a / b)),
        (Int(a), BinaryOp::Add, Float(b)) | (Float(b), BinaryOp::Add, Int(a)) => {
            Some(Float(*a as f64 + b))
        }
        (Int(a), BinaryOp::Mult, Float(b)) | (Float(b), BinaryOp::Mult, Int(a)) => {
            Some(Float(*a as f64 * b))
        }
        (Str(a), BinaryOp::Add, Str(b)) => Some(Str(format!("{a}{b}"))),
        (Str(s), BinaryOp::Mult, Int(n)) | (Int(n), BinaryOp::Mult, Str(s)) => {
            usize::try_from(*n).ok().map(|n| Str(s.repeat(n)))
        }
        _ => None,
    };
    match folded {
        Some(value) => Candidate::Const(value),
        None => Candidate::Uninferable,
    }
}

fn fold_unaryop(op: UnaryOpKind, value: &ConstValue) -> Candidate {
    use ConstValue::{Bool, Float, Int};
    let folded = match (op, value) {
        (UnaryOpKind::USub, Int(v)) => v.checked_neg().map(Int),
        (UnaryOpKind::UAdd, Int(v)) => Some(Int(*v)),
        (UnaryOpKind::Invert, Int(v)) => Some(Int(!v)),
        (UnaryOpKind::USub, Float(v)) => Some(Float(-v)),
        (UnaryOpKind::UAdd, Float(v)) => Some(Float(*v)),
        (UnaryOpKind::Not, Bool(v)) => Some(Bool(!v)),
        (UnaryOpKind::Not, ConstValue::None) => Some(Bool(true)),
        _ => None,
    };
    match folded {
        Some(value) => Candidate::Const(value),
        None => Candidate::Uninferable,
    }
}

/// Absolute module name a `from … import` pulls from, given the importing
/// module and the relative level.
fn resolve_relative(current: &Module, module: Option<&str>, level: u32) -> Option<String> {
    if level == 0 {
        return module.map(str::to_string);
    }
    let mut parts: Vec<&str> = current.name.split('.').collect();
    // inside a package's __init__, level 1 is the package itself
    let drop = level as usize - usize::from(current.package);
    if drop > parts.len() {
        return None;
    }
    parts.truncate(parts.len() - drop);
    let base = parts.join(".");
    match (base.is_empty(), module) {
        (false, Some(module)) => Some(format!("{base}.{module}")),
        (false, None) => Some(base),
        (true, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{find_class, find_name, node_ref};

    fn infer_last(source: &str, name: &str) -> Vec<Candidate> {
        let mut manager = Manager::new();
        let module = manager.build_from_text(source, "m").expect("build");
        let target = find_name(&module, name).expect("name occurrence");
        let target = node_ref(&module, target);
        InferenceEngine::new(&mut manager)
            .infer(&target)
            .candidates()
            .to_vec()
    }

    fn int(v: i64) -> Candidate {
        Candidate::Const(ConstValue::Int(v))
    }

    #[test]
    fn literal_assignment_infers_to_its_value() {
        assert_eq!(infer_last("x = 1\nx\n", "x"), [int(1)]);
    }

    #[test]
    fn every_binding_contributes_a_candidate() {
        let source = "if cond:\n    x = 1\nelse:\n    x = 2\nx\n";
        assert_eq!(infer_last(source, "x"), [int(1), int(2)]);
    }

    #[test]
    fn assignment_cycle_yields_the_sentinel() {
        let source = "a = b\nb = a\na\n";
        assert_eq!(infer_last(source, "a"), [Candidate::Uninferable]);
    }

    #[test]
    fn same_value_node_can_be_visited_on_sibling_branches() {
        // both operands resolve to the same binding; only on-stack
        // re-entry is a cycle
        assert_eq!(infer_last("x = 1\ny = x + x\ny\n", "y"), [int(2)]);
    }

    #[test]
    fn repeated_attribute_reads_fold_together() {
        let source = "\
class C:\n    def __init__(self):\n        self.v = 3\ni = C()\nx = i.v + i.v\nx\n";
        assert_eq!(infer_last(source, "x"), [int(6)]);
    }

    #[test]
    fn unbound_name_yields_the_sentinel() {
        assert_eq!(infer_last("y\n", "y"), [Candidate::Uninferable]);
    }

    #[test]
    fn calling_a_class_yields_an_instance() {
        let source = "class C:\n    pass\ni = C()\ni\n";
        let candidates = infer_last(source, "i");
        assert_eq!(candidates.len(), 1);
        let Candidate::Instance(class) = &candidates[0] else {
            panic!("expected an instance, got {candidates:?}");
        };
        assert!(matches!(class.kind(), NodeKind::ClassDef { name, .. } if name == "C"));
    }

    #[test]
    fn call_infers_through_return_values() {
        let source = "def f():\n    return 42\nx = f()\nx\n";
        assert_eq!(infer_last(source, "x"), [int(42)]);
    }

    #[test]
    fn function_without_return_infers_none() {
        let source = "def f():\n    pass\nx = f()\nx\n";
        assert_eq!(
            infer_last(source, "x"),
            [Candidate::Const(ConstValue::None)]
        );
    }

    #[test]
    fn generator_call_is_uninferable() {
        let source = "def f():\n    yield 1\nx = f()\nx\n";
        assert_eq!(infer_last(source, "x"), [Candidate::Uninferable]);
    }

    #[test]
    fn binop_folds_constants() {
        assert_eq!(infer_last("x = 2 + 3\nx\n", "x"), [int(5)]);
        assert_eq!(
            infer_last("x = 'ab' * 2\nx\n", "x"),
            [Candidate::Const(ConstValue::Str("abab".into()))]
        );
        assert_eq!(infer_last("x = -5\nx\n", "x"), [int(-5)]);
    }

    #[test]
    fn division_by_zero_is_uninferable_not_a_panic() {
        assert_eq!(infer_last("x = 1 // 0\nx\n", "x"), [Candidate::Uninferable]);
        assert_eq!(infer_last("x = 1 % 0\nx\n", "x"), [Candidate::Uninferable]);
        assert_eq!(
            infer_last("x = 1.0 / 0.0\nx\n", "x"),
            [Candidate::Uninferable]
        );
        assert_eq!(
            infer_last("x = 1.0 / 2.0\nx\n", "x"),
            [Candidate::Const(ConstValue::Float(0.5))]
        );
    }

    #[test]
    fn boolop_unions_both_operands() {
        let source = "x = 1 or 2\nx\n";
        assert_eq!(infer_last(source, "x"), [int(1), int(2)]);
    }

    #[test]
    fn ifexp_unions_both_branches() {
        let source = "x = 1 if cond else 2\nx\n";
        assert_eq!(infer_last(source, "x"), [int(1), int(2)]);
    }

    #[test]
    fn subscript_indexes_literal_sequences() {
        assert_eq!(infer_last("x = (10, 20, 30)[1]\nx\n", "x"), [int(20)]);
        assert_eq!(infer_last("x = [10, 20][-1]\nx\n", "x"), [int(20)]);
        assert_eq!(
            infer_last("x = {'a': 1, 'b': 2}['b']\nx\n", "x"),
            [int(2)]
        );
        assert_eq!(
            infer_last("x = (10, 20)[5]\nx\n", "x"),
            [Candidate::Uninferable]
        );
    }

    #[test]
    fn tuple_unpacking_infers_positionally() {
        let source = "a, b = 1, 'two'\nb\n";
        assert_eq!(
            infer_last(source, "b"),
            [Candidate::Const(ConstValue::Str("two".into()))]
        );
    }

    #[test]
    fn parameter_defaults_are_the_fallback_value() {
        let source = "def f(port=8080):\n    return port\nx = f()\nx\n";
        assert_eq!(infer_last(source, "x"), [int(8080)]);
    }

    #[test]
    fn instance_attributes_resolve_through_self() {
        let source = "\
class C:\n    def __init__(self):\n        self.v = 3\ni = C()\nx = i.v\nx\n";
        assert_eq!(infer_last(source, "x"), [int(3)]);
    }

    #[test]
    fn instance_attrs_shadow_class_attrs_by_default() {
        let source = "\
class C:\n    v = 1\n    def set(self):\n        self.v = 2\ni = C()\nx = i.v\nx\n";
        assert_eq!(infer_last(source, "x"), [int(2)]);
    }

    #[test]
    fn class_first_precedence_flips_the_order() {
        let source = "\
class C:\n    v = 1\n    def set(self):\n        self.v = 2\ni = C()\nx = i.v\nx\n";
        let mut manager = Manager::new();
        let module = manager.build_from_text(source, "m").unwrap();
        let target = node_ref(&module, find_name(&module, "x").unwrap());
        let candidates = InferenceEngine::new(&mut manager)
            .with_precedence(AttributePrecedence::ClassFirst)
            .infer(&target);
        assert_eq!(candidates.candidates(), [int(1)]);
    }

    #[test]
    fn inherited_attributes_resolve_along_the_mro() {
        let source = "\
class Base:\n    flag = 7\nclass Child(Base):\n    pass\nx = Child.flag\nx\n";
        assert_eq!(infer_last(source, "x"), [int(7)]);
    }

    #[test]
    fn class_scope_names_are_invisible_to_methods() {
        let source = "\
total = 10\nclass C:\n    total = 99\n    def read(self):\n        return total\ni = C()\nx = i.read()\nx\n";
        assert_eq!(infer_last(source, "x"), [int(10)]);
    }

    #[test]
    fn generator_target_is_uninferable_but_iterable() {
        let source = "gen = (n for n in (1, 2))\nn\n";
        // n is bound only inside the comprehension scope
        assert_eq!(infer_last(source, "n"), [Candidate::Uninferable]);
    }

    #[test]
    fn class_mro_is_exposed() {
        let source = "\
class A:\n    pass\nclass B(A):\n    pass\nclass C(A):\n    pass\nclass D(B, C):\n    pass\n";
        let mut manager = Manager::new();
        let module = manager.build_from_text(source, "m").unwrap();
        let class = node_ref(&module, find_class(&module, "D").unwrap());
        let mro = InferenceEngine::new(&mut manager).class_mro(&class).unwrap();
        let names: Vec<String> = mro
            .iter()
            .map(|c| match c.kind() {
                NodeKind::ClassDef { name, .. } => name.clone(),
                _ => panic!("non-class in mro"),
            })
            .collect();
        assert_eq!(names, ["D", "B", "C", "A"]);
    }

    #[test]
    fn infer_definite_rejects_the_sentinel() {
        let mut manager = Manager::new();
        let module = manager.build_from_text("x = unknown_thing\nx\n", "m").unwrap();
        let target = node_ref(&module, find_name(&module, "x").unwrap());
        let err = InferenceEngine::new(&mut manager)
            .infer_definite(&target)
            .unwrap_err();
        assert!(matches!(err, InferenceError::NoDefiniteValue));
    }

    #[test]
    fn relative_import_names_resolve_against_the_importer() {
        let module = Module {
            name: "pkg.sub.mod".into(),
            package: false,
            origin: pyscry_core::ModuleOrigin::Text,
            future_features: Default::default(),
            tree: Default::default(),
        };
        assert_eq!(
            resolve_relative(&module, Some("sibling"), 1),
            Some("pkg.sub.sibling".into())
        );
        assert_eq!(resolve_relative(&module, None, 2), Some("pkg".into()));
        assert_eq!(resolve_relative(&module, None, 9), None);

        let package = Module { package: true, ..module };
        assert_eq!(
            resolve_relative(&package, Some("sibling"), 1),
            Some("pkg.sub.mod.sibling".into())
        );
    }
}
