//! Node kinds for the typed syntax tree.
//!
//! [`NodeKind`] is a closed tagged union: every syntactic construct the
//! engine reasons about is a variant here, and consumers dispatch with
//! exhaustive `match` so the compiler checks rule coverage. Variants hold
//! [`NodeId`] slots for their semantic children; the arena additionally
//! keeps the flat ordered child list used for span arithmetic and visits.
//!
//! Constructs with no analysis value (f-string internals, `match`
//! statements, slices with dynamic pieces) map to [`NodeKind::Unknown`],
//! which infers to the sentinel rather than failing.

use crate::tree::NodeId;

// ============================================================================
// Operators
// ============================================================================

/// Binary arithmetic/bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Invert,
    Not,
    UAdd,
    USub,
}

/// Boolean short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

// ============================================================================
// Literal values
// ============================================================================

/// A literal constant value carried by a `Const` node.
///
/// Integers that fit `i64` use [`ConstValue::Int`]; larger literals keep
/// their decimal text in [`ConstValue::BigInt`] so nothing is lost.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    BigInt(String),
    Float(f64),
    Complex,
    Str(String),
    Bytes(Vec<u8>),
}

// ============================================================================
// Import aliases
// ============================================================================

/// One `name [as asname]` entry of an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAlias {
    pub name: String,
    pub asname: Option<String>,
}

impl ImportAlias {
    /// The name this alias binds in the importing scope: the as-name, or
    /// the first dotted component of the imported path.
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(asname) => asname,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

// ============================================================================
// Node kinds
// ============================================================================

/// The closed set of tree node kinds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Root of a module tree.
    Module { name: String },
    /// `class name(bases): body`
    ClassDef {
        name: String,
        bases: Vec<NodeId>,
        keywords: Vec<NodeId>,
        body: Vec<NodeId>,
        decorators: Option<NodeId>,
    },
    /// `def name(params): body` (also `async def`).
    FunctionDef {
        name: String,
        params: Vec<NodeId>,
        body: Vec<NodeId>,
        decorators: Option<NodeId>,
        returns: Option<NodeId>,
        is_async: bool,
    },
    /// `lambda params: body`
    Lambda { params: Vec<NodeId>, body: NodeId },
    /// A formal parameter, bound in its function's scope.
    Param {
        name: String,
        annotation: Option<NodeId>,
        default: Option<NodeId>,
    },
    /// The decorator list of a definition; sits outside the definition's
    /// own span.
    Decorators { items: Vec<NodeId> },

    /// `targets = value` (possibly chained).
    Assign { targets: Vec<NodeId>, value: NodeId },
    /// `target: annotation = value`
    AnnAssign {
        target: NodeId,
        annotation: NodeId,
        value: Option<NodeId>,
    },
    /// `target op= value`
    AugAssign {
        target: NodeId,
        op: BinaryOp,
        value: NodeId,
    },
    /// A name in binding position.
    AssignName { name: String },
    /// An attribute in binding position (`receiver.attr = …`).
    AssignAttr { receiver: NodeId, attr: String },

    /// A name in load position.
    Name { name: String },
    /// `receiver.attr` in load position.
    Attribute { receiver: NodeId, attr: String },
    /// `func(args, keywords)`
    Call {
        func: NodeId,
        args: Vec<NodeId>,
        keywords: Vec<NodeId>,
    },
    /// `name=value` (or `**value`) inside a call.
    Keyword { name: Option<String>, value: NodeId },
    /// A literal constant.
    Const { value: ConstValue },

    Tuple { elts: Vec<NodeId> },
    List { elts: Vec<NodeId> },
    Set { elts: Vec<NodeId> },
    Dict {
        keys: Vec<Option<NodeId>>,
        values: Vec<NodeId>,
    },

    BinOp {
        left: NodeId,
        op: BinaryOp,
        right: NodeId,
    },
    UnaryOp { op: UnaryOpKind, operand: NodeId },
    BoolOp { op: BoolOpKind, values: Vec<NodeId> },
    Compare {
        left: NodeId,
        ops: Vec<CompareOp>,
        comparators: Vec<NodeId>,
    },
    IfExp {
        test: NodeId,
        body: NodeId,
        orelse: NodeId,
    },
    Subscript { value: NodeId, index: NodeId },
    Starred { value: NodeId },
    Slice {
        lower: Option<NodeId>,
        upper: Option<NodeId>,
        step: Option<NodeId>,
    },
    NamedExpr { target: NodeId, value: NodeId },

    ListComp {
        elt: NodeId,
        generators: Vec<NodeId>,
    },
    SetComp {
        elt: NodeId,
        generators: Vec<NodeId>,
    },
    DictComp {
        key: NodeId,
        value: NodeId,
        generators: Vec<NodeId>,
    },
    GeneratorExp {
        elt: NodeId,
        generators: Vec<NodeId>,
    },
    /// One `for target in iter [if …]` clause of a comprehension.
    Comprehension {
        target: NodeId,
        iter: NodeId,
        ifs: Vec<NodeId>,
        is_async: bool,
    },

    If {
        test: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
    },
    While {
        test: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
    },
    For {
        target: NodeId,
        iter: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
        is_async: bool,
    },
    With {
        items: Vec<NodeId>,
        body: Vec<NodeId>,
        is_async: bool,
    },
    /// One `expr [as vars]` item of a with statement.
    WithItem {
        context: NodeId,
        vars: Option<NodeId>,
    },
    Try {
        body: Vec<NodeId>,
        handlers: Vec<NodeId>,
        orelse: Vec<NodeId>,
        finalbody: Vec<NodeId>,
    },
    ExceptHandler {
        typ: Option<NodeId>,
        name: Option<NodeId>,
        body: Vec<NodeId>,
    },

    Import { names: Vec<ImportAlias> },
    ImportFrom {
        module: Option<String>,
        names: Vec<ImportAlias>,
        level: u32,
    },
    Global { names: Vec<String> },
    Nonlocal { names: Vec<String> },

    Return { value: Option<NodeId> },
    Raise {
        exc: Option<NodeId>,
        cause: Option<NodeId>,
    },
    Assert { test: NodeId, msg: Option<NodeId> },
    Delete { targets: Vec<NodeId> },
    /// An expression used as a statement.
    ExprStmt { value: NodeId },
    Yield { value: Option<NodeId> },
    YieldFrom { value: NodeId },
    Await { value: NodeId },

    Pass,
    Break,
    Continue,
    /// A construct the engine does not model; infers to the sentinel.
    Unknown,
}

/// Field-less discriminant of [`NodeKind`]; the key of the transform table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Module,
    ClassDef,
    FunctionDef,
    Lambda,
    Param,
    Decorators,
    Assign,
    AnnAssign,
    AugAssign,
    AssignName,
    AssignAttr,
    Name,
    Attribute,
    Call,
    Keyword,
    Const,
    Tuple,
    List,
    Set,
    Dict,
    BinOp,
    UnaryOp,
    BoolOp,
    Compare,
    IfExp,
    Subscript,
    Starred,
    Slice,
    NamedExpr,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Comprehension,
    If,
    While,
    For,
    With,
    WithItem,
    Try,
    ExceptHandler,
    Import,
    ImportFrom,
    Global,
    Nonlocal,
    Return,
    Raise,
    Assert,
    Delete,
    ExprStmt,
    Yield,
    YieldFrom,
    Await,
    Pass,
    Break,
    Continue,
    Unknown,
}

impl NodeTag {
    /// Whether nodes of this kind own a symbol table.
    pub fn is_scope(self) -> bool {
        matches!(
            self,
            NodeTag::Module
                | NodeTag::ClassDef
                | NodeTag::FunctionDef
                | NodeTag::Lambda
                | NodeTag::ListComp
                | NodeTag::SetComp
                | NodeTag::DictComp
                | NodeTag::GeneratorExp
        )
    }

    /// Whether this kind is a frame (module/class/function), the scopes
    /// that participate in `global` attribution and ancestor queries.
    pub fn is_frame(self) -> bool {
        matches!(
            self,
            NodeTag::Module | NodeTag::ClassDef | NodeTag::FunctionDef
        )
    }
}

impl NodeKind {
    /// The discriminant used for transform dispatch and rule dispatch.
    pub fn tag(&self) -> NodeTag {
        match self {
            NodeKind::Module { .. } => NodeTag::Module,
            NodeKind::ClassDef { .. } => NodeTag::ClassDef,
            NodeKind::FunctionDef { .. } => NodeTag::FunctionDef,
            NodeKind::Lambda { .. } => NodeTag::Lambda,
            NodeKind::Param { .. } => NodeTag::Param,
            NodeKind::Decorators { .. } => NodeTag::Decorators,
            NodeKind::Assign { .. } => NodeTag::Assign,
            NodeKind::AnnAssign { .. } => NodeTag::AnnAssign,
            NodeKind::AugAssign { .. } => NodeTag::AugAssign,
            NodeKind::AssignName { .. } => NodeTag::AssignName,
            NodeKind::AssignAttr { .. } => NodeTag::AssignAttr,
            NodeKind::Name { .. } => NodeTag::Name,
            NodeKind::Attribute { .. } => NodeTag::Attribute,
            NodeKind::Call { .. } => NodeTag::Call,
            NodeKind::Keyword { .. } => NodeTag::Keyword,
            NodeKind::Const { .. } => NodeTag::Const,
            NodeKind::Tuple { .. } => NodeTag::Tuple,
            NodeKind::List { .. } => NodeTag::List,
            NodeKind::Set { .. } => NodeTag::Set,
            NodeKind::Dict { .. } => NodeTag::Dict,
            NodeKind::BinOp { .. } => NodeTag::BinOp,
            NodeKind::UnaryOp { .. } => NodeTag::UnaryOp,
            NodeKind::BoolOp { .. } => NodeTag::BoolOp,
            NodeKind::Compare { .. } => NodeTag::Compare,
            NodeKind::IfExp { .. } => NodeTag::IfExp,
            NodeKind::Subscript { .. } => NodeTag::Subscript,
            NodeKind::Starred { .. } => NodeTag::Starred,
            NodeKind::Slice { .. } => NodeTag::Slice,
            NodeKind::NamedExpr { .. } => NodeTag::NamedExpr,
            NodeKind::ListComp { .. } => NodeTag::ListComp,
            NodeKind::SetComp { .. } => NodeTag::SetComp,
            NodeKind::DictComp { .. } => NodeTag::DictComp,
            NodeKind::GeneratorExp { .. } => NodeTag::GeneratorExp,
            NodeKind::Comprehension { .. } => NodeTag::Comprehension,
            NodeKind::If { .. } => NodeTag::If,
            NodeKind::While { .. } => NodeTag::While,
            NodeKind::For { .. } => NodeTag::For,
            NodeKind::With { .. } => NodeTag::With,
            NodeKind::WithItem { .. } => NodeTag::WithItem,
            NodeKind::Try { .. } => NodeTag::Try,
            NodeKind::ExceptHandler { .. } => NodeTag::ExceptHandler,
            NodeKind::Import { .. } => NodeTag::Import,
            NodeKind::ImportFrom { .. } => NodeTag::ImportFrom,
            NodeKind::Global { .. } => NodeTag::Global,
            NodeKind::Nonlocal { .. } => NodeTag::Nonlocal,
            NodeKind::Return { .. } => NodeTag::Return,
            NodeKind::Raise { .. } => NodeTag::Raise,
            NodeKind::Assert { .. } => NodeTag::Assert,
            NodeKind::Delete { .. } => NodeTag::Delete,
            NodeKind::ExprStmt { .. } => NodeTag::ExprStmt,
            NodeKind::Yield { .. } => NodeTag::Yield,
            NodeKind::YieldFrom { .. } => NodeTag::YieldFrom,
            NodeKind::Await { .. } => NodeTag::Await,
            NodeKind::Pass => NodeTag::Pass,
            NodeKind::Break => NodeTag::Break,
            NodeKind::Continue => NodeTag::Continue,
            NodeKind::Unknown => NodeTag::Unknown,
        }
    }

    /// Rewrite every [`NodeId`] slot through `map`. Used when grafting a
    /// subtree into another arena.
    pub fn remap(&mut self, map: &impl Fn(NodeId) -> NodeId) {
        let one = |id: &mut NodeId| *id = map(*id);
        let many = |ids: &mut Vec<NodeId>| {
            for id in ids {
                *id = map(*id);
            }
        };
        let opt = |id: &mut Option<NodeId>| {
            if let Some(id) = id {
                *id = map(*id);
            }
        };
        match self {
            NodeKind::Module { .. }
            | NodeKind::AssignName { .. }
            | NodeKind::Name { .. }
            | NodeKind::Const { .. }
            | NodeKind::Import { .. }
            | NodeKind::ImportFrom { .. }
            | NodeKind::Global { .. }
            | NodeKind::Nonlocal { .. }
            | NodeKind::Pass
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Unknown => {}
            NodeKind::ClassDef {
                bases,
                keywords,
                body,
                decorators,
                ..
            } => {
                many(bases);
                many(keywords);
                many(body);
                opt(decorators);
            }
            NodeKind::FunctionDef {
                params,
                body,
                decorators,
                returns,
                ..
            } => {
                many(params);
                many(body);
                opt(decorators);
                opt(returns);
            }
            NodeKind::Lambda { params, body } => {
                many(params);
                one(body);
            }
            NodeKind::Param {
                annotation,
                default,
                ..
            } => {
                opt(annotation);
                opt(default);
            }
            NodeKind::Decorators { items } => many(items),
            NodeKind::Assign { targets, value } => {
                many(targets);
                one(value);
            }
            NodeKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                one(target);
                one(annotation);
                opt(value);
            }
            NodeKind::AugAssign { target, value, .. } => {
                one(target);
                one(value);
            }
            NodeKind::AssignAttr { receiver, .. } => one(receiver),
            NodeKind::Attribute { receiver, .. } => one(receiver),
            NodeKind::Call {
                func,
                args,
                keywords,
            } => {
                one(func);
                many(args);
                many(keywords);
            }
            NodeKind::Keyword { value, .. } => one(value),
            NodeKind::Tuple { elts } | NodeKind::List { elts } | NodeKind::Set { elts } => {
                many(elts)
            }
            NodeKind::Dict { keys, values } => {
                for key in keys.iter_mut().flatten() {
                    *key = map(*key);
                }
                many(values);
            }
            NodeKind::BinOp { left, right, .. } => {
                one(left);
                one(right);
            }
            NodeKind::UnaryOp { operand, .. } => one(operand),
            NodeKind::BoolOp { values, .. } => many(values),
            NodeKind::Compare {
                left, comparators, ..
            } => {
                one(left);
                many(comparators);
            }
            NodeKind::IfExp { test, body, orelse } => {
                one(test);
                one(body);
                one(orelse);
            }
            NodeKind::Subscript { value, index } => {
                one(value);
                one(index);
            }
            NodeKind::Starred { value } => one(value),
            NodeKind::Slice { lower, upper, step } => {
                opt(lower);
                opt(upper);
                opt(step);
            }
            NodeKind::NamedExpr { target, value } => {
                one(target);
                one(value);
            }
            NodeKind::ListComp { elt, generators }
            | NodeKind::SetComp { elt, generators }
            | NodeKind::GeneratorExp { elt, generators } => {
                one(elt);
                many(generators);
            }
            NodeKind::DictComp {
                key,
                value,
                generators,
            } => {
                one(key);
                one(value);
                many(generators);
            }
            NodeKind::Comprehension {
                target, iter, ifs, ..
            } => {
                one(target);
                one(iter);
                many(ifs);
            }
            NodeKind::If { test, body, orelse } | NodeKind::While { test, body, orelse } => {
                one(test);
                many(body);
                many(orelse);
            }
            NodeKind::For {
                target,
                iter,
                body,
                orelse,
                ..
            } => {
                one(target);
                one(iter);
                many(body);
                many(orelse);
            }
            NodeKind::With { items, body, .. } => {
                many(items);
                many(body);
            }
            NodeKind::WithItem { context, vars } => {
                one(context);
                opt(vars);
            }
            NodeKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                many(body);
                many(handlers);
                many(orelse);
                many(finalbody);
            }
            NodeKind::ExceptHandler { typ, name, body } => {
                opt(typ);
                opt(name);
                many(body);
            }
            NodeKind::Return { value } | NodeKind::Yield { value } => opt(value),
            NodeKind::Raise { exc, cause } => {
                opt(exc);
                opt(cause);
            }
            NodeKind::Assert { test, msg } => {
                one(test);
                opt(msg);
            }
            NodeKind::Delete { targets } => many(targets),
            NodeKind::ExprStmt { value }
            | NodeKind::YieldFrom { value }
            | NodeKind::Await { value } => one(value),
        }
    }
}
