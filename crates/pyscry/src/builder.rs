//! Tree construction from source text or files.
//!
//! The external parser (`rustpython-parser`) produces a generic concrete
//! syntax tree; this module walks it into the typed arena, computing line
//! spans and populating symbol tables in a single pass.
//!
//! Span arithmetic is done here rather than copied from the parser:
//! decorated definitions start on their `def`/`class` line (the decorator
//! list becomes a separate child spanning the lines above), compound
//! statements record the line their block header ends on, and `to_line` is
//! widened bottom-up over child spans so trailing `else`/`except`/
//! `finally` clauses are covered.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rustpython_parser::ast::{self, Constant, ExceptHandler, Ranged};
use rustpython_parser::{parse, Mode};
use thiserror::Error;
use tracing::debug;

use pyscry_core::{
    BinaryOp, BoolOpKind, CompareOp, ConstValue, ImportAlias, Module, ModuleOrigin, NodeId,
    NodeKind, NodeTag, Span, Tree, UnaryOpKind,
};

// ============================================================================
// Error Types
// ============================================================================

/// The source text cannot be tokenized or parsed: null bytes, bad escape
/// sequences, an undeclared or undecodable encoding, or plain syntax
/// errors. Fatal to the single build call; no partial tree is exposed.
#[derive(Debug, Clone, Error)]
#[error("cannot parse module '{module}': {message}")]
pub struct SyntaxError {
    pub module: String,
    pub message: String,
}

/// Failure of a path-based build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Entry points
// ============================================================================

/// Build a module tree from in-memory source text.
pub fn build_from_text(source: &str, module_name: &str) -> Result<Module, SyntaxError> {
    build_text_with_origin(source, module_name, ModuleOrigin::Text)
}

pub(crate) fn build_text_with_origin(
    source: &str,
    module_name: &str,
    origin: ModuleOrigin,
) -> Result<Module, SyntaxError> {
    if source.contains('\0') {
        return Err(SyntaxError {
            module: module_name.to_string(),
            message: "source code cannot contain null bytes".to_string(),
        });
    }
    let parsed = parse(source, Mode::Module, module_name).map_err(|err| SyntaxError {
        module: module_name.to_string(),
        message: err.to_string(),
    })?;
    let body = match parsed {
        ast::Mod::Module(module) => module.body,
        _ => Vec::new(),
    };

    let (name, package) = split_package_name(module_name);
    let mut builder = TreeBuilder::new(source, &name);
    let root = builder.module_root();
    let _ = builder.stmts(&body, root, root);
    builder.tree.widen_from_children(root);
    debug!(module = %name, nodes = builder.tree.len(), "built module tree");
    Ok(Module {
        name,
        package,
        origin,
        future_features: builder.future_features,
        tree: builder.tree,
    })
}

/// Build a module tree from a file on disk, honoring UTF-8 BOMs and
/// PEP 263 coding cookies. A `module_name` ending in `.__init__` (or an
/// `__init__.py` file) marks a directory package.
pub fn build_from_path(path: &Path, module_name: &str) -> Result<Module, BuildError> {
    let bytes = std::fs::read(path).map_err(|source| BuildError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let source = decode_source(&bytes, module_name)?;
    let mut module = build_text_with_origin(&source, module_name, ModuleOrigin::File(path.into()))?;
    if path.file_name().is_some_and(|f| f == "__init__.py") {
        module.package = true;
    }
    Ok(module)
}

/// `data.__init__` names the package `data`.
fn split_package_name(module_name: &str) -> (String, bool) {
    match module_name.strip_suffix(".__init__") {
        Some(stem) => (stem.to_string(), true),
        None => match module_name {
            "__init__" => (module_name.to_string(), true),
            _ => (module_name.to_string(), false),
        },
    }
}

// ============================================================================
// Source decoding
// ============================================================================

/// Decode raw file bytes per the declared encoding. UTF-8 (with or
/// without BOM), ASCII and the Latin-1 family are supported; any other
/// declared codec is a syntax error, as is undeclared non-UTF-8 content.
fn decode_source(bytes: &[u8], module_name: &str) -> Result<String, SyntaxError> {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let cookie = coding_cookie(bytes);
    match cookie.as_deref() {
        None | Some("utf-8") | Some("utf8") | Some("utf-8-sig") | Some("ascii")
        | Some("us-ascii") => {
            std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|_| SyntaxError {
                    module: module_name.to_string(),
                    message: match cookie {
                        Some(name) => format!("source bytes are not valid {name}"),
                        None => "undeclared encoding and source is not valid utf-8".to_string(),
                    },
                })
        }
        Some("latin-1") | Some("latin1") | Some("iso-8859-1") | Some("iso8859-1") => {
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
        Some(other) => Err(SyntaxError {
            module: module_name.to_string(),
            message: format!("unknown encoding: {other}"),
        }),
    }
}

/// Extract a PEP 263 `coding: name` cookie from the first two lines.
fn coding_cookie(bytes: &[u8]) -> Option<String> {
    for line in bytes.split(|&b| b == b'\n').take(2) {
        if !line.starts_with(b"#") {
            continue;
        }
        let line: String = line.iter().map(|&b| b as char).collect();
        let at = line.find("coding")?;
        let rest = &line[at + "coding".len()..];
        let rest = rest.strip_prefix([':', '=']).unwrap_or_default();
        let name: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
            .collect();
        if !name.is_empty() {
            return Some(name.to_ascii_lowercase());
        }
    }
    None
}

// ============================================================================
// Line index
// ============================================================================

/// Byte-offset → 1-based line number mapping.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (at, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(at + 1);
            }
        }
        LineIndex { line_starts }
    }

    fn line_of(&self, offset: usize) -> u32 {
        self.line_starts.partition_point(|&start| start <= offset) as u32
    }

    fn last_line(&self) -> u32 {
        self.line_starts.len() as u32
    }
}

// ============================================================================
// Tree builder
// ============================================================================

struct TreeBuilder {
    tree: Tree,
    lines: LineIndex,
    future_features: HashSet<String>,
    module_name: String,
    /// Stack of (class scope, receiver parameter name) for the methods
    /// currently being built; drives `self.<attr> = …` detection.
    method_receivers: Vec<(NodeId, String)>,
}

impl TreeBuilder {
    fn new(source: &str, module_name: &str) -> Self {
        TreeBuilder {
            tree: Tree::new(),
            lines: LineIndex::new(source),
            future_features: HashSet::new(),
            module_name: module_name.to_string(),
            method_receivers: Vec::new(),
        }
    }

    fn module_root(&mut self) -> NodeId {
        let span = Span::lines(0, self.lines.last_line());
        let root = self.tree.add(
            NodeKind::Module {
                name: self.module_name.clone(),
            },
            span,
            None,
        );
        self.tree
            .init_scope(root, format!("module '{}'", self.module_name));
        root
    }

    fn span_of(&self, node: &impl Ranged) -> Span {
        let start = u32::from(node.range().start()) as usize;
        let end = u32::from(node.range().end()) as usize;
        let last = if end > start { end - 1 } else { start };
        Span::lines(self.lines.line_of(start), self.lines.line_of(last))
    }

    /// Record a binding occurrence, honoring `global` declarations made
    /// earlier in the owning function body.
    fn bind(&mut self, scope: NodeId, name: &str, binding: NodeId) {
        let mut dest = scope;
        if self.tree.node(scope).tag() == NodeTag::FunctionDef {
            let declared = self
                .tree
                .scope_info(scope)
                .is_some_and(|info| info.is_declared_global(name));
            if declared {
                dest = self.tree.root();
            }
        }
        if let Some(info) = self.tree.scope_info_mut(dest) {
            info.add_local(name, binding);
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn stmts(&mut self, stmts: &[ast::Stmt], parent: NodeId, scope: NodeId) -> Vec<NodeId> {
        stmts.iter().map(|s| self.stmt(s, parent, scope)).collect()
    }

    fn stmt(&mut self, stmt: &ast::Stmt, parent: NodeId, scope: NodeId) -> NodeId {
        match stmt {
            ast::Stmt::FunctionDef(ast::StmtFunctionDef {
                name,
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => self.function_def(
                stmt,
                name.as_str(),
                args,
                body,
                decorator_list,
                returns.as_deref(),
                false,
                parent,
                scope,
            ),
            ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef {
                name,
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => self.function_def(
                stmt,
                name.as_str(),
                args,
                body,
                decorator_list,
                returns.as_deref(),
                true,
                parent,
                scope,
            ),
            ast::Stmt::ClassDef(ast::StmtClassDef {
                name,
                bases,
                keywords,
                body,
                decorator_list,
                ..
            }) => self.class_def(stmt, name.as_str(), bases, keywords, body, decorator_list, parent, scope),
            ast::Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                let id = self.tree.add(
                    NodeKind::Assign {
                        targets: vec![],
                        value: NodeId::from_raw(0),
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                let target_ids: Vec<NodeId> =
                    targets.iter().map(|t| self.target(t, id, scope)).collect();
                if let NodeKind::Assign { targets, value } = &mut self.tree.node_mut(id).kind {
                    *targets = target_ids;
                    *value = value_id;
                }
                id
            }
            ast::Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                let id = self.tree.add(
                    NodeKind::AnnAssign {
                        target: NodeId::from_raw(0),
                        annotation: NodeId::from_raw(0),
                        value: None,
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                let annotation_id = self.expr(annotation, id, scope);
                let value_id = value.as_deref().map(|v| self.expr(v, id, scope));
                let target_id = self.target(target, id, scope);
                if let NodeKind::AnnAssign {
                    target,
                    annotation,
                    value,
                } = &mut self.tree.node_mut(id).kind
                {
                    *target = target_id;
                    *annotation = annotation_id;
                    *value = value_id;
                }
                id
            }
            ast::Stmt::AugAssign(ast::StmtAugAssign {
                target, op, value, ..
            }) => {
                let id = self.tree.add(
                    NodeKind::AugAssign {
                        target: NodeId::from_raw(0),
                        op: binary_op(op),
                        value: NodeId::from_raw(0),
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                let target_id = self.target(target, id, scope);
                if let NodeKind::AugAssign { target, value, .. } = &mut self.tree.node_mut(id).kind
                {
                    *target = target_id;
                    *value = value_id;
                }
                id
            }
            ast::Stmt::If(ast::StmtIf {
                test, body, orelse, ..
            }) => self.compound_test(stmt, test, body, orelse, parent, scope, false),
            ast::Stmt::While(ast::StmtWhile {
                test, body, orelse, ..
            }) => self.compound_test(stmt, test, body, orelse, parent, scope, true),
            ast::Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => self.for_stmt(stmt, target, iter, body, orelse, false, parent, scope),
            ast::Stmt::AsyncFor(ast::StmtAsyncFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => self.for_stmt(stmt, target, iter, body, orelse, true, parent, scope),
            ast::Stmt::With(ast::StmtWith { items, body, .. }) => {
                self.with_stmt(stmt, items, body, false, parent, scope)
            }
            ast::Stmt::AsyncWith(ast::StmtAsyncWith { items, body, .. }) => {
                self.with_stmt(stmt, items, body, true, parent, scope)
            }
            ast::Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | ast::Stmt::TryStar(ast::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                let span = self.span_of(stmt);
                let id = self.tree.add(
                    NodeKind::Try {
                        body: vec![],
                        handlers: vec![],
                        orelse: vec![],
                        finalbody: vec![],
                    },
                    span.with_block_start(span.from_line),
                    Some(parent),
                );
                let body_ids = self.stmts(body, id, scope);
                let handler_ids: Vec<NodeId> = handlers
                    .iter()
                    .map(|h| self.except_handler(h, id, scope))
                    .collect();
                let orelse_ids = self.stmts(orelse, id, scope);
                let final_ids = self.stmts(finalbody, id, scope);
                if let NodeKind::Try {
                    body,
                    handlers,
                    orelse,
                    finalbody,
                } = &mut self.tree.node_mut(id).kind
                {
                    *body = body_ids;
                    *handlers = handler_ids;
                    *orelse = orelse_ids;
                    *finalbody = final_ids;
                }
                self.tree.widen_from_children(id);
                id
            }
            ast::Stmt::Import(ast::StmtImport { names, .. }) => {
                let aliases: Vec<ImportAlias> = names.iter().map(import_alias).collect();
                let id = self.tree.add(
                    NodeKind::Import {
                        names: aliases.clone(),
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                for alias in &aliases {
                    self.bind(scope, alias.bound_name().to_string().as_str(), id);
                }
                id
            }
            ast::Stmt::ImportFrom(ast::StmtImportFrom {
                module,
                names,
                level,
                ..
            }) => {
                let module_name = module.as_ref().map(|m| m.to_string());
                let aliases: Vec<ImportAlias> = names.iter().map(import_alias).collect();
                if module_name.as_deref() == Some("__future__") {
                    for alias in &aliases {
                        self.future_features.insert(alias.name.clone());
                    }
                }
                let id = self.tree.add(
                    NodeKind::ImportFrom {
                        module: module_name,
                        names: aliases.clone(),
                        level: level.map(|l| l.to_u32()).unwrap_or(0),
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                for alias in &aliases {
                    if alias.name != "*" {
                        self.bind(scope, alias.bound_name().to_string().as_str(), id);
                    }
                }
                id
            }
            ast::Stmt::Global(ast::StmtGlobal { names, .. }) => {
                let id = self.tree.add(
                    NodeKind::Global {
                        names: names.iter().map(|n| n.to_string()).collect(),
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                if self.tree.node(scope).tag() == NodeTag::FunctionDef {
                    if let Some(info) = self.tree.scope_info_mut(scope) {
                        for name in names {
                            info.declare_global(name.to_string());
                        }
                    }
                }
                id
            }
            ast::Stmt::Nonlocal(ast::StmtNonlocal { names, .. }) => self.tree.add(
                NodeKind::Nonlocal {
                    names: names.iter().map(|n| n.to_string()).collect(),
                },
                self.span_of(stmt),
                Some(parent),
            ),
            ast::Stmt::Return(ast::StmtReturn { value, .. }) => {
                let id = self.tree.add(
                    NodeKind::Return { value: None },
                    self.span_of(stmt),
                    Some(parent),
                );
                let value_id = value.as_deref().map(|v| self.expr(v, id, scope));
                if let NodeKind::Return { value } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                }
                id
            }
            ast::Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                let id = self.tree.add(
                    NodeKind::Raise {
                        exc: None,
                        cause: None,
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                let exc_id = exc.as_deref().map(|e| self.expr(e, id, scope));
                let cause_id = cause.as_deref().map(|c| self.expr(c, id, scope));
                if let NodeKind::Raise { exc, cause } = &mut self.tree.node_mut(id).kind {
                    *exc = exc_id;
                    *cause = cause_id;
                }
                id
            }
            ast::Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                let id = self.tree.add(
                    NodeKind::Assert {
                        test: NodeId::from_raw(0),
                        msg: None,
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                let test_id = self.expr(test, id, scope);
                let msg_id = msg.as_deref().map(|m| self.expr(m, id, scope));
                if let NodeKind::Assert { test, msg } = &mut self.tree.node_mut(id).kind {
                    *test = test_id;
                    *msg = msg_id;
                }
                id
            }
            ast::Stmt::Delete(ast::StmtDelete { targets, .. }) => {
                let id = self.tree.add(
                    NodeKind::Delete { targets: vec![] },
                    self.span_of(stmt),
                    Some(parent),
                );
                let target_ids: Vec<NodeId> =
                    targets.iter().map(|t| self.expr(t, id, scope)).collect();
                if let NodeKind::Delete { targets } = &mut self.tree.node_mut(id).kind {
                    *targets = target_ids;
                }
                id
            }
            ast::Stmt::Expr(ast::StmtExpr { value, .. }) => {
                let id = self.tree.add(
                    NodeKind::ExprStmt {
                        value: NodeId::from_raw(0),
                    },
                    self.span_of(stmt),
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                if let NodeKind::ExprStmt { value } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                }
                id
            }
            ast::Stmt::Pass(_) => self
                .tree
                .add(NodeKind::Pass, self.span_of(stmt), Some(parent)),
            ast::Stmt::Break(_) => self
                .tree
                .add(NodeKind::Break, self.span_of(stmt), Some(parent)),
            ast::Stmt::Continue(_) => {
                self.tree
                    .add(NodeKind::Continue, self.span_of(stmt), Some(parent))
            }
            // match statements and anything newer than the modeled grammar
            _ => self
                .tree
                .add(NodeKind::Unknown, self.span_of(stmt), Some(parent)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn function_def(
        &mut self,
        stmt: &ast::Stmt,
        name: &str,
        args: &ast::Arguments,
        body: &[ast::Stmt],
        decorator_list: &[ast::Expr],
        returns: Option<&ast::Expr>,
        is_async: bool,
        parent: NodeId,
        scope: NodeId,
    ) -> NodeId {
        let whole = self.span_of(stmt);
        let from_line = match decorator_list.last() {
            Some(last) => self.span_of(last).to_line + 1,
            None => whole.from_line,
        };
        let id = self.tree.add(
            NodeKind::FunctionDef {
                name: name.to_string(),
                params: vec![],
                body: vec![],
                decorators: None,
                returns: None,
                is_async,
            },
            Span::lines(from_line, whole.to_line),
            Some(parent),
        );
        self.bind(scope, name, id);
        self.tree.init_scope(id, format!("function '{name}'"));

        let decorators_id = self.decorators(decorator_list, id, scope);
        let param_ids = self.params(args, id);
        let returns_id = returns.map(|r| self.expr(r, id, scope));

        // header ends where the last parameter/annotation does
        let mut block_start = from_line;
        for &param in &param_ids {
            block_start = block_start.max(self.tree.span(param).to_line);
        }
        if let Some(r) = returns_id {
            block_start = block_start.max(self.tree.span(r).to_line);
        }
        self.tree.node_mut(id).span.block_start_line = Some(block_start);

        // a function directly inside a class is a method; remember its
        // receiver parameter while building the body
        let is_method = self.tree.node(scope).tag() == NodeTag::ClassDef;
        if is_method {
            if let Some(receiver) = first_param_name(args) {
                self.method_receivers.push((scope, receiver));
            }
        }
        let body_ids = self.stmts(body, id, id);
        if is_method && first_param_name(args).is_some() {
            self.method_receivers.pop();
        }

        if let NodeKind::FunctionDef {
            params,
            body,
            decorators,
            returns,
            ..
        } = &mut self.tree.node_mut(id).kind
        {
            *params = param_ids;
            *body = body_ids;
            *decorators = decorators_id;
            *returns = returns_id;
        }
        self.tree.widen_from_children(id);
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn class_def(
        &mut self,
        stmt: &ast::Stmt,
        name: &str,
        bases: &[ast::Expr],
        keywords: &[ast::Keyword],
        body: &[ast::Stmt],
        decorator_list: &[ast::Expr],
        parent: NodeId,
        scope: NodeId,
    ) -> NodeId {
        let whole = self.span_of(stmt);
        let from_line = match decorator_list.last() {
            Some(last) => self.span_of(last).to_line + 1,
            None => whole.from_line,
        };
        let id = self.tree.add(
            NodeKind::ClassDef {
                name: name.to_string(),
                bases: vec![],
                keywords: vec![],
                body: vec![],
                decorators: None,
            },
            Span::lines(from_line, whole.to_line),
            Some(parent),
        );
        self.bind(scope, name, id);
        self.tree.init_scope(id, format!("class '{name}'"));

        let decorators_id = self.decorators(decorator_list, id, scope);
        let base_ids: Vec<NodeId> = bases.iter().map(|b| self.expr(b, id, scope)).collect();
        let keyword_ids: Vec<NodeId> = keywords
            .iter()
            .map(|k| self.keyword(k, id, scope))
            .collect();

        let mut block_start = from_line;
        for &header in base_ids.iter().chain(&keyword_ids) {
            block_start = block_start.max(self.tree.span(header).to_line);
        }
        self.tree.node_mut(id).span.block_start_line = Some(block_start);

        let body_ids = self.stmts(body, id, id);
        if let NodeKind::ClassDef {
            bases,
            keywords,
            body,
            decorators,
            ..
        } = &mut self.tree.node_mut(id).kind
        {
            *bases = base_ids;
            *keywords = keyword_ids;
            *body = body_ids;
            *decorators = decorators_id;
        }
        self.tree.widen_from_children(id);
        id
    }

    fn decorators(
        &mut self,
        decorator_list: &[ast::Expr],
        parent: NodeId,
        scope: NodeId,
    ) -> Option<NodeId> {
        if decorator_list.is_empty() {
            return None;
        }
        let first = self.span_of(&decorator_list[0]);
        let last = self.span_of(decorator_list.last().unwrap());
        let id = self.tree.add(
            NodeKind::Decorators { items: vec![] },
            Span::lines(first.from_line, last.to_line),
            Some(parent),
        );
        let items: Vec<NodeId> = decorator_list
            .iter()
            .map(|d| self.expr(d, id, scope))
            .collect();
        if let NodeKind::Decorators { items: slot } = &mut self.tree.node_mut(id).kind {
            *slot = items;
        }
        Some(id)
    }

    /// Build parameter nodes and bind their names in the function scope.
    /// Each parameter carries its own default in the grammar.
    fn params(&mut self, args: &ast::Arguments, func: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for arg in args.posonlyargs.iter().chain(&args.args) {
            ids.push(self.param(&arg.def, arg.default.as_deref(), func));
        }
        if let Some(vararg) = &args.vararg {
            ids.push(self.param(vararg, None, func));
        }
        for arg in &args.kwonlyargs {
            ids.push(self.param(&arg.def, arg.default.as_deref(), func));
        }
        if let Some(kwarg) = &args.kwarg {
            ids.push(self.param(kwarg, None, func));
        }
        ids
    }

    fn param(&mut self, arg: &ast::Arg, default: Option<&ast::Expr>, func: NodeId) -> NodeId {
        let id = self.tree.add(
            NodeKind::Param {
                name: arg.arg.to_string(),
                annotation: None,
                default: None,
            },
            self.span_of(arg),
            Some(func),
        );
        self.bind(func, arg.arg.as_str(), id);
        let annotation_id = arg.annotation.as_deref().map(|a| self.expr(a, id, func));
        let default_id = default.map(|d| self.expr(d, id, func));
        if let NodeKind::Param {
            annotation,
            default,
            ..
        } = &mut self.tree.node_mut(id).kind
        {
            *annotation = annotation_id;
            *default = default_id;
        }
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn compound_test(
        &mut self,
        stmt: &ast::Stmt,
        test: &ast::Expr,
        body: &[ast::Stmt],
        orelse: &[ast::Stmt],
        parent: NodeId,
        scope: NodeId,
        is_while: bool,
    ) -> NodeId {
        let kind = if is_while {
            NodeKind::While {
                test: NodeId::from_raw(0),
                body: vec![],
                orelse: vec![],
            }
        } else {
            NodeKind::If {
                test: NodeId::from_raw(0),
                body: vec![],
                orelse: vec![],
            }
        };
        let id = self.tree.add(kind, self.span_of(stmt), Some(parent));
        let test_id = self.expr(test, id, scope);
        let block_start = self.tree.span(test_id).to_line;
        self.tree.node_mut(id).span.block_start_line = Some(block_start);
        let body_ids = self.stmts(body, id, scope);
        let orelse_ids = self.stmts(orelse, id, scope);
        match &mut self.tree.node_mut(id).kind {
            NodeKind::If { test, body, orelse } | NodeKind::While { test, body, orelse } => {
                *test = test_id;
                *body = body_ids;
                *orelse = orelse_ids;
            }
            _ => unreachable!(),
        }
        self.tree.widen_from_children(id);
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn for_stmt(
        &mut self,
        stmt: &ast::Stmt,
        target: &ast::Expr,
        iter: &ast::Expr,
        body: &[ast::Stmt],
        orelse: &[ast::Stmt],
        is_async: bool,
        parent: NodeId,
        scope: NodeId,
    ) -> NodeId {
        let id = self.tree.add(
            NodeKind::For {
                target: NodeId::from_raw(0),
                iter: NodeId::from_raw(0),
                body: vec![],
                orelse: vec![],
                is_async,
            },
            self.span_of(stmt),
            Some(parent),
        );
        let iter_id = self.expr(iter, id, scope);
        let target_id = self.target(target, id, scope);
        let block_start = self.tree.span(iter_id).to_line;
        self.tree.node_mut(id).span.block_start_line = Some(block_start);
        let body_ids = self.stmts(body, id, scope);
        let orelse_ids = self.stmts(orelse, id, scope);
        if let NodeKind::For {
            target,
            iter,
            body,
            orelse,
            ..
        } = &mut self.tree.node_mut(id).kind
        {
            *target = target_id;
            *iter = iter_id;
            *body = body_ids;
            *orelse = orelse_ids;
        }
        self.tree.widen_from_children(id);
        id
    }

    fn with_stmt(
        &mut self,
        stmt: &ast::Stmt,
        items: &[ast::WithItem],
        body: &[ast::Stmt],
        is_async: bool,
        parent: NodeId,
        scope: NodeId,
    ) -> NodeId {
        let id = self.tree.add(
            NodeKind::With {
                items: vec![],
                body: vec![],
                is_async,
            },
            self.span_of(stmt),
            Some(parent),
        );
        let mut item_ids = Vec::new();
        let mut block_start = self.span_of(stmt).from_line;
        for item in items {
            let context_span = self.span_of(&item.context_expr);
            let item_id = self.tree.add(
                NodeKind::WithItem {
                    context: NodeId::from_raw(0),
                    vars: None,
                },
                context_span,
                Some(id),
            );
            let context_id = self.expr(&item.context_expr, item_id, scope);
            let vars_id = item
                .optional_vars
                .as_deref()
                .map(|v| self.target(v, item_id, scope));
            self.tree.widen_from_children(item_id);
            block_start = block_start.max(self.tree.span(item_id).to_line);
            if let NodeKind::WithItem { context, vars } = &mut self.tree.node_mut(item_id).kind {
                *context = context_id;
                *vars = vars_id;
            }
            item_ids.push(item_id);
        }
        self.tree.node_mut(id).span.block_start_line = Some(block_start);
        let body_ids = self.stmts(body, id, scope);
        if let NodeKind::With { items, body, .. } = &mut self.tree.node_mut(id).kind {
            *items = item_ids;
            *body = body_ids;
        }
        self.tree.widen_from_children(id);
        id
    }

    fn except_handler(
        &mut self,
        handler: &ExceptHandler,
        parent: NodeId,
        scope: NodeId,
    ) -> NodeId {
        let ExceptHandler::ExceptHandler(ast::ExceptHandlerExceptHandler {
            type_,
            name,
            body,
            ..
        }) = handler;
        let span = self.span_of(handler);
        let id = self.tree.add(
            NodeKind::ExceptHandler {
                typ: None,
                name: None,
                body: vec![],
            },
            span,
            Some(parent),
        );
        let typ_id = type_.as_deref().map(|t| self.expr(t, id, scope));
        let block_start = typ_id
            .map(|t| self.tree.span(t).to_line)
            .unwrap_or(span.from_line);
        self.tree.node_mut(id).span.block_start_line = Some(block_start);
        let name_id = name.as_ref().map(|n| {
            let bound = self.tree.add(
                NodeKind::AssignName {
                    name: n.to_string(),
                },
                Span::lines(span.from_line, block_start),
                Some(id),
            );
            self.bind(scope, n.as_str(), bound);
            bound
        });
        let body_ids = self.stmts(body, id, scope);
        if let NodeKind::ExceptHandler { typ, name, body } = &mut self.tree.node_mut(id).kind {
            *typ = typ_id;
            *name = name_id;
            *body = body_ids;
        }
        self.tree.widen_from_children(id);
        id
    }

    // ------------------------------------------------------------------
    // Binding targets
    // ------------------------------------------------------------------

    fn target(&mut self, expr: &ast::Expr, parent: NodeId, scope: NodeId) -> NodeId {
        match expr {
            ast::Expr::Name(ast::ExprName { id: name, .. }) => {
                let id = self.tree.add(
                    NodeKind::AssignName {
                        name: name.to_string(),
                    },
                    self.span_of(expr),
                    Some(parent),
                );
                self.bind(scope, name.as_str(), id);
                id
            }
            ast::Expr::Tuple(ast::ExprTuple { elts, .. }) => {
                let id = self.tree.add(
                    NodeKind::Tuple { elts: vec![] },
                    self.span_of(expr),
                    Some(parent),
                );
                let elt_ids: Vec<NodeId> = elts.iter().map(|e| self.target(e, id, scope)).collect();
                if let NodeKind::Tuple { elts } = &mut self.tree.node_mut(id).kind {
                    *elts = elt_ids;
                }
                id
            }
            ast::Expr::List(ast::ExprList { elts, .. }) => {
                let id = self.tree.add(
                    NodeKind::List { elts: vec![] },
                    self.span_of(expr),
                    Some(parent),
                );
                let elt_ids: Vec<NodeId> = elts.iter().map(|e| self.target(e, id, scope)).collect();
                if let NodeKind::List { elts } = &mut self.tree.node_mut(id).kind {
                    *elts = elt_ids;
                }
                id
            }
            ast::Expr::Starred(ast::ExprStarred { value, .. }) => {
                let id = self.tree.add(
                    NodeKind::Starred {
                        value: NodeId::from_raw(0),
                    },
                    self.span_of(expr),
                    Some(parent),
                );
                let value_id = self.target(value, id, scope);
                if let NodeKind::Starred { value } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                }
                id
            }
            ast::Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                let id = self.tree.add(
                    NodeKind::AssignAttr {
                        receiver: NodeId::from_raw(0),
                        attr: attr.to_string(),
                    },
                    self.span_of(expr),
                    Some(parent),
                );
                let receiver_id = self.expr(value, id, scope);
                if let NodeKind::AssignAttr { receiver, .. } = &mut self.tree.node_mut(id).kind {
                    *receiver = receiver_id;
                }
                self.record_instance_attr(value, attr.as_str(), id);
                id
            }
            other => self.expr(other, parent, scope),
        }
    }

    /// `self.<attr> = …` inside a method lands in the class's
    /// instance-attribute table. Only class scopes have such a table, so
    /// receivers that infer to built-in values can never be polluted.
    fn record_instance_attr(&mut self, receiver: &ast::Expr, attr: &str, binding: NodeId) {
        let ast::Expr::Name(ast::ExprName { id: name, .. }) = receiver else {
            return;
        };
        let Some((class_scope, receiver_name)) = self.method_receivers.last() else {
            return;
        };
        if name.as_str() != receiver_name {
            return;
        }
        let class_scope = *class_scope;
        if let Some(info) = self.tree.scope_info_mut(class_scope) {
            info.add_instance_attr(attr, binding);
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self, expr: &ast::Expr, parent: NodeId, scope: NodeId) -> NodeId {
        let span = self.span_of(expr);
        match expr {
            ast::Expr::Name(ast::ExprName { id: name, .. }) => self.tree.add(
                NodeKind::Name {
                    name: name.to_string(),
                },
                span,
                Some(parent),
            ),
            ast::Expr::Constant(ast::ExprConstant { value, .. }) => {
                let kind = match const_value(value) {
                    Some(value) => NodeKind::Const { value },
                    None => NodeKind::Unknown,
                };
                self.tree.add(kind, span, Some(parent))
            }
            ast::Expr::Attribute(ast::ExprAttribute { value, attr, .. }) => {
                let id = self.tree.add(
                    NodeKind::Attribute {
                        receiver: NodeId::from_raw(0),
                        attr: attr.to_string(),
                    },
                    span,
                    Some(parent),
                );
                let receiver_id = self.expr(value, id, scope);
                if let NodeKind::Attribute { receiver, .. } = &mut self.tree.node_mut(id).kind {
                    *receiver = receiver_id;
                }
                id
            }
            ast::Expr::Call(ast::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                let id = self.tree.add(
                    NodeKind::Call {
                        func: NodeId::from_raw(0),
                        args: vec![],
                        keywords: vec![],
                    },
                    span,
                    Some(parent),
                );
                let func_id = self.expr(func, id, scope);
                let arg_ids: Vec<NodeId> = args.iter().map(|a| self.expr(a, id, scope)).collect();
                let keyword_ids: Vec<NodeId> = keywords
                    .iter()
                    .map(|k| self.keyword(k, id, scope))
                    .collect();
                if let NodeKind::Call {
                    func,
                    args,
                    keywords,
                } = &mut self.tree.node_mut(id).kind
                {
                    *func = func_id;
                    *args = arg_ids;
                    *keywords = keyword_ids;
                }
                id
            }
            ast::Expr::BinOp(ast::ExprBinOp {
                left, op, right, ..
            }) => {
                let id = self.tree.add(
                    NodeKind::BinOp {
                        left: NodeId::from_raw(0),
                        op: binary_op(op),
                        right: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let left_id = self.expr(left, id, scope);
                let right_id = self.expr(right, id, scope);
                if let NodeKind::BinOp { left, right, .. } = &mut self.tree.node_mut(id).kind {
                    *left = left_id;
                    *right = right_id;
                }
                id
            }
            ast::Expr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
                let id = self.tree.add(
                    NodeKind::UnaryOp {
                        op: unary_op(op),
                        operand: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let operand_id = self.expr(operand, id, scope);
                if let NodeKind::UnaryOp { operand, .. } = &mut self.tree.node_mut(id).kind {
                    *operand = operand_id;
                }
                id
            }
            ast::Expr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
                let id = self.tree.add(
                    NodeKind::BoolOp {
                        op: match op {
                            ast::BoolOp::And => BoolOpKind::And,
                            ast::BoolOp::Or => BoolOpKind::Or,
                        },
                        values: vec![],
                    },
                    span,
                    Some(parent),
                );
                let value_ids: Vec<NodeId> =
                    values.iter().map(|v| self.expr(v, id, scope)).collect();
                if let NodeKind::BoolOp { values, .. } = &mut self.tree.node_mut(id).kind {
                    *values = value_ids;
                }
                id
            }
            ast::Expr::Compare(ast::ExprCompare {
                left,
                ops,
                comparators,
                ..
            }) => {
                let id = self.tree.add(
                    NodeKind::Compare {
                        left: NodeId::from_raw(0),
                        ops: ops.iter().map(compare_op).collect(),
                        comparators: vec![],
                    },
                    span,
                    Some(parent),
                );
                let left_id = self.expr(left, id, scope);
                let comparator_ids: Vec<NodeId> =
                    comparators.iter().map(|c| self.expr(c, id, scope)).collect();
                if let NodeKind::Compare {
                    left, comparators, ..
                } = &mut self.tree.node_mut(id).kind
                {
                    *left = left_id;
                    *comparators = comparator_ids;
                }
                id
            }
            ast::Expr::IfExp(ast::ExprIfExp {
                test, body, orelse, ..
            }) => {
                let id = self.tree.add(
                    NodeKind::IfExp {
                        test: NodeId::from_raw(0),
                        body: NodeId::from_raw(0),
                        orelse: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let test_id = self.expr(test, id, scope);
                let body_id = self.expr(body, id, scope);
                let orelse_id = self.expr(orelse, id, scope);
                if let NodeKind::IfExp { test, body, orelse } = &mut self.tree.node_mut(id).kind {
                    *test = test_id;
                    *body = body_id;
                    *orelse = orelse_id;
                }
                id
            }
            ast::Expr::Tuple(ast::ExprTuple { elts, .. }) => self.sequence(
                NodeKind::Tuple { elts: vec![] },
                elts,
                span,
                parent,
                scope,
            ),
            ast::Expr::List(ast::ExprList { elts, .. }) => {
                self.sequence(NodeKind::List { elts: vec![] }, elts, span, parent, scope)
            }
            ast::Expr::Set(ast::ExprSet { elts, .. }) => {
                self.sequence(NodeKind::Set { elts: vec![] }, elts, span, parent, scope)
            }
            ast::Expr::Dict(ast::ExprDict { keys, values, .. }) => {
                let id = self.tree.add(
                    NodeKind::Dict {
                        keys: vec![],
                        values: vec![],
                    },
                    span,
                    Some(parent),
                );
                let key_ids: Vec<Option<NodeId>> = keys
                    .iter()
                    .map(|k| k.as_ref().map(|k| self.expr(k, id, scope)))
                    .collect();
                let value_ids: Vec<NodeId> =
                    values.iter().map(|v| self.expr(v, id, scope)).collect();
                if let NodeKind::Dict { keys, values } = &mut self.tree.node_mut(id).kind {
                    *keys = key_ids;
                    *values = value_ids;
                }
                id
            }
            ast::Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                let id = self.tree.add(
                    NodeKind::Subscript {
                        value: NodeId::from_raw(0),
                        index: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                let index_id = self.expr(slice, id, scope);
                if let NodeKind::Subscript { value, index } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                    *index = index_id;
                }
                id
            }
            ast::Expr::Starred(ast::ExprStarred { value, .. }) => {
                let id = self.tree.add(
                    NodeKind::Starred {
                        value: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                if let NodeKind::Starred { value } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                }
                id
            }
            ast::Expr::Slice(ast::ExprSlice {
                lower, upper, step, ..
            }) => {
                let id = self.tree.add(
                    NodeKind::Slice {
                        lower: None,
                        upper: None,
                        step: None,
                    },
                    span,
                    Some(parent),
                );
                let lower_id = lower.as_deref().map(|e| self.expr(e, id, scope));
                let upper_id = upper.as_deref().map(|e| self.expr(e, id, scope));
                let step_id = step.as_deref().map(|e| self.expr(e, id, scope));
                if let NodeKind::Slice { lower, upper, step } = &mut self.tree.node_mut(id).kind {
                    *lower = lower_id;
                    *upper = upper_id;
                    *step = step_id;
                }
                id
            }
            ast::Expr::NamedExpr(ast::ExprNamedExpr { target, value, .. }) => {
                let id = self.tree.add(
                    NodeKind::NamedExpr {
                        target: NodeId::from_raw(0),
                        value: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                let target_id = self.target(target, id, scope);
                if let NodeKind::NamedExpr { target, value } = &mut self.tree.node_mut(id).kind {
                    *target = target_id;
                    *value = value_id;
                }
                id
            }
            ast::Expr::Lambda(ast::ExprLambda { args, body, .. }) => {
                let id = self.tree.add(
                    NodeKind::Lambda {
                        params: vec![],
                        body: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                self.tree.init_scope(id, "lambda".to_string());
                let param_ids = self.params(args, id);
                let body_id = self.expr(body, id, id);
                if let NodeKind::Lambda { params, body } = &mut self.tree.node_mut(id).kind {
                    *params = param_ids;
                    *body = body_id;
                }
                id
            }
            ast::Expr::ListComp(ast::ExprListComp {
                elt, generators, ..
            }) => self.comprehension_expr(
                NodeKind::ListComp {
                    elt: NodeId::from_raw(0),
                    generators: vec![],
                },
                Some(elt),
                None,
                generators,
                span,
                parent,
            ),
            ast::Expr::SetComp(ast::ExprSetComp {
                elt, generators, ..
            }) => self.comprehension_expr(
                NodeKind::SetComp {
                    elt: NodeId::from_raw(0),
                    generators: vec![],
                },
                Some(elt),
                None,
                generators,
                span,
                parent,
            ),
            ast::Expr::GeneratorExp(ast::ExprGeneratorExp {
                elt, generators, ..
            }) => self.comprehension_expr(
                NodeKind::GeneratorExp {
                    elt: NodeId::from_raw(0),
                    generators: vec![],
                },
                Some(elt),
                None,
                generators,
                span,
                parent,
            ),
            ast::Expr::DictComp(ast::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => self.comprehension_expr(
                NodeKind::DictComp {
                    key: NodeId::from_raw(0),
                    value: NodeId::from_raw(0),
                    generators: vec![],
                },
                Some(key),
                Some(value),
                generators,
                span,
                parent,
            ),
            ast::Expr::Await(ast::ExprAwait { value, .. }) => {
                let id = self.tree.add(
                    NodeKind::Await {
                        value: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                if let NodeKind::Await { value } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                }
                id
            }
            ast::Expr::Yield(ast::ExprYield { value, .. }) => {
                let id = self
                    .tree
                    .add(NodeKind::Yield { value: None }, span, Some(parent));
                let value_id = value.as_deref().map(|v| self.expr(v, id, scope));
                if let NodeKind::Yield { value } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                }
                id
            }
            ast::Expr::YieldFrom(ast::ExprYieldFrom { value, .. }) => {
                let id = self.tree.add(
                    NodeKind::YieldFrom {
                        value: NodeId::from_raw(0),
                    },
                    span,
                    Some(parent),
                );
                let value_id = self.expr(value, id, scope);
                if let NodeKind::YieldFrom { value } = &mut self.tree.node_mut(id).kind {
                    *value = value_id;
                }
                id
            }
            // f-strings and anything else the engine does not model
            _ => self.tree.add(NodeKind::Unknown, span, Some(parent)),
        }
    }

    fn sequence(
        &mut self,
        kind: NodeKind,
        elts: &[ast::Expr],
        span: Span,
        parent: NodeId,
        scope: NodeId,
    ) -> NodeId {
        let id = self.tree.add(kind, span, Some(parent));
        let elt_ids: Vec<NodeId> = elts.iter().map(|e| self.expr(e, id, scope)).collect();
        match &mut self.tree.node_mut(id).kind {
            NodeKind::Tuple { elts } | NodeKind::List { elts } | NodeKind::Set { elts } => {
                *elts = elt_ids;
            }
            _ => unreachable!(),
        }
        id
    }

    fn keyword(&mut self, keyword: &ast::Keyword, parent: NodeId, scope: NodeId) -> NodeId {
        let span = self.span_of(&keyword.value);
        let id = self.tree.add(
            NodeKind::Keyword {
                name: keyword.arg.as_ref().map(|a| a.to_string()),
                value: NodeId::from_raw(0),
            },
            span,
            Some(parent),
        );
        let value_id = self.expr(&keyword.value, id, scope);
        if let NodeKind::Keyword { value, .. } = &mut self.tree.node_mut(id).kind {
            *value = value_id;
        }
        id
    }

    /// Comprehensions are their own scope: the loop variable binds there
    /// and is invisible from the enclosing scope's table.
    fn comprehension_expr(
        &mut self,
        kind: NodeKind,
        first: Option<&ast::Expr>,
        second: Option<&ast::Expr>,
        generators: &[ast::Comprehension],
        span: Span,
        parent: NodeId,
    ) -> NodeId {
        let id = self.tree.add(kind, span, Some(parent));
        self.tree.init_scope(id, "comprehension".to_string());
        let mut generator_ids = Vec::new();
        for generator in generators {
            let target_span = self.span_of(&generator.target);
            let gen_id = self.tree.add(
                NodeKind::Comprehension {
                    target: NodeId::from_raw(0),
                    iter: NodeId::from_raw(0),
                    ifs: vec![],
                    is_async: generator.is_async,
                },
                target_span,
                Some(id),
            );
            let iter_id = self.expr(&generator.iter, gen_id, id);
            let target_id = self.target(&generator.target, gen_id, id);
            let if_ids: Vec<NodeId> = generator
                .ifs
                .iter()
                .map(|e| self.expr(e, gen_id, id))
                .collect();
            self.tree.widen_from_children(gen_id);
            if let NodeKind::Comprehension {
                target, iter, ifs, ..
            } = &mut self.tree.node_mut(gen_id).kind
            {
                *target = target_id;
                *iter = iter_id;
                *ifs = if_ids;
            }
            generator_ids.push(gen_id);
        }
        let first_id = first.map(|e| self.expr(e, id, id));
        let second_id = second.map(|e| self.expr(e, id, id));
        match &mut self.tree.node_mut(id).kind {
            NodeKind::ListComp {
                elt, generators, ..
            }
            | NodeKind::SetComp {
                elt, generators, ..
            }
            | NodeKind::GeneratorExp {
                elt, generators, ..
            } => {
                *elt = first_id.expect("elt built above");
                *generators = generator_ids;
            }
            NodeKind::DictComp {
                key,
                value,
                generators,
            } => {
                *key = first_id.expect("key built above");
                *value = second_id.expect("value built above");
                *generators = generator_ids;
            }
            _ => unreachable!(),
        }
        id
    }
}

// ============================================================================
// Operator conversions
// ============================================================================

fn binary_op(op: &ast::Operator) -> BinaryOp {
    match op {
        ast::Operator::Add => BinaryOp::Add,
        ast::Operator::Sub => BinaryOp::Sub,
        ast::Operator::Mult => BinaryOp::Mult,
        ast::Operator::MatMult => BinaryOp::MatMult,
        ast::Operator::Div => BinaryOp::Div,
        ast::Operator::Mod => BinaryOp::Mod,
        ast::Operator::Pow => BinaryOp::Pow,
        ast::Operator::LShift => BinaryOp::LShift,
        ast::Operator::RShift => BinaryOp::RShift,
        ast::Operator::BitOr => BinaryOp::BitOr,
        ast::Operator::BitXor => BinaryOp::BitXor,
        ast::Operator::BitAnd => BinaryOp::BitAnd,
        ast::Operator::FloorDiv => BinaryOp::FloorDiv,
    }
}

fn unary_op(op: &ast::UnaryOp) -> UnaryOpKind {
    match op {
        ast::UnaryOp::Invert => UnaryOpKind::Invert,
        ast::UnaryOp::Not => UnaryOpKind::Not,
        ast::UnaryOp::UAdd => UnaryOpKind::UAdd,
        ast::UnaryOp::USub => UnaryOpKind::USub,
    }
}

fn compare_op(op: &ast::CmpOp) -> CompareOp {
    match op {
        ast::CmpOp::Eq => CompareOp::Eq,
        ast::CmpOp::NotEq => CompareOp::NotEq,
        ast::CmpOp::Lt => CompareOp::Lt,
        ast::CmpOp::LtE => CompareOp::LtE,
        ast::CmpOp::Gt => CompareOp::Gt,
        ast::CmpOp::GtE => CompareOp::GtE,
        ast::CmpOp::Is => CompareOp::Is,
        ast::CmpOp::IsNot => CompareOp::IsNot,
        ast::CmpOp::In => CompareOp::In,
        ast::CmpOp::NotIn => CompareOp::NotIn,
    }
}

fn import_alias(alias: &ast::Alias) -> ImportAlias {
    ImportAlias {
        name: alias.name.to_string(),
        asname: alias.asname.as_ref().map(|a| a.to_string()),
    }
}

fn const_value(constant: &Constant) -> Option<ConstValue> {
    match constant {
        Constant::None => Some(ConstValue::None),
        Constant::Bool(b) => Some(ConstValue::Bool(*b)),
        Constant::Str(s) => Some(ConstValue::Str(s.clone())),
        Constant::Bytes(b) => Some(ConstValue::Bytes(b.clone())),
        Constant::Int(i) => {
            let text = i.to_string();
            Some(match text.parse::<i64>() {
                Ok(v) => ConstValue::Int(v),
                Err(_) => ConstValue::BigInt(text),
            })
        }
        Constant::Float(f) => Some(ConstValue::Float(*f)),
        Constant::Complex { .. } => Some(ConstValue::Complex),
        Constant::Ellipsis => Some(ConstValue::Ellipsis),
        // folded tuple constants and anything newer
        _ => None,
    }
}

fn first_param_name(args: &ast::Arguments) -> Option<String> {
    args.posonlyargs
        .first()
        .or_else(|| args.args.first())
        .map(|arg| arg.def.arg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(source: &str) -> Module {
        build_from_text(source, "m").expect("build")
    }

    #[test]
    fn null_bytes_are_a_syntax_error() {
        let err = build_from_text("\0", "m").unwrap_err();
        assert!(err.message.contains("null bytes"));
    }

    #[test]
    fn invalid_escape_is_a_syntax_error() {
        assert!(build_from_text("\"\\x1\"", "m").is_err());
    }

    #[test]
    fn missing_trailing_newline_is_fine() {
        let module = build("x = 1");
        assert!(module.has_local("x"));
    }

    #[test]
    fn root_span_starts_at_zero() {
        let module = build("x = 1\ny = 2\n");
        assert_eq!(module.tree.span(module.root()).from_line, 0);
    }

    #[test]
    fn spans_contain_children_except_decorators() {
        let source = "\
def f(a,\n      b):\n    return a + b\n\nclass C(dict,\n        object):\n    pass\n";
        let module = build(source);
        let tree = &module.tree;
        for id in tree.ids() {
            let span = tree.span(id);
            for &child in tree.children(id) {
                if matches!(tree.kind(child), NodeKind::Decorators { .. }) {
                    continue;
                }
                assert!(
                    span.contains(&tree.span(child)),
                    "span of {:?} does not contain child {:?}",
                    tree.kind(id),
                    tree.kind(child)
                );
            }
        }
    }

    #[test]
    fn multiline_call_spans() {
        let source = "fonction(1,\n         2,\n         3,\n         4)\n";
        let module = build(source);
        let stmt = module.body()[0];
        let span = module.tree.span(stmt);
        assert_eq!((span.from_line, span.to_line), (1, 4));
        let NodeKind::ExprStmt { value } = module.tree.kind(stmt) else {
            panic!("expected expression statement");
        };
        let call_span = module.tree.span(*value);
        assert_eq!((call_span.from_line, call_span.to_line), (1, 4));
    }

    #[test]
    fn decorated_function_spans() {
        let source = "@decorator\ndef function(\n    arg):\n    print(arg)\n";
        let module = build(source);
        let func = module.body()[0];
        let span = module.tree.span(func);
        assert_eq!((span.from_line, span.to_line), (2, 4));
        let NodeKind::FunctionDef { decorators, .. } = module.tree.kind(func) else {
            panic!("expected function");
        };
        let dec_span = module.tree.span(decorators.unwrap());
        assert_eq!((dec_span.from_line, dec_span.to_line), (1, 1));
    }

    #[test]
    fn class_block_start_is_last_base_line() {
        let source = "class debile(dict,\n             object):\n    pass\n";
        let module = build(source);
        let class = module.body()[0];
        let span = module.tree.span(class);
        assert_eq!((span.from_line, span.to_line), (1, 3));
        assert_eq!(span.block_start_line, Some(2));
    }

    #[test]
    fn if_else_spans() {
        let source = "if aaaa: pass\nelse:\n    aaaa, bbbb = 1, 2\n    aaaa, bbbb = bbbb, aaaa\n";
        let module = build(source);
        let if_ = module.body()[0];
        let span = module.tree.span(if_);
        assert_eq!((span.from_line, span.to_line), (1, 4));
        assert_eq!(span.block_start_line, Some(1));
    }

    #[test]
    fn for_with_else_spans() {
        let source = "for a in range(4):\n    print(a)\n    break\nelse:\n    print(\"bouh\")\n";
        let module = build(source);
        let for_ = module.body()[0];
        let span = module.tree.span(for_);
        assert_eq!((span.from_line, span.to_line), (1, 5));
        assert_eq!(span.block_start_line, Some(1));
    }

    #[test]
    fn try_finally_spans() {
        let source = "try:\n    print(a)\nexcept Exception:\n    pass\nfinally:\n    print(\"bouh\")\n";
        let module = build(source);
        let try_ = module.body()[0];
        let span = module.tree.span(try_);
        assert_eq!((span.from_line, span.to_line), (1, 6));
        assert_eq!(span.block_start_line, Some(1));
        let NodeKind::Try { handlers, .. } = module.tree.kind(try_) else {
            panic!("expected try");
        };
        let handler_span = module.tree.span(handlers[0]);
        assert_eq!((handler_span.from_line, handler_span.to_line), (3, 4));
        assert_eq!(handler_span.block_start_line, Some(3));
    }

    #[test]
    fn with_spans() {
        let source = "with open(\"/tmp/pouet\") as f:\n    print(f)\n";
        let module = build(source);
        let with = module.body()[0];
        let span = module.tree.span(with);
        assert_eq!((span.from_line, span.to_line), (1, 2));
        assert_eq!(span.block_start_line, Some(1));
        assert!(module.has_local("f"));
    }

    #[test]
    fn global_redirects_subsequent_bindings() {
        let source = "\
CSTE = 1\n\ndef update_global():\n    global CSTE\n    CSTE += 1\n\ndef global_no_effect():\n    global CSTE2\n    print(CSTE)\n";
        let module = build(source);
        let bindings = module.locals("CSTE").unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(module.tree.span(bindings[0]).from_line, 1);
        assert_eq!(module.tree.span(bindings[1]).from_line, 5);
        assert!(module.locals("CSTE2").is_err());
    }

    #[test]
    fn generator_variable_is_not_module_local() {
        let module = build("l = list(n for n in range(10))\n");
        assert!(module.has_local("l"));
        assert!(!module.has_local("n"));
    }

    #[test]
    fn tuple_unpacking_binds_every_name() {
        let module = build("a, b = range(2)\n");
        assert!(module.has_local("a"));
        assert!(module.has_local("b"));
    }

    #[test]
    fn parameter_defaults_attach_to_their_own_params() {
        let source = "def f(a, b=2, *rest, c=3, **kw):\n    pass\n";
        let module = build(source);
        let NodeKind::FunctionDef { params, .. } = module.tree.kind(module.body()[0]) else {
            panic!("expected function");
        };
        let defaults: Vec<(String, Option<ConstValue>)> = params
            .iter()
            .map(|&p| {
                let NodeKind::Param { name, default, .. } = module.tree.kind(p) else {
                    panic!("expected param");
                };
                let value = default.and_then(|d| match module.tree.kind(d) {
                    NodeKind::Const { value } => Some(value.clone()),
                    _ => None,
                });
                (name.clone(), value)
            })
            .collect();
        assert_eq!(
            defaults,
            [
                ("a".to_string(), None),
                ("b".to_string(), Some(ConstValue::Int(2))),
                ("rest".to_string(), None),
                ("c".to_string(), Some(ConstValue::Int(3))),
                ("kw".to_string(), None),
            ]
        );
    }

    #[test]
    fn future_imports_accumulate() {
        let module = build("import sys\n");
        assert!(module.future_features.is_empty());

        let module = build(
            "from __future__ import print_function\nfrom __future__ import absolute_import\n",
        );
        let mut features: Vec<&str> =
            module.future_features.iter().map(String::as_str).collect();
        features.sort_unstable();
        assert_eq!(features, ["absolute_import", "print_function"]);
    }

    #[test]
    fn self_attrs_land_in_instance_table() {
        let source = "\
class Counter:\n    v = 0\n    def inc(self):\n        self.count = 1\n";
        let module = build(source);
        let class = module.body()[0];
        let info = module.tree.scope_info(class).unwrap();
        assert!(info.has_local("v"));
        assert!(info.has_instance_attr("count"));
        assert!(!info.has_local("count"));
    }

    #[test]
    fn package_names_are_stripped() {
        let (name, package) = split_package_name("data.__init__");
        assert_eq!(name, "data");
        assert!(package);
        let (name, package) = split_package_name("data.tmp");
        assert_eq!(name, "data.tmp");
        assert!(!package);
    }

    #[test]
    fn unknown_cookie_encoding_fails() {
        let err = decode_source(b"# -*- coding: lala -*-\nx = 1\n", "m").unwrap_err();
        assert!(err.message.contains("unknown encoding"));
    }

    #[test]
    fn latin1_cookie_decodes() {
        let source = decode_source(b"# coding: latin-1\ns = '\xe9'\n", "m").unwrap();
        assert!(source.contains('\u{e9}'));
    }

    #[test]
    fn locals_are_in_source_order() {
        let source = "x = 1\nif cond:\n    x = 2\nelse:\n    x = 3\nx = 4\n";
        let module = build(source);
        let bindings = module.locals("x").unwrap();
        let lines: Vec<u32> = bindings
            .iter()
            .map(|&b| module.tree.span(b).from_line)
            .collect();
        assert_eq!(lines, [1, 3, 5, 6]);
    }
}
