//! The analysis environment: module resolution, caching, and the
//! extension registry.
//!
//! A [`Manager`] is an explicit value owned by the caller — two managers
//! are fully independent, with separate caches and registries. Everything
//! that customizes analysis hangs off it:
//!
//! * **transforms** rewrite nodes of a given tag after a build, gated by
//!   an optional predicate;
//! * **module extenders** append declarations to a named module when it
//!   is built from real source;
//! * **failed import hooks** get a chance to produce a module (typically
//!   synthesized from introspection) when path resolution fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use pyscry_core::{Module, ModuleOrigin, NodeId, NodeTag, Tree};

use crate::builder::{self, BuildError, SyntaxError};
use crate::runtime::RuntimeModule;
use crate::synth::{self, SynthError};

// ============================================================================
// Error Types
// ============================================================================

/// A module could not be turned into a tree. Distinct from
/// [`SyntaxError`]: the input here is the module system, not source text.
#[derive(Debug, Error)]
pub enum BuildingError {
    #[error("cannot resolve module '{0}'")]
    ModuleNotFound(String),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Synth(#[from] SynthError),
}

impl From<BuildError> for BuildingError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Syntax(err) => BuildingError::Syntax(err),
            BuildError::Read { path, source } => BuildingError::Read { path, source },
        }
    }
}

// ============================================================================
// Registry types
// ============================================================================

type TransformPredicate = Box<dyn Fn(&Tree, NodeId) -> bool>;
type TransformFn = Box<dyn Fn(&mut Tree, NodeId)>;

struct Transform {
    predicate: Option<TransformPredicate>,
    run: TransformFn,
}

/// Produces the extension module whose top-level declarations are grafted
/// onto the module being extended.
type ModuleExtender = Box<dyn Fn() -> Result<Module, SyntaxError>>;

/// Tried in registration order when a module cannot be resolved on disk.
/// `None` means "not mine"; the first hook that answers wins.
type FailedImportHook = Box<dyn Fn(&str) -> Option<Result<Module, BuildingError>>>;

// ============================================================================
// Manager
// ============================================================================

#[derive(Default)]
pub struct Manager {
    search_paths: Vec<PathBuf>,
    cache: HashMap<String, Rc<Module>>,
    /// Resolved (or known-unresolvable) module paths; avoids re-probing
    /// the search path on every import of the same name.
    path_cache: HashMap<String, Option<PathBuf>>,
    transforms: HashMap<NodeTag, Vec<Transform>>,
    extenders: HashMap<String, Vec<ModuleExtender>>,
    failed_import_hooks: Vec<FailedImportHook>,
}

impl Manager {
    pub fn new() -> Self {
        Manager::default()
    }

    pub fn with_search_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Manager {
            search_paths: paths.into_iter().collect(),
            ..Manager::default()
        }
    }

    /// Append a directory to the module search path.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
        self.path_cache.clear();
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_transform(
        &mut self,
        tag: NodeTag,
        run: impl Fn(&mut Tree, NodeId) + 'static,
    ) {
        self.transforms.entry(tag).or_default().push(Transform {
            predicate: None,
            run: Box::new(run),
        });
    }

    pub fn register_transform_with_predicate(
        &mut self,
        tag: NodeTag,
        predicate: impl Fn(&Tree, NodeId) -> bool + 'static,
        run: impl Fn(&mut Tree, NodeId) + 'static,
    ) {
        self.transforms.entry(tag).or_default().push(Transform {
            predicate: Some(Box::new(predicate)),
            run: Box::new(run),
        });
    }

    /// Drop the transforms registered for one node tag. Tests use this to
    /// undo their registrations.
    pub fn clear_transforms(&mut self, tag: NodeTag) {
        self.transforms.remove(&tag);
    }

    pub fn register_module_extender(
        &mut self,
        module_name: impl Into<String>,
        extender: impl Fn() -> Result<Module, SyntaxError> + 'static,
    ) {
        self.extenders
            .entry(module_name.into())
            .or_default()
            .push(Box::new(extender));
    }

    pub fn register_failed_import_hook(
        &mut self,
        hook: impl Fn(&str) -> Option<Result<Module, BuildingError>> + 'static,
    ) {
        self.failed_import_hooks.push(Box::new(hook));
    }

    /// Evict one module from the caches; the next request rebuilds it.
    pub fn invalidate(&mut self, module_name: &str) {
        self.cache.remove(module_name);
        self.path_cache.remove(module_name);
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.path_cache.clear();
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    /// Build a module from source text, run registered transforms and
    /// extenders, and cache the result under `module_name`.
    pub fn build_from_text(
        &mut self,
        source: &str,
        module_name: &str,
    ) -> Result<Rc<Module>, BuildingError> {
        let module = builder::build_from_text(source, module_name)?;
        Ok(self.finish(module, true))
    }

    /// Build a module from a file, honoring encoding declarations.
    pub fn build_from_path(
        &mut self,
        path: &Path,
        module_name: &str,
    ) -> Result<Rc<Module>, BuildingError> {
        let module = builder::build_from_path(path, module_name)?;
        Ok(self.finish(module, true))
    }

    /// Build a module from introspected object graphs: recovered source
    /// is used verbatim, everything else is synthesized into stub text.
    /// Extenders do not run: the stub already *is* the extension surface.
    pub fn build_from_live_objects(
        &mut self,
        module_name: &str,
        modules: &[RuntimeModule],
    ) -> Result<Rc<Module>, BuildingError> {
        let mut text = String::new();
        for module in modules {
            if !module.available {
                if module.optional {
                    debug!(module = %module.name, "skipping unavailable optional module");
                    continue;
                }
                return Err(SynthError::Unavailable(module.name.clone()).into());
            }
            match &module.source {
                Some(source) => text.push_str(source),
                None => text.push_str(&synth::object_stub(&module.name, &module.members)),
            }
        }
        debug!(module = module_name, bytes = text.len(), "synthesized stub");
        let module =
            builder::build_text_with_origin(&text, module_name, ModuleOrigin::Introspection)?;
        Ok(self.finish(module, false))
    }

    /// Resolve `module_name` to a tree: cache, then the search path, then
    /// the failed import hooks.
    pub fn ast_from_module_name(
        &mut self,
        module_name: &str,
    ) -> Result<Rc<Module>, BuildingError> {
        if let Some(module) = self.cache.get(module_name) {
            return Ok(Rc::clone(module));
        }
        if let Some(path) = self.file_from_module_name(module_name) {
            info!(module = module_name, path = %path.display(), "building from search path");
            return self.build_from_path(&path, module_name);
        }
        for hook in &self.failed_import_hooks {
            if let Some(result) = hook(module_name) {
                let module = result?;
                return Ok(self.finish(module, false));
            }
        }
        Err(BuildingError::ModuleNotFound(module_name.to_string()))
    }

    pub fn cached(&self, module_name: &str) -> Option<Rc<Module>> {
        self.cache.get(module_name).map(Rc::clone)
    }

    /// The file a module name resolves to on the search path, if any.
    /// Negative answers are cached too.
    pub fn file_from_module_name(&mut self, module_name: &str) -> Option<PathBuf> {
        if let Some(resolved) = self.path_cache.get(module_name) {
            return resolved.clone();
        }
        let resolved = self.resolve_path(module_name);
        self.path_cache
            .insert(module_name.to_string(), resolved.clone());
        resolved
    }

    fn resolve_path(&self, module_name: &str) -> Option<PathBuf> {
        let relative = module_name.replace('.', "/");
        for search_path in &self.search_paths {
            let file = search_path.join(format!("{relative}.py"));
            if file.is_file() {
                return Some(file);
            }
            let init = search_path.join(&relative).join("__init__.py");
            if init.is_file() {
                return Some(init);
            }
        }
        None
    }

    fn finish(&mut self, mut module: Module, run_extenders: bool) -> Rc<Module> {
        if run_extenders {
            self.apply_extenders(&mut module);
        }
        self.apply_transforms(&mut module.tree);
        let module = Rc::new(module);
        self.cache
            .insert(module.name.clone(), Rc::clone(&module));
        module
    }

    /// Graft each extension module's top-level declarations onto the
    /// module root. A failing extender is skipped; extension is additive
    /// and never breaks the base build.
    fn apply_extenders(&self, module: &mut Module) {
        let Some(extenders) = self.extenders.get(&module.name) else {
            return;
        };
        for extender in extenders {
            match extender() {
                Ok(extension) => {
                    let root = module.root();
                    module.tree.graft(&extension.tree, root);
                }
                Err(err) => {
                    tracing::warn!(module = %module.name, error = %err, "module extender failed");
                }
            }
        }
    }

    /// Post-order transform pass: children are rewritten before their
    /// parents. Nodes added by a transform are not revisited.
    fn apply_transforms(&self, tree: &mut Tree) {
        if self.transforms.is_empty() || tree.is_empty() {
            return;
        }
        for id in tree.postorder(tree.root()) {
            let tag = tree.node(id).tag();
            let Some(transforms) = self.transforms.get(&tag) else {
                continue;
            };
            for transform in transforms {
                let applies = match &transform.predicate {
                    Some(predicate) => predicate(tree, id),
                    None => true,
                };
                if applies {
                    (transform.run)(tree, id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyscry_core::{ConstValue, NodeKind};

    #[test]
    fn text_builds_are_cached_by_identity() {
        let mut manager = Manager::new();
        let first = manager.build_from_text("x = 1\n", "m").unwrap();
        let again = manager.ast_from_module_name("m").unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        manager.clear_cache();
        assert!(manager.cached("m").is_none());
    }

    #[test]
    fn unresolvable_module_is_an_error() {
        let mut manager = Manager::new();
        let err = manager.ast_from_module_name("no.such.module").unwrap_err();
        assert!(matches!(err, BuildingError::ModuleNotFound(name) if name == "no.such.module"));
    }

    #[test]
    fn modules_resolve_from_the_search_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alone.py"), "CONST = 42\n").unwrap();
        std::fs::create_dir(dir.path().join("pack")).unwrap();
        std::fs::write(dir.path().join("pack").join("__init__.py"), "y = 2\n").unwrap();

        let mut manager = Manager::new();
        manager.add_search_path(dir.path());
        let alone = manager.ast_from_module_name("alone").unwrap();
        assert!(alone.has_local("CONST"));
        assert!(!alone.package);
        let pack = manager.ast_from_module_name("pack").unwrap();
        assert!(pack.package);
    }

    #[test]
    fn transforms_rewrite_matching_nodes() {
        let mut manager = Manager::new();
        manager.register_transform(NodeTag::Const, |tree, id| {
            if let NodeKind::Const { value } = &mut tree.node_mut(id).kind {
                if *value == ConstValue::Int(1) {
                    *value = ConstValue::Int(2);
                }
            }
        });
        let module = manager.build_from_text("x = 1\ny = 5\n", "m").unwrap();
        let consts: Vec<ConstValue> = module
            .tree
            .ids()
            .filter_map(|id| match module.tree.kind(id) {
                NodeKind::Const { value } => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(consts, [ConstValue::Int(2), ConstValue::Int(5)]);
    }

    #[test]
    fn transform_predicates_gate_application() {
        let mut manager = Manager::new();
        manager.register_transform_with_predicate(
            NodeTag::FunctionDef,
            |tree, id| matches!(tree.kind(id), NodeKind::FunctionDef { name, .. } if name == "old"),
            |tree, id| {
                if let NodeKind::FunctionDef { name, .. } = &mut tree.node_mut(id).kind {
                    *name = "new".to_string();
                }
            },
        );
        let module = manager
            .build_from_text("def old(): pass\ndef other(): pass\n", "m")
            .unwrap();
        let names: Vec<&str> = module
            .tree
            .ids()
            .filter_map(|id| match module.tree.kind(id) {
                NodeKind::FunctionDef { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["new", "other"]);

        manager.clear_transforms(NodeTag::FunctionDef);
        manager.clear_cache();
        let module = manager.build_from_text("def old(): pass\n", "m").unwrap();
        assert!(module.has_local("old"));
    }

    #[test]
    fn extenders_graft_declarations_into_the_module() {
        let mut manager = Manager::new();
        manager.register_module_extender("base", || {
            crate::builder::build_from_text("def added():\n    pass\nEXTRA = 3\n", "base_ext")
        });
        let module = manager.build_from_text("def original():\n    pass\n", "base").unwrap();
        assert!(module.has_local("original"));
        assert!(module.has_local("added"));
        assert!(module.has_local("EXTRA"));
    }

    #[test]
    fn extenders_only_touch_their_module() {
        let mut manager = Manager::new();
        manager.register_module_extender("base", || {
            crate::builder::build_from_text("EXTRA = 3\n", "base_ext")
        });
        let other = manager.build_from_text("x = 1\n", "other").unwrap();
        assert!(!other.has_local("EXTRA"));
    }

    #[test]
    fn failed_import_hooks_answer_in_order() {
        let mut manager = Manager::new();
        manager.register_failed_import_hook(|name| {
            name.starts_with("virt.").then(|| {
                crate::builder::build_from_text("provided = True\n", name)
                    .map_err(BuildingError::from)
            })
        });
        let module = manager.ast_from_module_name("virt.thing").unwrap();
        assert!(module.has_local("provided"));
        // resolution failure for names no hook claims is unchanged
        assert!(manager.ast_from_module_name("other.thing").is_err());
    }

    #[test]
    fn invalidation_forces_a_rebuild() {
        let mut manager = Manager::new();
        let first = manager.build_from_text("x = 1\n", "m").unwrap();
        manager.invalidate("m");
        assert!(manager.cached("m").is_none());
        let second = manager.build_from_text("x = 1\n", "m").unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn file_resolution_is_cached_including_misses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("here.py"), "x = 1\n").unwrap();
        let mut manager = Manager::new();
        manager.add_search_path(dir.path());
        let resolved = manager.file_from_module_name("here").unwrap();
        assert_eq!(resolved, dir.path().join("here.py"));
        assert!(manager.file_from_module_name("absent").is_none());
        // second query answers from the cache even after the file is gone
        std::fs::remove_file(dir.path().join("here.py")).unwrap();
        assert!(manager.file_from_module_name("here").is_some());
    }

    #[test]
    fn recovered_source_wins_over_stub_synthesis() {
        use crate::runtime::{RuntimeModule, RuntimeValue};
        let mut manager = Manager::new();
        let graph = RuntimeModule::new("ext")
            .with_source("def real():\n    return 5\n")
            .member("ignored", RuntimeValue::Function);
        let module = manager.build_from_live_objects("ext", &[graph]).unwrap();
        assert!(module.has_local("real"));
        assert!(!module.has_local("ignored"));
    }

    #[test]
    fn live_object_builds_parse_their_own_stub() {
        use crate::runtime::{RuntimeModule, RuntimeValue};
        let mut manager = Manager::new();
        let graph = RuntimeModule::new("fake.binding")
            .member("VERSION", RuntimeValue::Str("1.2".to_string()))
            .member("init", RuntimeValue::Function);
        let module = manager
            .build_from_live_objects("fake.binding", &[graph])
            .unwrap();
        assert_eq!(module.origin, ModuleOrigin::Introspection);
        assert!(module.has_local("VERSION"));
        assert!(module.has_local("init"));
        // cached like any other module
        let again = manager.ast_from_module_name("fake.binding").unwrap();
        assert!(Rc::ptr_eq(&module, &again));
    }
}
