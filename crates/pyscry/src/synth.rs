//! Stub synthesis: render an introspected object graph as Python source.
//!
//! The output is deterministic — members are grouped into constants,
//! functions, methods and classes (in that order), each group sorted by
//! name under a `# <name> <group>` banner — so the same graph always
//! yields byte-identical source. The rendered text is ordinary module
//! source and goes back through the normal build pipeline.

use thiserror::Error;
use tracing::warn;

use crate::runtime::{RuntimeClass, RuntimeMember, RuntimeModule, RuntimeValue};

#[derive(Debug, Clone, Error)]
pub enum SynthError {
    #[error("required module '{0}' could not be introspected")]
    Unavailable(String),
}

/// Render the stub source for a request of one or more introspected
/// modules. Unavailable optional modules are skipped; an unavailable
/// required module fails the request.
pub fn modules_stub(modules: &[RuntimeModule]) -> Result<String, SynthError> {
    let mut out = String::new();
    for module in modules {
        if !module.available {
            if module.optional {
                warn!(module = %module.name, "skipping unavailable optional module");
                continue;
            }
            return Err(SynthError::Unavailable(module.name.clone()));
        }
        out.push_str(&object_stub(&module.name, &module.members));
    }
    Ok(out)
}

/// Stub one object's members; recurses into nested classes.
pub(crate) fn object_stub(owner: &str, members: &[RuntimeMember]) -> String {
    let mut constants: Vec<(&str, String)> = Vec::new();
    let mut functions: Vec<&str> = Vec::new();
    let mut methods: Vec<&str> = Vec::new();
    let mut classes: Vec<(&str, &RuntimeClass)> = Vec::new();

    for member in members {
        let name = member.name.as_str();
        if name.starts_with("__") && !SPECIAL_METHODS.contains(&name) {
            continue;
        }
        if !is_identifier(name) {
            continue;
        }
        match &member.value {
            RuntimeValue::Inaccessible => continue,
            RuntimeValue::Class(class) => classes.push((name, class)),
            RuntimeValue::Function | RuntimeValue::BuiltinFunction | RuntimeValue::Callable => {
                functions.push(name)
            }
            RuntimeValue::Method | RuntimeValue::MethodDescriptor => methods.push(name),
            value => constants.push((name, constant_text(value))),
        }
    }
    constants.sort_unstable_by_key(|(name, _)| *name);
    functions.sort_unstable();
    methods.sort_unstable();
    classes.sort_unstable_by_key(|(name, _)| *name);

    let mut ret = String::new();
    if !constants.is_empty() {
        ret.push_str(&format!("# {owner} constants\n\n"));
    }
    for (name, text) in &constants {
        ret.push_str(&format!("{name} = {text}\n"));
    }
    if !ret.is_empty() {
        ret.push('\n');
    }

    if !functions.is_empty() {
        ret.push_str(&format!("# {owner} functions\n\n"));
    }
    for name in &functions {
        ret.push_str(&format!("def {name}(*args, **kwargs):\n"));
        ret.push_str("    pass\n");
    }
    if !functions.is_empty() {
        ret.push('\n');
    }

    if !methods.is_empty() {
        ret.push_str(&format!("# {owner} methods\n\n"));
    }
    for name in &methods {
        ret.push_str(&format!("def {name}(self, *args, **kwargs):\n"));
        ret.push_str("    pass\n");
    }
    if !methods.is_empty() {
        ret.push('\n');
    }

    if !classes.is_empty() {
        ret.push_str(&format!("# {owner} classes\n\n"));
    }
    for (name, class) in &classes {
        let base = if class.is_exception {
            "Exception"
        } else {
            "object"
        };
        ret.push_str(&format!("class {name}({base}):\n"));
        let body = object_stub(&class.name, &class.members);
        let body = if body.is_empty() {
            "pass\n".to_string()
        } else {
            body
        };
        for line in body.split_terminator('\n') {
            ret.push_str("    ");
            ret.push_str(line);
            ret.push('\n');
        }
        ret.push('\n');
    }
    ret
}

/// Dunder methods worth keeping on stubbed objects.
const SPECIAL_METHODS: &[&str] = &[
    "__lt__",
    "__le__",
    "__eq__",
    "__ne__",
    "__ge__",
    "__gt__",
    "__iter__",
    "__getitem__",
    "__setitem__",
    "__delitem__",
    "__len__",
    "__bool__",
    "__nonzero__",
    "__next__",
    "__str__",
    "__contains__",
    "__enter__",
    "__exit__",
    "__repr__",
    "__getattr__",
    "__setattr__",
    "__delattr__",
    "__del__",
    "__hash__",
];

/// Introspection can surface names like `2BUTTON_PRESS`; anything that is
/// not a Python identifier is dropped before bucketing.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Right-hand side for a constant binding. Strings get their backslashes
/// doubled and are wrapped in double quotes; flags, descriptors and
/// unrecognized values flatten to `0` — the stub only needs the name to
/// resolve.
fn constant_text(value: &RuntimeValue) -> String {
    match value {
        RuntimeValue::Int(v) => v.to_string(),
        RuntimeValue::Bool(v) => if *v { "True" } else { "False" }.to_string(),
        RuntimeValue::Float(v) => format!("{v:?}"),
        RuntimeValue::None => "None".to_string(),
        RuntimeValue::Str(v) => format!("\"{}\"", v.replace('\\', "\\\\")),
        _ => "0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_sorted_and_rendered() {
        let module = RuntimeModule::new("sound")
            .member("RATE", RuntimeValue::Int(44100))
            .member("NAME", RuntimeValue::Str("pulse".to_string()))
            .member("ENABLED", RuntimeValue::Bool(true));
        let stub = modules_stub(&[module]).unwrap();
        assert_eq!(
            stub,
            "# sound constants\n\nENABLED = True\nNAME = \"pulse\"\nRATE = 44100\n\n"
        );
    }

    #[test]
    fn string_backslashes_are_doubled() {
        let module =
            RuntimeModule::new("m").member("SEP", RuntimeValue::Str("a\\b".to_string()));
        let stub = modules_stub(&[module]).unwrap();
        assert!(stub.contains("SEP = \"a\\\\b\"\n"));
    }

    #[test]
    fn functions_and_methods_get_distinct_signatures() {
        let module = RuntimeModule::new("m")
            .member("go", RuntimeValue::Function)
            .member("poll", RuntimeValue::MethodDescriptor);
        let stub = modules_stub(&[module]).unwrap();
        assert!(stub.contains("# m functions\n\ndef go(*args, **kwargs):\n    pass\n"));
        assert!(stub.contains("# m methods\n\ndef poll(self, *args, **kwargs):\n    pass\n"));
    }

    #[test]
    fn classes_recurse_with_indentation() {
        let class = RuntimeClass::new("Err")
            .exception()
            .member("code", RuntimeValue::Int(2));
        let module = RuntimeModule::new("m").member("Err", RuntimeValue::Class(class));
        let stub = modules_stub(&[module]).unwrap();
        assert!(stub.contains("class Err(Exception):\n    # Err constants\n"));
        assert!(stub.contains("    code = 2\n"));
    }

    #[test]
    fn empty_class_body_is_pass() {
        let module =
            RuntimeModule::new("m").member("Box", RuntimeValue::Class(RuntimeClass::new("Box")));
        let stub = modules_stub(&[module]).unwrap();
        assert!(stub.contains("class Box(object):\n    pass\n"));
    }

    #[test]
    fn hidden_names_are_dropped() {
        let module = RuntimeModule::new("m")
            .member("__module__", RuntimeValue::Str("m".to_string()))
            .member("not-an-identifier", RuntimeValue::Int(1))
            .member("2BUTTON_PRESS", RuntimeValue::Int(5))
            .member("broken", RuntimeValue::Inaccessible)
            .member("__len__", RuntimeValue::Method);
        let stub = modules_stub(&[module]).unwrap();
        assert!(!stub.contains("__module__"));
        assert!(!stub.contains("not-an-identifier"));
        assert!(!stub.contains("2BUTTON_PRESS"));
        assert!(!stub.contains("broken"));
        assert!(stub.contains("def __len__(self, *args, **kwargs):"));
    }

    #[test]
    fn optional_unavailable_module_is_skipped() {
        let main = RuntimeModule::new("glib").member("IO_IN", RuntimeValue::Int(1));
        let companion = RuntimeModule::new("glib.overrides").optional().unavailable();
        let stub = modules_stub(&[main, companion]).unwrap();
        assert!(stub.contains("IO_IN = 1"));
    }

    #[test]
    fn required_unavailable_module_fails() {
        let err = modules_stub(&[RuntimeModule::new("gtk").unavailable()]).unwrap_err();
        assert!(matches!(err, SynthError::Unavailable(name) if name == "gtk"));
    }

    #[test]
    fn float_and_none_scalars_render_literally() {
        let module = RuntimeModule::new("m")
            .member("PI", RuntimeValue::Float(3.5))
            .member("WHOLE", RuntimeValue::Float(2.0))
            .member("MISSING", RuntimeValue::None);
        let stub = modules_stub(&[module]).unwrap();
        assert!(stub.contains("PI = 3.5\n"));
        assert!(stub.contains("WHOLE = 2.0\n"));
        assert!(stub.contains("MISSING = None\n"));
    }

    #[test]
    fn opaque_values_flatten_to_zero() {
        let module = RuntimeModule::new("m")
            .member("FLAG", RuntimeValue::EnumFlag)
            .member("prop", RuntimeValue::DataDescriptor)
            .member("blob", RuntimeValue::Opaque);
        let stub = modules_stub(&[module]).unwrap();
        assert!(stub.contains("FLAG = 0\n"));
        assert!(stub.contains("prop = 0\n"));
        assert!(stub.contains("blob = 0\n"));
    }
}
