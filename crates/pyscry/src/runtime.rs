//! Model of a live, introspected object graph.
//!
//! Some modules have no analyzable source (C extensions, generated
//! bindings). For those, callers describe what introspection saw — a tree
//! of named members with coarse runtime categories — and the synthesizer
//! turns that description into importable stub source. The model is plain
//! data so tests and adapters can construct graphs by hand.

/// Coarse category of a runtime member, mirroring what `dir()` +
/// `getattr()` + type checks can tell about an object.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Class(RuntimeClass),
    /// A plain function.
    Function,
    /// A builtin (C-level) function; stubbed identically to `Function`.
    BuiltinFunction,
    /// A bound method.
    Method,
    /// A method descriptor (unbound C-level method slot).
    MethodDescriptor,
    /// Flag/enum values and GType-style typed constants.
    EnumFlag,
    /// A data descriptor such as a property.
    DataDescriptor,
    Int(i64),
    Str(String),
    Bool(bool),
    Float(f64),
    None,
    /// Not a recognized category but still callable; stubbed as a function.
    Callable,
    /// Anything else; only the name survives, the value is rendered as `0`.
    Opaque,
    /// Attribute access raised at introspection time; omitted entirely.
    Inaccessible,
}

/// A named member of a module or class.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeMember {
    pub name: String,
    pub value: RuntimeValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeClass {
    pub name: String,
    /// Subclasses of the exception hierarchy are stubbed with an
    /// `Exception` base instead of `object`.
    pub is_exception: bool,
    pub members: Vec<RuntimeMember>,
}

impl RuntimeClass {
    pub fn new(name: impl Into<String>) -> Self {
        RuntimeClass {
            name: name.into(),
            is_exception: false,
            members: Vec::new(),
        }
    }

    pub fn exception(mut self) -> Self {
        self.is_exception = true;
        self
    }

    pub fn member(mut self, name: impl Into<String>, value: RuntimeValue) -> Self {
        self.members.push(RuntimeMember {
            name: name.into(),
            value,
        });
        self
    }
}

/// One introspected module in a stub request. A request may carry several
/// modules (a main module plus companions); a companion marked `optional`
/// that failed to import is silently skipped, while an unavailable
/// required module fails the whole request.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeModule {
    pub name: String,
    pub available: bool,
    pub optional: bool,
    /// Real source recovered at introspection time. When present it is
    /// used verbatim instead of a synthesized stub.
    pub source: Option<String>,
    pub members: Vec<RuntimeMember>,
}

impl RuntimeModule {
    pub fn new(name: impl Into<String>) -> Self {
        RuntimeModule {
            name: name.into(),
            available: true,
            optional: false,
            source: None,
            members: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn member(mut self, name: impl Into<String>, value: RuntimeValue) -> Self {
        self.members.push(RuntimeMember {
            name: name.into(),
            value,
        });
        self
    }
}
