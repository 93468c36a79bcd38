//! The module registry: the server's stand-in for runtime reflection.
//!
//! Rust cannot resolve arbitrary dotted names against a live runtime, so the
//! embedding program registers what remote callers may reach: named modules
//! of functions, classes, and constant values, plus process-global bindings
//! and a built-in scope that is always available. Dotted-name resolution
//! walks these tiers; per-object reflection goes through the [`ServerObject`]
//! trait.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Result, TacoError};
use crate::server::value::ServerValue;

/// Positional and keyword arguments of one remote call.
#[derive(Debug, Default)]
pub struct CallArgs {
    pub args: Vec<ServerValue>,
    pub kwargs: BTreeMap<String, ServerValue>,
}

impl CallArgs {
    pub fn positional(args: Vec<ServerValue>) -> Self {
        Self {
            args,
            kwargs: BTreeMap::new(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&ServerValue> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&ServerValue> {
        self.kwargs.get(name)
    }

    /// Required positional argument.
    pub fn require(&self, index: usize) -> Result<&ServerValue> {
        self.args.get(index).ok_or_else(|| {
            TacoError::InvalidArguments(format!(
                "expected at least {} argument(s), got {}",
                index + 1,
                self.args.len()
            ))
        })
    }

    pub fn int(&self, index: usize) -> Result<i64> {
        let value = self.require(index)?;
        value.as_i64().ok_or_else(|| {
            TacoError::InvalidArguments(format!(
                "argument {} must be an integer, got {}",
                index + 1,
                value.kind()
            ))
        })
    }

    pub fn float(&self, index: usize) -> Result<f64> {
        let value = self.require(index)?;
        value.as_f64().ok_or_else(|| {
            TacoError::InvalidArguments(format!(
                "argument {} must be a number, got {}",
                index + 1,
                value.kind()
            ))
        })
    }

    pub fn str(&self, index: usize) -> Result<&str> {
        let value = self.require(index)?;
        value.as_str().ok_or_else(|| {
            TacoError::InvalidArguments(format!(
                "argument {} must be a string, got {}",
                index + 1,
                value.kind()
            ))
        })
    }
}

/// Reflection surface of one live object.
///
/// Implementations expose whatever methods and attributes they choose;
/// the defaults reject every name, so simple objects only override what
/// they actually support.
pub trait ServerObject: Send {
    /// Class name, used in error messages.
    fn class_name(&self) -> &str;

    /// Concrete-type escape hatch, for class methods that take instances of
    /// their own classes as arguments.
    fn as_any(&self) -> &dyn Any;

    fn call_method(&mut self, name: &str, args: CallArgs) -> Result<ServerValue> {
        let _ = args;
        Err(TacoError::NoSuchAttribute {
            target: self.class_name().to_string(),
            name: name.to_string(),
        })
    }

    fn get_attribute(&self, name: &str) -> Result<ServerValue> {
        Err(TacoError::NoSuchAttribute {
            target: self.class_name().to_string(),
            name: name.to_string(),
        })
    }

    fn set_attribute(&mut self, name: &str, value: ServerValue) -> Result<()> {
        let _ = value;
        Err(TacoError::NoSuchAttribute {
            target: self.class_name().to_string(),
            name: name.to_string(),
        })
    }
}

type FnBody = dyn Fn(CallArgs) -> Result<ServerValue> + Send + Sync;
type CtorBody = dyn Fn(CallArgs) -> Result<Box<dyn ServerObject>> + Send + Sync;

/// A callable registered under a name.
pub struct NativeFunction {
    name: String,
    body: Box<FnBody>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(CallArgs) -> Result<ServerValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: CallArgs) -> Result<ServerValue> {
        (self.body)(args)
    }
}

/// A constructible class with optional class methods.
pub struct NativeClass {
    name: String,
    constructor: Box<CtorBody>,
    class_methods: HashMap<String, Arc<NativeFunction>>,
}

impl NativeClass {
    pub fn new(
        name: impl Into<String>,
        constructor: impl Fn(CallArgs) -> Result<Box<dyn ServerObject>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            constructor: Box::new(constructor),
            class_methods: HashMap::new(),
        }
    }

    pub fn class_method(
        mut self,
        name: impl Into<String> + Clone,
        body: impl Fn(CallArgs) -> Result<ServerValue> + Send + Sync + 'static,
    ) -> Self {
        self.class_methods.insert(
            name.clone().into(),
            Arc::new(NativeFunction::new(name, body)),
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn construct(&self, args: CallArgs) -> Result<Box<dyn ServerObject>> {
        (self.constructor)(args)
    }

    pub fn method(&self, name: &str) -> Result<Arc<NativeFunction>> {
        self.class_methods
            .get(name)
            .cloned()
            .ok_or_else(|| TacoError::NoSuchAttribute {
                target: format!("class \"{}\"", self.name),
                name: name.to_string(),
            })
    }
}

/// What a name resolves to: a plain value, something callable, or a module.
#[derive(Clone)]
pub enum Binding {
    Value(ServerValue),
    Function(Arc<NativeFunction>),
    Class(Arc<NativeClass>),
    Module(Arc<Module>),
}

impl Binding {
    /// Name of the binding's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Value(_) => "value",
            Binding::Function(_) => "function",
            Binding::Class(_) => "class",
            Binding::Module(_) => "module",
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Binding::{}", self.kind())
    }
}

/// A named collection of functions, classes, and constant values.
///
/// Modules are immutable once registered; mutable remote state belongs in
/// namespace variables.
#[derive(Default)]
pub struct Module {
    name: String,
    members: HashMap<String, Binding>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: HashMap::new(),
        }
    }

    pub fn function(
        mut self,
        name: impl Into<String> + Clone,
        body: impl Fn(CallArgs) -> Result<ServerValue> + Send + Sync + 'static,
    ) -> Self {
        self.members.insert(
            name.clone().into(),
            Binding::Function(Arc::new(NativeFunction::new(name, body))),
        );
        self
    }

    pub fn class(mut self, class: NativeClass) -> Self {
        self.members
            .insert(class.name().to_string(), Binding::Class(Arc::new(class)));
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<ServerValue>) -> Self {
        self.members
            .insert(name.into(), Binding::Value(value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self, name: &str) -> Option<Binding> {
        self.members.get(name).cloned()
    }
}

/// The tiered scopes remote names resolve against.
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<Module>>,
    globals: HashMap<String, Binding>,
    builtins: HashMap<String, Binding>,
}

impl ModuleRegistry {
    /// Registry with the default built-in functions.
    pub fn new() -> Self {
        let mut registry = Self {
            modules: HashMap::new(),
            globals: HashMap::new(),
            builtins: HashMap::new(),
        };
        registry.builtin(NativeFunction::new("divmod", builtin_divmod));
        registry.builtin(NativeFunction::new("abs", builtin_abs));
        registry.builtin(NativeFunction::new("len", builtin_len));
        registry
    }

    /// Make a module available for `import_module`.
    pub fn register(&mut self, module: Module) {
        self.modules
            .insert(module.name().to_string(), Arc::new(module));
    }

    /// Bind a name into the process-global scope (visible without import).
    pub fn register_global(&mut self, name: impl Into<String>, binding: Binding) {
        self.globals.insert(name.into(), binding);
    }

    /// Add a built-in function (always resolvable).
    pub fn builtin(&mut self, function: NativeFunction) {
        self.builtins.insert(
            function.name().to_string(),
            Binding::Function(Arc::new(function)),
        );
    }

    pub fn module(&self, name: &str) -> Result<Arc<Module>> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| TacoError::NameNotFound(name.to_string()))
    }

    pub(crate) fn global(&self, name: &str) -> Option<Binding> {
        self.globals.get(name).cloned()
    }

    pub(crate) fn lookup_builtin(&self, name: &str) -> Option<Binding> {
        self.builtins.get(name).cloned()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn builtin_divmod(args: CallArgs) -> Result<ServerValue> {
    let (a, b) = (args.require(0)?, args.require(1)?);
    match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => {
            if b == 0 {
                return Err(TacoError::InvalidArguments("division by zero".to_string()));
            }
            let q = floor_div(a, b);
            Ok(vec![q, a - q * b].into())
        }
        _ => {
            let (a, b) = (args.float(0)?, args.float(1)?);
            if b == 0.0 {
                return Err(TacoError::InvalidArguments("division by zero".to_string()));
            }
            let q = (a / b).floor();
            Ok(vec![q, a - q * b].into())
        }
    }
}

fn builtin_abs(args: CallArgs) -> Result<ServerValue> {
    let value = args.require(0)?;
    if let Some(n) = value.as_i64() {
        Ok(n.abs().into())
    } else {
        Ok(args.float(0)?.abs().into())
    }
}

fn builtin_len(args: CallArgs) -> Result<ServerValue> {
    let len = match args.require(0)? {
        ServerValue::String(s) => s.chars().count(),
        ServerValue::List(items) => items.len(),
        ServerValue::Map(map) => map.len(),
        other => {
            return Err(TacoError::InvalidArguments(format!(
                "len() takes a string, list or map, got {}",
                other.kind()
            )))
        }
    };
    Ok((len as i64).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call2(name: &str, registry: &ModuleRegistry, a: i64, b: i64) -> ServerValue {
        let Some(Binding::Function(f)) = registry.lookup_builtin(name) else {
            panic!("missing builtin {name}")
        };
        f.call(CallArgs::positional(vec![a.into(), b.into()]))
            .unwrap()
    }

    #[test]
    fn divmod_matches_floor_semantics() {
        let registry = ModuleRegistry::new();
        assert_eq!(call2("divmod", &registry, 67, 8), vec![8i64, 3].into());
        assert_eq!(call2("divmod", &registry, -7, 2), vec![-4i64, 1].into());
    }

    #[test]
    fn divmod_rejects_zero_divisor() {
        let registry = ModuleRegistry::new();
        let Some(Binding::Function(f)) = registry.lookup_builtin("divmod") else {
            panic!("missing divmod")
        };
        let err = f
            .call(CallArgs::positional(vec![1i64.into(), 0i64.into()]))
            .unwrap_err();
        assert!(matches!(err, TacoError::InvalidArguments(_)), "got {err:?}");
    }

    #[test]
    fn len_counts_characters_and_items() {
        let registry = ModuleRegistry::new();
        let Some(Binding::Function(f)) = registry.lookup_builtin("len") else {
            panic!("missing len")
        };
        assert_eq!(
            f.call(CallArgs::positional(vec!["héllo".into()])).unwrap(),
            5i64.into()
        );
        assert_eq!(
            f.call(CallArgs::positional(vec![vec![1i64, 2].into()]))
                .unwrap(),
            2i64.into()
        );
    }

    #[test]
    fn module_members_resolve() {
        let module = Module::new("demo")
            .function("f", |_| Ok(ServerValue::Null))
            .value("answer", 42i64);
        assert!(matches!(module.member("f"), Some(Binding::Function(_))));
        assert!(matches!(module.member("answer"), Some(Binding::Value(_))));
        assert!(module.member("missing").is_none());
    }
}
