//! Namespace bindings and dotted-name resolution.
//!
//! The namespace holds what `import_module` and `set_value` have bound.
//! A dotted name's root segment resolves against the namespace, then the
//! registry's process-global scope, then its built-in scope; the remaining
//! segments walk members: key or index access for container values
//! (falling back to attribute access), member lookup for modules and
//! classes, `get_attribute` for live objects.

use std::collections::HashMap;

use crate::error::{Result, TacoError};
use crate::server::registry::{Binding, ModuleRegistry};
use crate::server::value::{lock, ServerValue, SharedObject};

/// Name → binding map populated by import and assignment actions.
#[derive(Default)]
pub struct Namespace {
    bindings: HashMap<String, Binding>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        self.bindings.insert(name.into(), binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.bindings.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Resolve a dotted name for reading.
pub(crate) fn resolve(ns: &Namespace, registry: &ModuleRegistry, path: &str) -> Result<Binding> {
    let (root, rest) = split_root(path);
    let mut current = lookup_root(ns, registry, root)?;
    for segment in rest.into_iter().flat_map(|r| r.split('.')) {
        current = step(current, segment)?;
    }
    Ok(current)
}

fn split_root(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (path, None),
    }
}

fn lookup_root(ns: &Namespace, registry: &ModuleRegistry, root: &str) -> Result<Binding> {
    if let Some(binding) = ns.get(root) {
        return Ok(binding.clone());
    }
    if let Some(binding) = registry.global(root) {
        return Ok(binding);
    }
    registry
        .lookup_builtin(root)
        .ok_or_else(|| TacoError::NameNotFound(root.to_string()))
}

fn step(binding: Binding, segment: &str) -> Result<Binding> {
    match binding {
        Binding::Module(module) => {
            module
                .member(segment)
                .ok_or_else(|| TacoError::NoSuchAttribute {
                    target: format!("module \"{}\"", module.name()),
                    name: segment.to_string(),
                })
        }
        Binding::Class(class) => class.method(segment).map(Binding::Function),
        Binding::Function(function) => Err(TacoError::NoSuchAttribute {
            target: format!("function \"{}\"", function.name()),
            name: segment.to_string(),
        }),
        Binding::Value(value) => value_member(&value, segment).map(Binding::Value),
    }
}

fn value_member(value: &ServerValue, segment: &str) -> Result<ServerValue> {
    let missing = || TacoError::NoSuchAttribute {
        target: value.kind().to_string(),
        name: segment.to_string(),
    };
    match value {
        ServerValue::Map(map) => map.get(segment).cloned().ok_or_else(missing),
        ServerValue::List(items) => {
            let index: usize = segment.parse().map_err(|_| missing())?;
            items.get(index).cloned().ok_or_else(missing)
        }
        ServerValue::Object(object) => lock(object).get_attribute(segment),
        _ => Err(missing()),
    }
}

/// A write position during an assignment walk.
enum Place<'a> {
    Binding(&'a mut Binding),
    Value(&'a mut ServerValue),
    Object(SharedObject),
}

/// Assign to a dotted name.
///
/// A bare name binds directly into the namespace. For a dotted name the
/// parent is located first, walking mutably through namespace-rooted
/// containers or into shared objects, and the final segment is assigned
/// as a key, index, or object attribute. Registered modules are immutable.
pub(crate) fn assign(
    ns: &mut Namespace,
    registry: &ModuleRegistry,
    path: &str,
    value: ServerValue,
) -> Result<()> {
    let Some((parent_path, last)) = path.rsplit_once('.') else {
        ns.insert(path, Binding::Value(value));
        return Ok(());
    };

    let (root, rest) = split_root(parent_path);
    let mut place = root_place(ns, registry, root)?;
    for segment in rest.into_iter().flat_map(|r| r.split('.')) {
        place = descend(place, segment)?;
    }

    match place {
        Place::Binding(binding) => match binding {
            Binding::Value(v) => assign_member(v, last, value),
            Binding::Module(_) => Err(TacoError::InvalidArguments(format!(
                "cannot assign to member \"{last}\" of a module"
            ))),
            other => Err(TacoError::InvalidArguments(format!(
                "cannot assign into a {}",
                other.kind()
            ))),
        },
        Place::Value(v) => assign_member(v, last, value),
        Place::Object(object) => lock(&object).set_attribute(last, value),
    }
}

fn root_place<'a>(
    ns: &'a mut Namespace,
    registry: &ModuleRegistry,
    root: &str,
) -> Result<Place<'a>> {
    if ns.contains(root) {
        let binding = ns.get_mut(root).ok_or_else(|| {
            TacoError::NameNotFound(root.to_string())
        })?;
        return Ok(Place::Binding(binding));
    }
    // Read-only tiers: only shared objects can be assigned through.
    match registry.global(root).or_else(|| registry.lookup_builtin(root)) {
        Some(Binding::Value(ServerValue::Object(object))) => Ok(Place::Object(object)),
        Some(binding) => Err(TacoError::InvalidArguments(format!(
            "cannot assign into global {} \"{root}\"",
            binding.kind()
        ))),
        None => Err(TacoError::NameNotFound(root.to_string())),
    }
}

fn descend<'a>(place: Place<'a>, segment: &str) -> Result<Place<'a>> {
    match place {
        Place::Binding(binding) => match binding {
            Binding::Value(v) => descend_value(v, segment),
            Binding::Module(module) => match module.member(segment) {
                Some(Binding::Value(ServerValue::Object(object))) => Ok(Place::Object(object)),
                Some(binding) => Err(TacoError::InvalidArguments(format!(
                    "cannot assign into module {} \"{segment}\"",
                    binding.kind()
                ))),
                None => Err(TacoError::NoSuchAttribute {
                    target: format!("module \"{}\"", module.name()),
                    name: segment.to_string(),
                }),
            },
            other => Err(TacoError::InvalidArguments(format!(
                "cannot assign into a {}",
                other.kind()
            ))),
        },
        Place::Value(v) => descend_value(v, segment),
        Place::Object(object) => {
            // Attribute reads hand back copies, so only object-valued
            // attributes can be assigned through.
            let attribute = lock(&object).get_attribute(segment)?;
            match attribute {
                ServerValue::Object(inner) => Ok(Place::Object(inner)),
                other => Err(TacoError::InvalidArguments(format!(
                    "cannot assign through {} attribute \"{segment}\"",
                    other.kind()
                ))),
            }
        }
    }
}

fn descend_value<'a>(value: &'a mut ServerValue, segment: &str) -> Result<Place<'a>> {
    let missing = |kind: &str| TacoError::NoSuchAttribute {
        target: kind.to_string(),
        name: segment.to_string(),
    };
    match value {
        ServerValue::Map(map) => map
            .get_mut(segment)
            .map(Place::Value)
            .ok_or_else(|| missing("map")),
        ServerValue::List(items) => {
            let index: usize = segment.parse().map_err(|_| missing("list"))?;
            items.get_mut(index).map(Place::Value).ok_or_else(|| missing("list"))
        }
        ServerValue::Object(object) => Ok(Place::Object(object.clone())),
        other => Err(missing(other.kind())),
    }
}

fn assign_member(value: &mut ServerValue, segment: &str, assigned: ServerValue) -> Result<()> {
    match value {
        ServerValue::Map(map) => {
            map.insert(segment.to_string(), assigned);
            Ok(())
        }
        ServerValue::List(items) => {
            let index: usize = segment.parse().map_err(|_| {
                TacoError::InvalidArguments(format!("list index \"{segment}\" is not an integer"))
            })?;
            let slot = items.get_mut(index).ok_or_else(|| {
                TacoError::InvalidArguments(format!("list index {index} out of range"))
            })?;
            *slot = assigned;
            Ok(())
        }
        ServerValue::Object(object) => lock(object).set_attribute(segment, assigned),
        other => Err(TacoError::InvalidArguments(format!(
            "cannot assign member \"{segment}\" of a {}",
            other.kind()
        ))),
    }
}
