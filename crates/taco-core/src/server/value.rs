//! Server-side values.
//!
//! `ServerValue` is what action handlers and registered native functions see:
//! JSON-compatible data plus live objects. The wire conversions implement the
//! server's substitution hooks: decoding resolves `_Taco_Object_` handles
//! against the object table (failing if the handle is gone), encoding places
//! every live object into the table under a freshly allocated handle.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec;
use crate::error::Result;
use crate::server::objects::ObjectTable;
use crate::server::registry::ServerObject;

/// A live object shared between the object table and in-flight values.
pub type SharedObject = Arc<Mutex<Box<dyn ServerObject>>>;

/// Lock a shared object for a reflection call.
pub(crate) fn lock(object: &SharedObject) -> MutexGuard<'_, Box<dyn ServerObject>> {
    object.lock().expect("object lock poisoned")
}

/// A value as seen by server-side handlers.
#[derive(Clone)]
pub enum ServerValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<ServerValue>),
    Map(BTreeMap<String, ServerValue>),
    Object(SharedObject),
}

impl ServerValue {
    /// Wrap a native object into a value.
    pub fn object(object: impl ServerObject + 'static) -> Self {
        ServerValue::Object(Arc::new(Mutex::new(Box::new(object))))
    }

    /// Name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerValue::Null => "null",
            ServerValue::Bool(_) => "bool",
            ServerValue::Number(_) => "number",
            ServerValue::String(_) => "string",
            ServerValue::List(_) => "list",
            ServerValue::Map(_) => "map",
            ServerValue::Object(_) => "object",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ServerValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ServerValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ServerValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ServerValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&SharedObject> {
        match self {
            ServerValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Decode a wire value, resolving object references via the table.
    pub(crate) fn from_wire(value: Value, objects: &ObjectTable) -> Result<Self> {
        Ok(match value {
            Value::Null => ServerValue::Null,
            Value::Bool(b) => ServerValue::Bool(b),
            Value::Number(n) => ServerValue::Number(n),
            Value::String(s) => ServerValue::String(s),
            Value::Array(items) => ServerValue::List(
                items
                    .into_iter()
                    .map(|v| Self::from_wire(v, objects))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => match codec::object_ref_number(&map) {
                Some(number) => ServerValue::Object(objects.get(number?)?),
                None => ServerValue::Map(
                    map.into_iter()
                        .map(|(k, v)| Ok((k, Self::from_wire(v, objects)?)))
                        .collect::<Result<_>>()?,
                ),
            },
        })
    }

    /// Encode for the wire, placing live objects into the table.
    ///
    /// Every object allocates a fresh handle; references are never reused or
    /// de-duplicated across calls.
    pub(crate) fn to_wire(self, objects: &mut ObjectTable) -> Value {
        match self {
            ServerValue::Null => Value::Null,
            ServerValue::Bool(b) => Value::Bool(b),
            ServerValue::Number(n) => Value::Number(n),
            ServerValue::String(s) => Value::String(s),
            ServerValue::List(items) => {
                Value::Array(items.into_iter().map(|v| v.to_wire(objects)).collect())
            }
            ServerValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.to_wire(objects)))
                    .collect::<Map<_, _>>(),
            ),
            ServerValue::Object(object) => codec::object_ref(objects.insert(object)),
        }
    }
}

impl fmt::Debug for ServerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerValue::Null => f.write_str("Null"),
            ServerValue::Bool(b) => write!(f, "Bool({b})"),
            ServerValue::Number(n) => write!(f, "Number({n})"),
            ServerValue::String(s) => write!(f, "String({s:?})"),
            ServerValue::List(items) => f.debug_tuple("List").field(items).finish(),
            ServerValue::Map(map) => f.debug_tuple("Map").field(map).finish(),
            ServerValue::Object(o) => write!(f, "Object({})", lock(o).class_name()),
        }
    }
}

impl PartialEq for ServerValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ServerValue::Null, ServerValue::Null) => true,
            (ServerValue::Bool(a), ServerValue::Bool(b)) => a == b,
            (ServerValue::Number(a), ServerValue::Number(b)) => a == b,
            (ServerValue::String(a), ServerValue::String(b)) => a == b,
            (ServerValue::List(a), ServerValue::List(b)) => a == b,
            (ServerValue::Map(a), ServerValue::Map(b)) => a == b,
            (ServerValue::Object(a), ServerValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for ServerValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ServerValue::Null,
            Value::Bool(b) => ServerValue::Bool(b),
            Value::Number(n) => ServerValue::Number(n),
            Value::String(s) => ServerValue::String(s),
            Value::Array(items) => {
                ServerValue::List(items.into_iter().map(ServerValue::from).collect())
            }
            Value::Object(map) => ServerValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, ServerValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for ServerValue {
    fn from(b: bool) -> Self {
        ServerValue::Bool(b)
    }
}

impl From<i64> for ServerValue {
    fn from(n: i64) -> Self {
        ServerValue::Number(n.into())
    }
}

impl From<u32> for ServerValue {
    fn from(n: u32) -> Self {
        ServerValue::Number(n.into())
    }
}

impl From<f64> for ServerValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(ServerValue::Null, ServerValue::Number)
    }
}

impl From<&str> for ServerValue {
    fn from(s: &str) -> Self {
        ServerValue::String(s.to_string())
    }
}

impl From<String> for ServerValue {
    fn from(s: String) -> Self {
        ServerValue::String(s)
    }
}

impl<T: Into<ServerValue>> From<Vec<T>> for ServerValue {
    fn from(items: Vec<T>) -> Self {
        ServerValue::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::registry::CallArgs;
    use serde_json::json;

    struct Marker;

    impl ServerObject for Marker {
        fn class_name(&self) -> &str {
            "Marker"
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn call_method(&mut self, name: &str, _args: CallArgs) -> Result<ServerValue> {
            Err(TacoError::NoSuchAttribute {
                target: "Marker".to_string(),
                name: name.to_string(),
            })
        }
    }

    #[test]
    fn encode_allocates_fresh_handles() {
        let mut objects = ObjectTable::new();
        let value = ServerValue::object(Marker);
        let shared = value.as_object().unwrap().clone();

        assert_eq!(value.clone().to_wire(&mut objects), json!({"_Taco_Object_": 1}));
        assert_eq!(value.to_wire(&mut objects), json!({"_Taco_Object_": 2}));

        // Both handles resolve to the same live object.
        assert!(Arc::ptr_eq(&objects.get(1).unwrap(), &shared));
        assert!(Arc::ptr_eq(&objects.get(2).unwrap(), &shared));
    }

    #[test]
    fn decode_resolves_handles_anywhere() {
        let mut objects = ObjectTable::new();
        let number = objects.insert(Arc::new(Mutex::new(Box::new(Marker) as Box<dyn ServerObject>)));

        let wire = json!({"nested": [{"_Taco_Object_": number}]});
        let decoded = ServerValue::from_wire(wire, &objects).unwrap();

        let ServerValue::Map(map) = decoded else {
            panic!("expected map")
        };
        let ServerValue::List(items) = &map["nested"] else {
            panic!("expected list")
        };
        assert!(items[0].as_object().is_some());
    }

    #[test]
    fn decode_fails_for_missing_handle() {
        let objects = ObjectTable::new();
        let err = ServerValue::from_wire(json!({"_Taco_Object_": 9}), &objects).unwrap_err();
        assert!(matches!(err, TacoError::ObjectNotFound(9)), "got {err:?}");
    }

    #[test]
    fn plain_data_round_trips() {
        let mut objects = ObjectTable::new();
        let wire = json!({"a": [1, 2.5, "x", true, null]});
        let decoded = ServerValue::from_wire(wire.clone(), &objects).unwrap();
        assert_eq!(decoded.to_wire(&mut objects), wire);
    }
}
