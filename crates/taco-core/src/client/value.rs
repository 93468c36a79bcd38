//! Client-side values.
//!
//! `TacoValue` is what calls send and receive: JSON-compatible data plus
//! remote-object proxies. The wire conversions implement the client's
//! substitution hooks: proxies encode to their handle's reference form,
//! and any decoded `_Taco_Object_` mapping comes back as a fresh proxy
//! attached to the owning client.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::object::TacoObject;
use crate::client::Shared;
use crate::codec;
use crate::error::Result;

/// A value crossing the bridge, as seen by the client.
#[derive(Debug, Clone)]
pub enum TacoValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<TacoValue>),
    Map(BTreeMap<String, TacoValue>),
    Object(TacoObject),
}

impl TacoValue {
    /// Name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TacoValue::Null => "null",
            TacoValue::Bool(_) => "bool",
            TacoValue::Number(_) => "number",
            TacoValue::String(_) => "string",
            TacoValue::List(_) => "list",
            TacoValue::Map(_) => "map",
            TacoValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TacoValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TacoValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TacoValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TacoValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TacoValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TacoValue]> {
        match self {
            TacoValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, TacoValue>> {
        match self {
            TacoValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&TacoObject> {
        match self {
            TacoValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<TacoObject> {
        match self {
            TacoValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Plain-JSON view of the value; `None` if it holds an object proxy
    /// anywhere.
    pub fn to_json(&self) -> Option<Value> {
        Some(match self {
            TacoValue::Null => Value::Null,
            TacoValue::Bool(b) => Value::Bool(*b),
            TacoValue::Number(n) => Value::Number(n.clone()),
            TacoValue::String(s) => Value::String(s.clone()),
            TacoValue::List(items) => {
                Value::Array(items.iter().map(TacoValue::to_json).collect::<Option<_>>()?)
            }
            TacoValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Some((k.clone(), v.to_json()?)))
                    .collect::<Option<Map<_, _>>>()?,
            ),
            TacoValue::Object(_) => return None,
        })
    }

    /// Encode for the wire; proxies become object references.
    pub(crate) fn to_wire(&self) -> Value {
        match self {
            TacoValue::Null => Value::Null,
            TacoValue::Bool(b) => Value::Bool(*b),
            TacoValue::Number(n) => Value::Number(n.clone()),
            TacoValue::String(s) => Value::String(s.clone()),
            TacoValue::List(items) => Value::Array(items.iter().map(TacoValue::to_wire).collect()),
            TacoValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_wire()))
                    .collect::<Map<_, _>>(),
            ),
            TacoValue::Object(object) => codec::object_ref(object.number()),
        }
    }

    /// Decode a wire value, wrapping object references into proxies owned
    /// by `client`.
    pub(crate) fn from_wire(value: Value, client: &Arc<Shared>) -> Result<TacoValue> {
        Ok(match value {
            Value::Null => TacoValue::Null,
            Value::Bool(b) => TacoValue::Bool(b),
            Value::Number(n) => TacoValue::Number(n),
            Value::String(s) => TacoValue::String(s),
            Value::Array(items) => TacoValue::List(
                items
                    .into_iter()
                    .map(|v| Self::from_wire(v, client))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => match codec::object_ref_number(&map) {
                Some(number) => TacoValue::Object(TacoObject::attach(client.clone(), number?)),
                None => TacoValue::Map(
                    map.into_iter()
                        .map(|(k, v)| Ok((k, Self::from_wire(v, client)?)))
                        .collect::<Result<_>>()?,
                ),
            },
        })
    }
}

impl PartialEq for TacoValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TacoValue::Null, TacoValue::Null) => true,
            (TacoValue::Bool(a), TacoValue::Bool(b)) => a == b,
            (TacoValue::Number(a), TacoValue::Number(b)) => a == b,
            (TacoValue::String(a), TacoValue::String(b)) => a == b,
            (TacoValue::List(a), TacoValue::List(b)) => a == b,
            (TacoValue::Map(a), TacoValue::Map(b)) => a == b,
            (TacoValue::Object(a), TacoValue::Object(b)) => a.number() == b.number(),
            _ => false,
        }
    }
}

impl From<bool> for TacoValue {
    fn from(b: bool) -> Self {
        TacoValue::Bool(b)
    }
}

impl From<i64> for TacoValue {
    fn from(n: i64) -> Self {
        TacoValue::Number(n.into())
    }
}

impl From<i32> for TacoValue {
    fn from(n: i32) -> Self {
        TacoValue::Number(n.into())
    }
}

impl From<u64> for TacoValue {
    fn from(n: u64) -> Self {
        TacoValue::Number(n.into())
    }
}

impl From<f64> for TacoValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(TacoValue::Null, TacoValue::Number)
    }
}

impl From<&str> for TacoValue {
    fn from(s: &str) -> Self {
        TacoValue::String(s.to_string())
    }
}

impl From<String> for TacoValue {
    fn from(s: String) -> Self {
        TacoValue::String(s)
    }
}

impl From<TacoObject> for TacoValue {
    fn from(object: TacoObject) -> Self {
        TacoValue::Object(object)
    }
}

impl From<&TacoObject> for TacoValue {
    fn from(object: &TacoObject) -> Self {
        TacoValue::Object(object.clone())
    }
}

impl<T: Into<TacoValue>> From<Vec<T>> for TacoValue {
    fn from(items: Vec<T>) -> Self {
        TacoValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for TacoValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => TacoValue::Null,
            Value::Bool(b) => TacoValue::Bool(b),
            Value::Number(n) => TacoValue::Number(n),
            Value::String(s) => TacoValue::String(s),
            Value::Array(items) => {
                TacoValue::List(items.into_iter().map(TacoValue::from).collect())
            }
            Value::Object(map) => TacoValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, TacoValue::from(v)))
                    .collect(),
            ),
        }
    }
}
