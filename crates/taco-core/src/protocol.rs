//! Message shapes of the Taco wire protocol.
//!
//! A message is a JSON object carrying an `action` field. Requests flow
//! client→server and name one of the fixed actions; responses flow back and
//! are either `result` or `exception`. The builders here produce exactly the
//! field sets the protocol defines: empty argument lists are sent as `[]`,
//! empty keyword maps as `{}`, and an absent context as `null`.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Result, TacoError};

/// Key marking a JSON object as a remote object reference.
pub const OBJECT_KEY: &str = "_Taco_Object_";

/// Sentinel line terminating every frame.
pub const END_MARKER: &str = "// END";

/// Response action carrying a result value.
pub const ACTION_RESULT: &str = "result";

/// Response action carrying an exception message.
pub const ACTION_EXCEPTION: &str = "exception";

/// Evaluation context hint, carried on call actions.
///
/// Reserved by the protocol: servers currently ignore it, but clients may
/// populate it for implementations that distinguish how a call's result is
/// to be shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    Void,
    Scalar,
    List,
    Map,
}

fn context_value(context: Option<Context>) -> Value {
    match context {
        Some(c) => json!(c),
        None => Value::Null,
    }
}

pub(crate) fn call_function(
    name: &str,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    context: Option<Context>,
) -> Value {
    json!({
        "action": "call_function",
        "name": name,
        "args": args,
        "kwargs": kwargs,
        "context": context_value(context),
    })
}

pub(crate) fn call_class_method(
    class: &str,
    name: &str,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    context: Option<Context>,
) -> Value {
    json!({
        "action": "call_class_method",
        "class": class,
        "name": name,
        "args": args,
        "kwargs": kwargs,
        "context": context_value(context),
    })
}

pub(crate) fn call_method(
    number: u64,
    name: &str,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    context: Option<Context>,
) -> Value {
    json!({
        "action": "call_method",
        "number": number,
        "name": name,
        "args": args,
        "kwargs": kwargs,
        "context": context_value(context),
    })
}

pub(crate) fn construct_object(class: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Value {
    json!({
        "action": "construct_object",
        "class": class,
        "args": args,
        "kwargs": kwargs,
    })
}

pub(crate) fn destroy_object(number: u64) -> Value {
    json!({
        "action": "destroy_object",
        "number": number,
    })
}

pub(crate) fn get_attribute(number: u64, name: &str) -> Value {
    json!({
        "action": "get_attribute",
        "number": number,
        "name": name,
    })
}

pub(crate) fn set_attribute(number: u64, name: &str, value: Value) -> Value {
    json!({
        "action": "set_attribute",
        "number": number,
        "name": name,
        "value": value,
    })
}

pub(crate) fn get_value(name: &str) -> Value {
    json!({
        "action": "get_value",
        "name": name,
    })
}

pub(crate) fn set_value(name: &str, value: Value) -> Value {
    json!({
        "action": "set_value",
        "name": name,
        "value": value,
    })
}

pub(crate) fn import_module(name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Value {
    json!({
        "action": "import_module",
        "name": name,
        "args": args,
        "kwargs": kwargs,
    })
}

/// Build a `result` response.
pub(crate) fn result(value: Value) -> Value {
    json!({
        "action": "result",
        "result": value,
    })
}

/// Build an `exception` response.
pub(crate) fn exception(message: &str) -> Value {
    json!({
        "action": "exception",
        "message": message,
    })
}

/// Read a required string field from a message.
pub(crate) fn field_str<'a>(message: &'a Value, key: &str) -> Result<&'a str> {
    message
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| TacoError::InvalidArguments(format!("missing field \"{key}\"")))
}

/// Read a required object-number field from a message.
pub(crate) fn field_number(message: &Value, key: &str) -> Result<u64> {
    message
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| TacoError::InvalidArguments(format!("missing field \"{key}\"")))
}
