//! JSON text codec for wire messages.
//!
//! Messages are serialized with the conventional `", "` and `": "`
//! separators, so a frame's payload is byte-identical across the bridge's
//! language implementations. Decoding is plain JSON; object-reference
//! substitution happens in the per-side value walks, not here.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{json, Map, Value};
use std::io;

use crate::error::{Result, TacoError};
use crate::protocol::OBJECT_KEY;

/// Compact JSON formatter with a space after `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !first {
            writer.write_all(b", ")?;
        }
        Ok(())
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !first {
            writer.write_all(b", ")?;
        }
        Ok(())
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Encode one message as JSON text.
pub fn encode(message: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    message.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| TacoError::Decode {
        message: format!("encoded message is not UTF-8: {e}"),
        source: None,
    })
}

/// Decode JSON text into a message.
pub fn decode(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(text)?)
}

/// Wire form of a remote object reference.
pub(crate) fn object_ref(number: u64) -> Value {
    json!({ OBJECT_KEY: number })
}

/// If `map` is a remote object reference, extract its handle number.
///
/// A reference with a non-integer handle is malformed.
pub(crate) fn object_ref_number(map: &Map<String, Value>) -> Option<Result<u64>> {
    map.get(OBJECT_KEY).map(|v| {
        v.as_u64().ok_or_else(|| TacoError::Decode {
            message: format!("object reference with non-integer handle: {v}"),
            source: None,
        })
    })
}
