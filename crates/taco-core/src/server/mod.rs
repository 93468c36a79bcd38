//! Taco server: action dispatch against a namespace and object table.
//!
//! The server reads one request per loop iteration, executes it inside a
//! failure boundary, and writes exactly one response. Execution errors of
//! any kind become `exception` responses; only transport failures terminate
//! the loop. A clean end-of-stream from the client ends the loop normally.

pub mod namespace;
pub mod objects;
pub mod registry;
pub mod value;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, Stdin, Stdout};
use tracing::{debug, info};

use crate::error::{Result, TacoError};
use crate::protocol::{self, field_number, field_str};
use crate::transport::Transport;

use namespace::Namespace;
use objects::ObjectTable;
use registry::{Binding, CallArgs, ModuleRegistry};
use value::{lock, ServerValue};

/// The state one action executes against: namespace, object table, and the
/// registry of reachable modules.
///
/// Owned per server instance; nothing lives in process globals, so several
/// independent servers can share a process.
pub struct ServerState {
    ns: Namespace,
    objects: ObjectTable,
    registry: ModuleRegistry,
}

impl ServerState {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            ns: Namespace::new(),
            objects: ObjectTable::new(),
            registry,
        }
    }

    /// Execute one request and build its response.
    ///
    /// This is the dispatch failure boundary: errors never escape it.
    pub fn handle(&mut self, message: &Value) -> Value {
        let Some(action) = message.get("action").and_then(Value::as_str) else {
            return protocol::exception("message has no action");
        };

        debug!(action, "dispatching request");

        let outcome = match action {
            "call_function" => self.call_function(message),
            "call_class_method" => self.call_class_method(message),
            "call_method" => self.call_method(message),
            "construct_object" => self.construct_object(message),
            "destroy_object" => self.destroy_object(message),
            "get_attribute" => self.get_attribute(message),
            "set_attribute" => self.set_attribute(message),
            "get_value" => self.get_value(message),
            "set_value" => self.set_value(message),
            "import_module" => self.import_module(message),
            _ => return protocol::exception(&format!("unknown action: {action}")),
        };

        match outcome {
            Ok(value) => protocol::result(value.to_wire(&mut self.objects)),
            Err(e) => protocol::exception(&format!("exception caught: {e}")),
        }
    }

    /// Decode the `args`/`kwargs` fields, resolving object references.
    fn call_args(&self, message: &Value) -> Result<CallArgs> {
        let args = match message.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| ServerValue::from_wire(v.clone(), &self.objects))
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(TacoError::InvalidArguments(
                    "\"args\" must be a list".to_string(),
                ))
            }
        };
        let kwargs = match message.get("kwargs") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), ServerValue::from_wire(v.clone(), &self.objects)?)))
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(TacoError::InvalidArguments(
                    "\"kwargs\" must be a map".to_string(),
                ))
            }
        };
        Ok(CallArgs { args, kwargs })
    }

    fn call_function(&mut self, message: &Value) -> Result<ServerValue> {
        let name = field_str(message, "name")?;
        let args = self.call_args(message)?;
        let binding = namespace::resolve(&self.ns, &self.registry, name)?;
        match binding {
            Binding::Function(function) => function.call(args),
            Binding::Class(class) => Ok(ServerValue::Object(Arc::new(Mutex::new(
                class.construct(args)?,
            )))),
            other => Err(TacoError::InvalidArguments(format!(
                "\"{name}\" is a {}, not callable",
                other.kind()
            ))),
        }
    }

    fn call_class_method(&mut self, message: &Value) -> Result<ServerValue> {
        let class_name = field_str(message, "class")?;
        let name = field_str(message, "name")?;
        let args = self.call_args(message)?;
        match namespace::resolve(&self.ns, &self.registry, class_name)? {
            Binding::Class(class) => class.method(name)?.call(args),
            other => Err(TacoError::InvalidArguments(format!(
                "\"{class_name}\" is a {}, not a class",
                other.kind()
            ))),
        }
    }

    fn call_method(&mut self, message: &Value) -> Result<ServerValue> {
        let number = field_number(message, "number")?;
        let name = field_str(message, "name")?;
        let args = self.call_args(message)?;
        let object = self.objects.get(number)?;
        let result = lock(&object).call_method(name, args)?;
        Ok(result)
    }

    fn construct_object(&mut self, message: &Value) -> Result<ServerValue> {
        let class_name = field_str(message, "class")?;
        let args = self.call_args(message)?;
        match namespace::resolve(&self.ns, &self.registry, class_name)? {
            Binding::Class(class) => Ok(ServerValue::Object(Arc::new(Mutex::new(
                class.construct(args)?,
            )))),
            other => Err(TacoError::InvalidArguments(format!(
                "\"{class_name}\" is a {}, not a class",
                other.kind()
            ))),
        }
    }

    fn destroy_object(&mut self, message: &Value) -> Result<ServerValue> {
        let number = field_number(message, "number")?;
        self.objects.remove(number)?;
        Ok(ServerValue::Null)
    }

    fn get_attribute(&mut self, message: &Value) -> Result<ServerValue> {
        let number = field_number(message, "number")?;
        let name = field_str(message, "name")?;
        let object = self.objects.get(number)?;
        let result = lock(&object).get_attribute(name)?;
        Ok(result)
    }

    fn set_attribute(&mut self, message: &Value) -> Result<ServerValue> {
        let number = field_number(message, "number")?;
        let name = field_str(message, "name")?;
        let value = ServerValue::from_wire(
            message.get("value").cloned().unwrap_or(Value::Null),
            &self.objects,
        )?;
        let object = self.objects.get(number)?;
        lock(&object).set_attribute(name, value)?;
        Ok(ServerValue::Null)
    }

    fn get_value(&mut self, message: &Value) -> Result<ServerValue> {
        let name = field_str(message, "name")?;
        let binding = if name.contains('.') {
            namespace::resolve(&self.ns, &self.registry, name)?
        } else {
            // Bare names read namespace variables only.
            self.ns
                .get(name)
                .cloned()
                .ok_or_else(|| TacoError::NameNotFound(name.to_string()))?
        };
        match binding {
            Binding::Value(value) => Ok(value),
            other => Err(TacoError::InvalidArguments(format!(
                "\"{name}\" is a {}, not a value",
                other.kind()
            ))),
        }
    }

    fn set_value(&mut self, message: &Value) -> Result<ServerValue> {
        let name = field_str(message, "name")?;
        let value = ServerValue::from_wire(
            message.get("value").cloned().unwrap_or(Value::Null),
            &self.objects,
        )?;
        namespace::assign(&mut self.ns, &self.registry, name, value)?;
        Ok(ServerValue::Null)
    }

    fn import_module(&mut self, message: &Value) -> Result<ServerValue> {
        let name = field_str(message, "name")?;
        let args = self.call_args(message)?;
        let module = self.registry.module(name)?;

        if args.args.is_empty() {
            // Plain import: bind the module itself.
            self.ns
                .insert(module.name().to_string(), Binding::Module(module));
        } else {
            // Bind the named members into the namespace.
            for arg in &args.args {
                let member_name = arg.as_str().ok_or_else(|| {
                    TacoError::InvalidArguments("import names must be strings".to_string())
                })?;
                let binding =
                    module
                        .member(member_name)
                        .ok_or_else(|| TacoError::NoSuchAttribute {
                            target: format!("module \"{}\"", module.name()),
                            name: member_name.to_string(),
                        })?;
                self.ns.insert(member_name.to_string(), binding);
            }
        }
        Ok(ServerValue::Null)
    }
}

/// A Taco server bound to a pair of byte streams.
pub struct TacoServer<R, W> {
    transport: Transport<R, W>,
    state: ServerState,
}

impl TacoServer<BufReader<Stdin>, Stdout> {
    /// Server over this process's standard input and output.
    ///
    /// The process must keep its own diagnostics off standard output;
    /// stdout is the wire.
    pub fn stdio(registry: ModuleRegistry) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), registry)
    }
}

impl<R, W> TacoServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, registry: ModuleRegistry) -> Self {
        Self {
            transport: Transport::new(reader, writer),
            state: ServerState::new(registry),
        }
    }

    /// Message handling loop: one response per request, until the client
    /// closes the stream.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(message) = self.transport.read().await? {
            let response = self.state.handle(&message);
            self.transport.write(&response).await?;
        }
        info!("client closed the stream, server exiting");
        Ok(())
    }
}
