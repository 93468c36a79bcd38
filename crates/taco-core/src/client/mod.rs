//! Taco client: spawns a server subprocess and drives it over its pipes.
//!
//! The protocol is strictly half-duplex (one request, one response), so all
//! stream access funnels through one `tokio::sync::Mutex`. Queued releases
//! from dropped proxies are flushed before each interaction, keeping
//! `destroy_object` traffic on the same single-request cadence.

pub mod object;
pub mod value;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{Result, TacoError};
use crate::protocol::{self, Context, ACTION_EXCEPTION, ACTION_RESULT};
use crate::transport::Transport;

use object::{RemoteConstructor, RemoteFunction, TacoObject};
use std::sync::Arc;
use value::TacoValue;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type DynTransport = Transport<BufReader<BoxedReader>, BoxedWriter>;

/// Positional arguments, keyword arguments, and context of one call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<TacoValue>,
    keyword: BTreeMap<String, TacoValue>,
    context: Option<Context>,
}

impl Args {
    /// No arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Positional arguments only.
    pub fn positional<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TacoValue>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append one positional argument.
    pub fn arg(mut self, value: impl Into<TacoValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Add one keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<TacoValue>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Set the call's context hint.
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub(crate) fn to_wire(
        &self,
        disable_context: bool,
    ) -> (Vec<Value>, Map<String, Value>, Option<Context>) {
        let args = self.positional.iter().map(TacoValue::to_wire).collect();
        let kwargs = self
            .keyword
            .iter()
            .map(|(k, v)| (k.clone(), v.to_wire()))
            .collect();
        let context = if disable_context { None } else { self.context };
        (args, kwargs, context)
    }
}

/// Client state shared with the proxies it hands out.
pub(crate) struct Shared {
    io: Mutex<Io>,
    release_tx: mpsc::UnboundedSender<u64>,
    pub(crate) disable_context: bool,
}

struct Io {
    transport: DynTransport,
    release_rx: mpsc::UnboundedReceiver<u64>,
}

impl Shared {
    /// Queue a dropped proxy's handle for release on the next interaction.
    pub(crate) fn queue_release(&self, number: u64) -> bool {
        self.release_tx.send(number).is_ok()
    }

    /// One request/response exchange, preceded by any queued releases.
    pub(crate) async fn interact(self: &Arc<Self>, request: Value) -> Result<TacoValue> {
        let mut io = self.io.lock().await;
        let Io {
            transport,
            release_rx,
        } = &mut *io;

        while let Ok(number) = release_rx.try_recv() {
            debug!(number, "releasing dropped object");
            if let Err(e) = Self::round_trip(transport, &protocol::destroy_object(number)).await {
                debug!(number, error = %e, "ignoring release failure");
            }
        }

        let response = Self::round_trip(transport, &request).await?;
        self.interpret(response)
    }

    async fn round_trip(transport: &mut DynTransport, request: &Value) -> Result<Value> {
        transport.write(request).await?;
        transport.read().await?.ok_or_else(|| TacoError::Transport {
            message: "server closed the stream before responding".to_string(),
            source: None,
        })
    }

    /// Unwrap a response: `result` yields its value, `exception` raises the
    /// received error, anything else is a protocol violation.
    fn interpret(self: &Arc<Self>, mut response: Value) -> Result<TacoValue> {
        let action = response
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| TacoError::Protocol("response has no action".to_string()))?;

        match action.as_str() {
            ACTION_RESULT => {
                let result = response.get_mut("result").map(Value::take).ok_or_else(|| {
                    TacoError::Protocol("result response has no result field".to_string())
                })?;
                TacoValue::from_wire(result, self)
            }
            ACTION_EXCEPTION => {
                let message = response
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        TacoError::Protocol("exception response has no message".to_string())
                    })?;
                Err(TacoError::Received(message.to_string()))
            }
            other => Err(TacoError::UnknownAction(other.to_string())),
        }
    }

    /// Interact and require an object result.
    pub(crate) async fn construct(self: &Arc<Self>, request: Value) -> Result<TacoObject> {
        match self.interact(request).await? {
            TacoValue::Object(object) => Ok(object),
            other => Err(TacoError::Protocol(format!(
                "constructor returned a {}, not an object",
                other.kind()
            ))),
        }
    }
}

/// Builder for a [`Taco`] client.
///
/// The server executable is named either explicitly (`script`) or through a
/// language tag (`lang`), which resolves to `taco-<lang>` on the search
/// path. One of the two must be given.
#[derive(Debug, Default)]
pub struct TacoBuilder {
    script: Option<PathBuf>,
    lang: Option<String>,
    disable_context: bool,
}

impl TacoBuilder {
    /// Explicit path of the server executable.
    pub fn script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Language tag; the executable `taco-<lang>` is used.
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Never transmit context hints, even when set on [`Args`].
    pub fn disable_context(mut self, disable: bool) -> Self {
        self.disable_context = disable;
        self
    }

    /// Spawn the server subprocess and connect to it.
    ///
    /// The child's stdin/stdout carry the protocol; its stderr is inherited
    /// so server-side diagnostics stay visible without corrupting framing.
    pub fn spawn(self) -> Result<Taco> {
        let script = match (self.script, &self.lang) {
            (Some(script), _) => script,
            (None, Some(lang)) => PathBuf::from(format!("taco-{lang}")),
            (None, None) => {
                return Err(TacoError::Config(
                    "language or script not specified".to_string(),
                ))
            }
        };

        debug!(script = %script.display(), "spawning taco server");

        let mut child = Command::new(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TacoError::Spawn {
                script: script.clone(),
                message: e.to_string(),
                source: Some(e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| TacoError::Spawn {
            script: script.clone(),
            message: "child stdout not captured".to_string(),
            source: None,
        })?;
        let stdin = child.stdin.take().ok_or_else(|| TacoError::Spawn {
            script,
            message: "child stdin not captured".to_string(),
            source: None,
        })?;

        Ok(Taco::from_parts(
            Box::new(stdout),
            Box::new(stdin),
            Some(child),
            self.disable_context,
        ))
    }
}

/// Taco client: the request-building facade over one server connection.
pub struct Taco {
    shared: Arc<Shared>,
    /// Server subprocess, when this client spawned one. Killed on drop.
    #[allow(dead_code)]
    child: Option<Child>,
}

impl std::fmt::Debug for Taco {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Taco")
            .field("has_child", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

impl Taco {
    pub fn builder() -> TacoBuilder {
        TacoBuilder::default()
    }

    /// Client over arbitrary streams, for in-process servers and tests.
    pub fn from_streams(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::from_parts(Box::new(reader), Box::new(writer), None, false)
    }

    fn from_parts(
        reader: BoxedReader,
        writer: BoxedWriter,
        child: Option<Child>,
        disable_context: bool,
    ) -> Self {
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                io: Mutex::new(Io {
                    transport: Transport::new(BufReader::new(reader), writer),
                    release_rx,
                }),
                release_tx,
                disable_context,
            }),
            child,
        }
    }

    /// Call a function in the server.
    pub async fn call_function(&self, name: &str, args: Args) -> Result<TacoValue> {
        let (a, k, context) = args.to_wire(self.shared.disable_context);
        self.shared
            .interact(protocol::call_function(name, a, k, context))
            .await
    }

    /// Call a class method in the server.
    pub async fn call_class_method(
        &self,
        class: &str,
        name: &str,
        args: Args,
    ) -> Result<TacoValue> {
        let (a, k, context) = args.to_wire(self.shared.disable_context);
        self.shared
            .interact(protocol::call_class_method(class, name, a, k, context))
            .await
    }

    /// Construct an object in the server, returning its proxy.
    pub async fn construct_object(&self, class: &str, args: Args) -> Result<TacoObject> {
        let (a, k, _) = args.to_wire(true);
        self.shared
            .construct(protocol::construct_object(class, a, k))
            .await
    }

    /// Read a (possibly dotted) variable.
    pub async fn get_value(&self, name: &str) -> Result<TacoValue> {
        self.shared.interact(protocol::get_value(name)).await
    }

    /// Assign a (possibly dotted) variable.
    pub async fn set_value(&self, name: &str, value: impl Into<TacoValue>) -> Result<()> {
        self.shared
            .interact(protocol::set_value(name, value.into().to_wire()))
            .await
            .map(|_| ())
    }

    /// Load a module in the server; with extra names, bind those names from
    /// the module instead of the module itself.
    pub async fn import_module(&self, name: &str, args: Args) -> Result<()> {
        let (a, k, _) = args.to_wire(true);
        self.shared
            .interact(protocol::import_module(name, a, k))
            .await
            .map(|_| ())
    }

    /// Curried function handle, like [`Taco::call_function`] with the name
    /// fixed.
    pub fn function(&self, name: impl Into<String>) -> RemoteFunction {
        RemoteFunction {
            client: self.shared.clone(),
            name: name.into(),
        }
    }

    /// Curried constructor handle, like [`Taco::construct_object`] with the
    /// class fixed.
    pub fn constructor(&self, class: impl Into<String>) -> RemoteConstructor {
        RemoteConstructor {
            client: self.shared.clone(),
            class: class.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duplex_client() -> Taco {
        let (client_end, _server_end) = tokio::io::duplex(4096);
        let (rx, tx) = tokio::io::split(client_end);
        Taco::from_streams(rx, tx)
    }

    async fn queued(taco: &Taco) -> Vec<u64> {
        let mut io = taco.shared.io.lock().await;
        let mut numbers = Vec::new();
        while let Ok(n) = io.release_rx.try_recv() {
            numbers.push(n);
        }
        numbers
    }

    #[tokio::test]
    async fn dropping_last_proxy_clone_queues_one_release() {
        let taco = duplex_client();
        let proxy = TacoObject::attach(taco.shared.clone(), 7);
        let clone = proxy.clone();

        drop(proxy);
        assert_eq!(queued(&taco).await, Vec::<u64>::new());

        drop(clone);
        assert_eq!(queued(&taco).await, vec![7]);
    }

    #[tokio::test]
    async fn builder_without_script_or_lang_is_a_config_error() {
        let err = Taco::builder().spawn().unwrap_err();
        assert!(matches!(err, TacoError::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn disable_context_strips_context_hints() {
        let args = Args::none().arg(1i64).context(Context::Scalar);
        let (_, _, context) = args.to_wire(true);
        assert_eq!(context, None);
        let (_, _, context) = args.to_wire(false);
        assert_eq!(context, Some(Context::Scalar));
    }
}
