//! Remote object proxies.
//!
//! A `TacoObject` stands in for an object living in the server's memory,
//! holding only the client handle and the object number. Proxies are only
//! created by decoding a reference out of a response, never directly.
//!
//! Release is deterministic: the proxy is reference counted, and when the
//! last clone drops, its number is queued on the client's release channel
//! and a `destroy_object` request goes out before the next interaction.
//! `release()` does the round-trip immediately. Either way the server-side
//! entry is removed exactly once, and failures after the transport is gone
//! are tolerated.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::value::TacoValue;
use crate::client::{Args, Shared};
use crate::error::Result;
use crate::protocol;

/// Client-side stand-in for a server-side object.
#[derive(Clone)]
pub struct TacoObject {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    client: Arc<Shared>,
    number: u64,
    released: AtomicBool,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            // Queued for the next interaction; nothing to do if the client
            // is already gone.
            let _ = self.client.queue_release(self.number);
        }
    }
}

impl TacoObject {
    /// Wrap a decoded reference. Only the response decoder calls this.
    pub(crate) fn attach(client: Arc<Shared>, number: u64) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                client,
                number,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// The handle number identifying the object on the server.
    pub fn number(&self) -> u64 {
        self.inner.number
    }

    /// Invoke a method on the remote object.
    pub async fn call_method(&self, name: &str, args: Args) -> Result<TacoValue> {
        let client = &self.inner.client;
        let (a, k, context) = args.to_wire(client.disable_context);
        client
            .interact(protocol::call_method(self.inner.number, name, a, k, context))
            .await
    }

    /// Read an attribute of the remote object.
    pub async fn get_attribute(&self, name: &str) -> Result<TacoValue> {
        self.inner
            .client
            .interact(protocol::get_attribute(self.inner.number, name))
            .await
    }

    /// Write an attribute of the remote object.
    pub async fn set_attribute(&self, name: &str, value: impl Into<TacoValue>) -> Result<()> {
        self.inner
            .client
            .interact(protocol::set_attribute(
                self.inner.number,
                name,
                value.into().to_wire(),
            ))
            .await
            .map(|_| ())
    }

    /// Destroy the server-side object now.
    ///
    /// Subsequent clones of this proxy are released too; using them after
    /// this fails with a remote handle-resolution error.
    pub async fn release(&self) -> Result<()> {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner
            .client
            .interact(protocol::destroy_object(self.inner.number))
            .await
            .map(|_| ())
    }

    /// Curried method handle.
    pub fn method(&self, name: impl Into<String>) -> RemoteMethod {
        RemoteMethod {
            object: self.clone(),
            name: name.into(),
        }
    }
}

impl fmt::Debug for TacoObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TacoObject").field(&self.inner.number).finish()
    }
}

/// A remote function bound to its name, callable repeatedly.
pub struct RemoteFunction {
    pub(crate) client: Arc<Shared>,
    pub(crate) name: String,
}

impl RemoteFunction {
    pub async fn call(&self, args: Args) -> Result<TacoValue> {
        let (a, k, context) = args.to_wire(self.client.disable_context);
        self.client
            .interact(protocol::call_function(&self.name, a, k, context))
            .await
    }
}

/// A remote class bound to its name, constructible repeatedly.
pub struct RemoteConstructor {
    pub(crate) client: Arc<Shared>,
    pub(crate) class: String,
}

impl RemoteConstructor {
    pub async fn new_instance(&self, args: Args) -> Result<TacoObject> {
        let (a, k, _) = args.to_wire(true);
        self.client
            .construct(protocol::construct_object(&self.class, a, k))
            .await
    }
}

/// A method of one remote object, bound to its name.
pub struct RemoteMethod {
    object: TacoObject,
    name: String,
}

impl RemoteMethod {
    pub async fn call(&self, args: Args) -> Result<TacoValue> {
        self.object.call_method(&self.name, args).await
    }
}
