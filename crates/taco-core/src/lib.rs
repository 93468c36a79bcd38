//! Taco Core - cross-language remote-object bridge.
//!
//! A Taco client spawns a server subprocess (in any language with a Taco
//! server implementation) and drives it over its stdin/stdout pipes with
//! newline-delimited JSON messages: calling functions, constructing objects,
//! invoking methods, and reading or assigning variables, as if the two
//! processes shared a runtime. Live server-side objects never cross the
//! wire; they travel as numbered handles and come back as lightweight
//! proxies.
//!
//! This crate provides both sides: the client facade and proxies, and a
//! server whose "reflection" is an explicit registry of modules the
//! embedding program exposes.
//!
//! # Example
//!
//! ```rust,ignore
//! use taco_core::{Args, Taco};
//!
//! #[tokio::main]
//! async fn main() -> taco_core::Result<()> {
//!     let taco = Taco::builder().lang("rust").spawn()?;
//!
//!     taco.import_module("datetime", Args::none()).await?;
//!     let dt = taco
//!         .construct_object("datetime.datetime", Args::positional([2000i64, 12, 25]))
//!         .await?;
//!     let text = dt.call_method("strftime", Args::none().arg("%Y-%m-%d")).await?;
//!     println!("{:?}", text.as_str());
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-export commonly used types
pub use client::object::{RemoteConstructor, RemoteFunction, RemoteMethod, TacoObject};
pub use client::value::TacoValue;
pub use client::{Args, Taco, TacoBuilder};
pub use error::{Result, TacoError};
pub use protocol::Context;
pub use server::registry::{
    Binding, CallArgs, Module, ModuleRegistry, NativeClass, NativeFunction, ServerObject,
};
pub use server::value::ServerValue;
pub use server::{ServerState, TacoServer};
pub use transport::Transport;
