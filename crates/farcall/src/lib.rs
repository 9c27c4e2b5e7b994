//! # farcall - expose in-process members over gRPC
//!
//! farcall makes ordinary methods, fields, and associated constants of
//! your own types addressable over a gRPC wire protocol. Annotate the
//! members to expose, register live instances at startup, and the gateway
//! serves four operations: invoke a callable, write a datum, describe all
//! members, and a bidirectional invocation stream. Secured members demand
//! a bearer token (validated against a remote key set), a shared API key,
//! or either.
//!
//! ## Expose a container
//!
//! ```rust,ignore
//! use farcall::{container, members, DatumCell};
//!
//! #[container(aliases(api::Greeting))]
//! pub struct Greeter {
//!     #[expose(description = "Current greeting prefix")]
//!     prefix: DatumCell<String>,
//! }
//!
//! #[members]
//! impl Greeter {
//!     #[expose(description = "Greets the caller")]
//!     fn hi(&self) -> String {
//!         "hello".to_owned()
//!     }
//!
//!     #[expose(secured = "token", description = "Operator-only reset")]
//!     fn reset(&self) {
//!         self.prefix.set(String::new());
//!     }
//! }
//! ```
//!
//! ## Serve
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use farcall::{FarcallConfig, FarcallServer, RegistryBuilder};
//!
//! #[tokio::main]
//! async fn main() -> farcall::Result<()> {
//!     let registry = RegistryBuilder::default()
//!         .register(Arc::new(Greeter::default()))
//!         .scan();
//!     let config = FarcallConfig::from_file("farcall.toml")?.from_env();
//!     FarcallServer::new(config, Arc::new(registry)).serve().await
//! }
//! ```
//!
//! ## Feature flags
//!
//! - `streaming`: members marked `#[expose(stream)]` may return a
//!   `futures::Stream`; items are collected into a JSON array.

/// Attribute macros that emit the compile-time member tables.
pub use farcall_derive::{container, members};

/// Credential enforcement: context, validators, and the authenticator.
pub mod auth;

/// Startup configuration.
pub mod config;

/// Argument marshalling, invocation, and overload inference.
pub mod dispatch;

/// Error kinds and their transport status mapping.
pub mod error;

/// Wire types, interceptor, service, and server.
pub mod grpc;

/// The discovery payload.
pub mod introspect;

/// The member model.
pub mod member;

/// Member discovery, indexing, and name resolution.
pub mod registry;

pub use auth::{Authenticator, CredentialContext};
pub use config::FarcallConfig;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use grpc::{FarcallServer, MemberServiceImpl};
pub use member::{
    CallFault, CredentialFamily, DatumCell, Handler, MemberDef, MemberKind, Outcome,
    ParameterSpec, ValueShape,
};
pub use registry::{Container, Lookup, Registry, RegistryBuilder};

// Generated member tables lean on these crates; re-exported so annotated
// downstream code resolves them through `farcall` itself.
pub use linkme;
pub use serde_json;

/// Commonly used imports.
pub mod prelude {
    pub use crate::auth::{Authenticator, CredentialContext};
    pub use crate::config::FarcallConfig;
    pub use crate::error::{Error, Result};
    pub use crate::grpc::FarcallServer;
    pub use crate::member::{CredentialFamily, DatumCell, MemberDef, MemberKind};
    pub use crate::registry::{Container, Registry, RegistryBuilder};
    pub use crate::{container, members};
}
