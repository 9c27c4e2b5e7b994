//! Attribute macros for exposing container members over farcall.
//!
//! `#[container]` goes on the struct and registers the container name,
//! its alias list, and every `#[expose]`d field as a datum. `#[members]`
//! goes on an inherent impl block and registers every `#[expose]`d method
//! as a callable (associated constants become static immutable datums).
//! Both emit compile-time member tables; the registry joins registered
//! instances against those tables at scan time.
//!
//! # Example
//!
//! ```ignore
//! use farcall::{container, members, DatumCell};
//!
//! #[container(aliases(api::Greeting))]
//! pub struct Greeter {
//!     #[expose(description = "Greeting prefix")]
//!     prefix: DatumCell<String>,
//! }
//!
//! #[members]
//! impl Greeter {
//!     #[expose]
//!     fn hi(&self) -> String {
//!         "hello".to_owned()
//!     }
//!
//!     #[expose(name = "shout", secured = "key")]
//!     fn shout_upper(&self, text: String) -> String {
//!         text.to_uppercase()
//!     }
//! }
//! ```
//!
//! # `#[expose]` arguments
//!
//! - `name = "..."` - wire member name; lets two methods share a name to
//!   form an overload set
//! - `description = "..."` - free-text documentation for introspection
//! - `secured` / `secured = "token" | "key" | "either"` - demand a
//!   credential family (bare `secured` means either)
//! - `immutable` - a `DatumCell` field that still refuses writes
//! - `stream` - the method returns a stream whose items are collected
//!   (needs the `streaming` feature on `farcall`)

use proc_macro::TokenStream;

mod container;
mod members;
mod util;

/// Declare a struct as an exposable container.
///
/// Arguments: `name = "..."` overrides the container name (defaults to
/// the type's short name); `aliases(path, ...)` lists abstract types this
/// container is also resolvable under. Alias paths under platform or
/// framework prefixes are ignored at scan time.
#[proc_macro_attribute]
pub fn container(args: TokenStream, input: TokenStream) -> TokenStream {
    container::expand(args.into(), input.into())
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Register the `#[expose]`d methods and constants of an inherent impl
/// block as members of the container.
#[proc_macro_attribute]
pub fn members(args: TokenStream, input: TokenStream) -> TokenStream {
    members::expand(args.into(), input.into())
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
