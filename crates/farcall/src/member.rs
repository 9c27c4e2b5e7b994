//! The member model: everything the registry knows about one exposable
//! member, plus the boxed handler functions generated by the attribute
//! macros.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

/// What kind of member this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Accepts an ordered list of typed parameters and returns one value.
    Callable,
    /// A named cell holding one value.
    Datum,
}

/// Which credential family a secured member accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFamily {
    /// Only a bearer token is accepted; a key alongside it is ignored.
    TokenOnly,
    /// Only a shared key is accepted; a token alongside it is ignored.
    KeyOnly,
    /// Either credential is accepted; the token is tried first.
    Either,
}

impl fmt::Display for CredentialFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialFamily::TokenOnly => write!(f, "token"),
            CredentialFamily::KeyOnly => write!(f, "key"),
            CredentialFamily::Either => write!(f, "either"),
        }
    }
}

/// The wire-value shape a parameter is compatible with.
///
/// Computed at macro expansion time from the declared parameter type, and
/// consulted by overload inference when a call carries no explicit
/// parameter type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// String-shaped wire values.
    Str,
    /// Number-shaped wire values.
    Num,
    /// Boolean wire values.
    Bool,
    /// Object-shaped (map-like) wire values, deserialized field-by-name.
    Obj,
    /// Array-shaped wire values.
    List,
    /// `serde_json::Value` parameters accept any wire value.
    Any,
}

/// One formal parameter of a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    /// Short type name as declared, used for exact overload pinning.
    pub type_name: String,
    pub index: u32,
    pub shape: ValueShape,
    /// `Option<_>` parameters accept the wire null.
    pub nullable: bool,
}

/// What a callable invocation produced.
pub enum Outcome {
    /// The member returns no value; the surface yields the accepted sentinel.
    Accepted,
    /// A serialized result value.
    Value(Value),
}

/// A failure raised inside a generated handler.
#[derive(Debug)]
pub enum CallFault {
    /// An argument or cell value could not be converted to its declared type.
    Marshal(String),
    /// The target member itself failed.
    Target(String),
}

impl CallFault {
    pub fn marshal(message: impl fmt::Display) -> Self {
        CallFault::Marshal(message.to_string())
    }

    pub fn target(message: impl fmt::Display) -> Self {
        CallFault::Target(message.to_string())
    }
}

/// Invokes a callable with already-ordered wire arguments.
pub type InvokeFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, std::result::Result<Outcome, CallFault>> + Send + Sync>;

/// Reads a datum cell.
pub type ReadFn = Arc<dyn Fn() -> std::result::Result<Value, CallFault> + Send + Sync>;

/// Writes a datum cell, returning the serialized previous value.
pub type WriteFn = Arc<dyn Fn(Value) -> std::result::Result<Value, CallFault> + Send + Sync>;

/// The reflection-free handle used to invoke or read/write a member.
#[derive(Clone)]
pub enum Handler {
    Callable { invoke: InvokeFn },
    Datum { read: ReadFn, write: Option<WriteFn> },
}

/// One exposable member, fully described.
///
/// Built by the generated member tables during the registry scan; never
/// mutated afterwards.
#[derive(Clone)]
pub struct MemberDef {
    pub container_name: String,
    pub member_name: String,
    pub kind: MemberKind,
    pub secured: bool,
    /// Present iff `secured`.
    pub credential_family: Option<CredentialFamily>,
    /// Datums that refuse writes. Always true for callables.
    pub immutable: bool,
    /// Bound to the type rather than an instance.
    pub is_static: bool,
    pub parameters: Vec<ParameterSpec>,
    /// Short name of the declared result type; `"void"` for no-return callables.
    pub return_type_name: String,
    pub description: String,
    pub handler: Handler,
}

impl MemberDef {
    /// `Container.member` - the overload-unaware key.
    pub fn base_key(&self) -> String {
        format!("{}.{}", self.container_name, self.member_name)
    }

    /// The canonical key: `Container.member` for datums,
    /// `Container.member(T1,T2)` for callables.
    pub fn full_key(&self) -> String {
        match self.kind {
            MemberKind::Datum => self.base_key(),
            MemberKind::Callable => {
                let types: Vec<&str> =
                    self.parameters.iter().map(|p| p.type_name.as_str()).collect();
                format!("{}({})", self.base_key(), types.join(","))
            }
        }
    }

    /// `member(Type name, ...)` - used in ambiguity diagnostics.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.type_name, p.name))
            .collect();
        format!("{}({})", self.member_name, params.join(", "))
    }

    /// A datum is writeable when it is not immutable. Callables never are.
    pub fn writeable(&self) -> bool {
        self.kind == MemberKind::Datum && !self.immutable
    }

    /// Content line used to compare registries by value.
    pub fn descriptor_line(&self) -> String {
        format!(
            "{}|{:?}|secured={}|family={:?}|immutable={}|static={}|returns={}",
            self.full_key(),
            self.kind,
            self.secured,
            self.credential_family,
            self.immutable,
            self.is_static,
            self.return_type_name,
        )
    }
}

impl fmt::Debug for MemberDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDef")
            .field("key", &self.full_key())
            .field("kind", &self.kind)
            .field("secured", &self.secured)
            .field("credential_family", &self.credential_family)
            .field("immutable", &self.immutable)
            .field("is_static", &self.is_static)
            .field("return_type_name", &self.return_type_name)
            .finish()
    }
}

/// A writeable datum cell.
///
/// Fields exposed as mutable datums must be declared as `DatumCell<T>`;
/// plain fields are immutable by construction. Writes go through the
/// cell's lock, so concurrent writers are last-writer-wins.
pub struct DatumCell<T>(RwLock<T>);

impl<T> DatumCell<T> {
    pub fn new(value: T) -> Self {
        DatumCell(RwLock::new(value))
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.read())
    }

    /// Replace the value, returning the previous one.
    pub fn set(&self, value: T) -> T {
        std::mem::replace(&mut *self.0.write(), value)
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.read().clone()
    }
}

impl<T: Default> Default for DatumCell<T> {
    fn default() -> Self {
        DatumCell::new(T::default())
    }
}

impl<T> From<T> for DatumCell<T> {
    fn from(value: T) -> Self {
        DatumCell::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for DatumCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatumCell").field(&*self.0.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callable(container: &str, member: &str, types: &[&str]) -> MemberDef {
        MemberDef {
            container_name: container.to_owned(),
            member_name: member.to_owned(),
            kind: MemberKind::Callable,
            secured: false,
            credential_family: None,
            immutable: true,
            is_static: false,
            parameters: types
                .iter()
                .enumerate()
                .map(|(i, t)| ParameterSpec {
                    name: format!("p{i}"),
                    type_name: (*t).to_owned(),
                    index: i as u32,
                    shape: ValueShape::Any,
                    nullable: false,
                })
                .collect(),
            return_type_name: "void".to_owned(),
            description: String::new(),
            handler: Handler::Callable {
                invoke: Arc::new(|_| Box::pin(async { Ok(Outcome::Accepted) })),
            },
        }
    }

    #[test]
    fn test_full_key_callable() {
        let def = callable("Math", "square", &["i64"]);
        assert_eq!(def.full_key(), "Math.square(i64)");
        assert_eq!(def.base_key(), "Math.square");
    }

    #[test]
    fn test_full_key_no_args() {
        let def = callable("Greeter", "hi", &[]);
        assert_eq!(def.full_key(), "Greeter.hi()");
    }

    #[test]
    fn test_signature() {
        let def = callable("Math", "square", &["i64", "String"]);
        assert_eq!(def.signature(), "square(i64 p0, String p1)");
    }

    #[test]
    fn test_datum_cell_set_returns_previous() {
        let cell = DatumCell::new("1.0.0".to_owned());
        let previous = cell.set("2.0.0".to_owned());
        assert_eq!(previous, "1.0.0");
        assert_eq!(cell.get(), "2.0.0");
    }
}
