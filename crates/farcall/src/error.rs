//! Error types for the member gateway.

use thiserror::Error;

/// Errors that can occur while resolving, authenticating, or dispatching
/// a member operation.
#[derive(Debug, Error)]
pub enum Error {
    /// No member matched the requested container/member key at any level.
    #[error("member not found: {0}")]
    NotFound(String),

    /// An overload set could not be narrowed to a single candidate.
    #[error("{0}")]
    Ambiguous(String),

    /// Argument count does not match the member's parameter count.
    #[error("expected {expected} argument(s) but got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// A write was requested on a callable member.
    #[error("{0} is a callable, not a datum; use InvokeCallable to call it")]
    WrongKindForWrite(String),

    /// A write was requested on an immutable datum.
    #[error("datum is immutable and cannot be written: {0}")]
    ImmutableTarget(String),

    /// Missing, malformed, expired, or otherwise rejected credential.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// A member demands a credential family whose validator was never built.
    #[error("{0} authentication is not configured on this server")]
    MisconfiguredAuth(&'static str),

    /// The target member returned a failure.
    #[error("invocation failed: {0}")]
    Invocation(String),

    /// An argument or result could not be converted to the declared type.
    #[error("marshalling failed: {0}")]
    Marshal(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport failed to bind or serve.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::NotFound(_) => tonic::Status::not_found(message),
            Error::NotAuthenticated(_) | Error::MisconfiguredAuth(_) => {
                tonic::Status::unauthenticated(message)
            }
            Error::ImmutableTarget(_) => tonic::Status::failed_precondition(message),
            Error::Ambiguous(_)
            | Error::ArityMismatch { .. }
            | Error::WrongKindForWrite(_) => tonic::Status::invalid_argument(message),
            Error::Invocation(_)
            | Error::Marshal(_)
            | Error::Config(_)
            | Error::Transport(_) => tonic::Status::internal(message),
        }
    }
}
