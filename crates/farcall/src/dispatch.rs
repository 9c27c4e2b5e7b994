//! Dispatch: argument marshalling, invocation, datum reads and writes, and
//! overload inference by argument shape.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::member::{CallFault, Handler, MemberDef, Outcome, ParameterSpec, ValueShape};

/// Sentinel yielded for callables whose declared result type is void.
pub fn accepted_sentinel() -> Value {
    json!({"status": "accepted"})
}

/// Executes resolved members.
#[derive(Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    /// Invoke a callable, or read a datum addressed through the invoke
    /// operation (arguments are ignored for datums, matching the read path).
    pub async fn invoke(&self, member: &MemberDef, args: Vec<Value>) -> Result<Value> {
        match &member.handler {
            Handler::Datum { read, .. } => read().map_err(|fault| fault_error(member, fault)),
            Handler::Callable { invoke } => {
                if args.len() != member.parameters.len() {
                    return Err(Error::ArityMismatch {
                        expected: member.parameters.len(),
                        actual: args.len(),
                    });
                }
                match invoke(args).await {
                    Ok(Outcome::Accepted) => Ok(accepted_sentinel()),
                    Ok(Outcome::Value(value)) => Ok(value),
                    Err(fault) => Err(fault_error(member, fault)),
                }
            }
        }
    }

    /// Write a datum, returning the serialized previous value.
    pub fn write(&self, member: &MemberDef, value: Value) -> Result<Value> {
        match &member.handler {
            Handler::Callable { .. } => Err(Error::WrongKindForWrite(member.base_key())),
            Handler::Datum { write, .. } => {
                if member.immutable {
                    return Err(Error::ImmutableTarget(member.base_key()));
                }
                let write = write
                    .as_ref()
                    .ok_or_else(|| Error::ImmutableTarget(member.base_key()))?;
                let previous = write(value).map_err(|fault| fault_error(member, fault))?;
                debug!("farcall: wrote {}", member.base_key());
                Ok(previous)
            }
        }
    }

    /// Narrow an overload set by checking each candidate's parameter shapes
    /// against the supplied argument values. Returns the single match, or
    /// `None` when zero or multiple candidates remain.
    pub fn infer_overload(
        &self,
        candidates: &[Arc<MemberDef>],
        args: &[Value],
    ) -> Option<Arc<MemberDef>> {
        let matching: Vec<&Arc<MemberDef>> = candidates
            .iter()
            .filter(|def| shapes_compatible(&def.parameters, args))
            .collect();
        match matching.as_slice() {
            [single] => Some(Arc::clone(single)),
            _ => None,
        }
    }
}

fn fault_error(member: &MemberDef, fault: CallFault) -> Error {
    match fault {
        CallFault::Marshal(message) => {
            Error::Marshal(format!("{}: {}", member.base_key(), message))
        }
        CallFault::Target(message) => Error::Invocation(message),
    }
}

fn shapes_compatible(params: &[ParameterSpec], args: &[Value]) -> bool {
    params.len() == args.len()
        && params
            .iter()
            .zip(args)
            .all(|(param, arg)| shape_accepts(param, arg))
}

fn shape_accepts(param: &ParameterSpec, arg: &Value) -> bool {
    if param.shape == ValueShape::Any {
        return true;
    }
    match arg {
        Value::Null => param.nullable,
        Value::String(_) => param.shape == ValueShape::Str,
        Value::Number(_) => param.shape == ValueShape::Num,
        Value::Bool(_) => param.shape == ValueShape::Bool,
        Value::Object(_) => param.shape == ValueShape::Obj,
        Value::Array(_) => param.shape == ValueShape::List,
    }
}

/// Render the ambiguity diagnostic listing every candidate signature.
pub fn ambiguity_message(
    container: &str,
    member: &str,
    candidates: &[Arc<MemberDef>],
) -> String {
    let signatures: Vec<String> = candidates.iter().map(|c| c.signature()).collect();
    format!(
        "ambiguous member '{member}' on {container} - specify parameterTypeNames to \
         disambiguate; available: [{}]",
        signatures.join(", ")
    )
}

// ============================================================================
// Helpers called from generated member tables
// ============================================================================

/// Convert one wire argument to its declared parameter type.
pub fn decode_arg<T: DeserializeOwned>(
    name: &str,
    value: Value,
) -> std::result::Result<T, CallFault> {
    serde_json::from_value(value)
        .map_err(|err| CallFault::Marshal(format!("argument '{name}': {err}")))
}

/// Serialize a member result into an [`Outcome`].
pub fn encode_outcome<T: Serialize>(value: &T) -> std::result::Result<Outcome, CallFault> {
    Ok(Outcome::Value(encode_value(value)?))
}

/// Serialize a datum value.
pub fn encode_value<T: Serialize>(value: &T) -> std::result::Result<Value, CallFault> {
    serde_json::to_value(value).map_err(CallFault::marshal)
}

/// Collect a multi-valued stream result into a JSON array.
#[cfg(feature = "streaming")]
pub async fn collect_stream<S>(stream: S) -> std::result::Result<Outcome, CallFault>
where
    S: futures::Stream,
    S::Item: Serialize,
{
    use futures::StreamExt;

    let mut items = Vec::new();
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        items.push(encode_value(&item)?);
    }
    Ok(Outcome::Value(Value::Array(items)))
}
