//! Conversions between the wire `google.protobuf.Value` and
//! `serde_json::Value`, which the core speaks internally.

use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value as ProtoValue};
use serde_json::{Map, Number, Value as JsonValue};

/// Wire value → JSON value.
///
/// Proto numbers are doubles; integral ones are normalized to integer
/// JSON numbers so numeric parameters coerce cleanly. Non-finite numbers
/// have no JSON rendering and fall back to their string form.
pub fn proto_to_json(value: ProtoValue) -> JsonValue {
    match value.kind {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(b),
        Some(Kind::NumberValue(n)) => number_to_json(n),
        Some(Kind::StringValue(s)) => JsonValue::String(s),
        Some(Kind::StructValue(s)) => JsonValue::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, proto_to_json(v)))
                .collect::<Map<String, JsonValue>>(),
        ),
        Some(Kind::ListValue(l)) => {
            JsonValue::Array(l.values.into_iter().map(proto_to_json).collect())
        }
    }
}

/// JSON value → wire value.
pub fn json_to_proto(value: JsonValue) -> ProtoValue {
    let kind = match value {
        JsonValue::Null => Kind::NullValue(0),
        JsonValue::Bool(b) => Kind::BoolValue(b),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) => Kind::NumberValue(f),
            // u64 values beyond the double range have no numeric rendering.
            None => Kind::StringValue(n.to_string()),
        },
        JsonValue::String(s) => Kind::StringValue(s),
        JsonValue::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_proto(v)))
                .collect(),
        }),
        JsonValue::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_proto).collect(),
        }),
    };
    ProtoValue { kind: Some(kind) }
}

/// Arguments list → ordered JSON values. A missing list means no arguments.
pub fn arguments_to_json(list: Option<ListValue>) -> Vec<JsonValue> {
    list.map(|l| l.values.into_iter().map(proto_to_json).collect())
        .unwrap_or_default()
}

fn number_to_json(n: f64) -> JsonValue {
    if !n.is_finite() {
        return JsonValue::String(n.to_string());
    }
    if n.fract() == 0.0 && (i64::MIN as f64..=i64::MAX as f64).contains(&n) {
        return JsonValue::Number(Number::from(n as i64));
    }
    match Number::from_f64(n) {
        Some(number) => JsonValue::Number(number),
        None => JsonValue::String(n.to_string()),
    }
}
