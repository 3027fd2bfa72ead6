//! Value converter: dynamic host values to typed field values and back.
//!
//! Conversions never coerce silently. A value of the wrong shape is a
//! `TypeMismatch`, a number that does not fit the declared width is
//! `OutOfRange`, and `Null` is rejected with `NullNotAllowed`. The only
//! deliberate coercion is truthiness, applied to declared-bool fields.

use crate::arena::Arena;
use crate::descriptor::{EnumDescriptor, FieldType, MessageDescriptor};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::storage::{MapKey, TypedValue};
use crate::value::Value;

/// Convert a host value to a typed value of `field_type`.
///
/// Message values are aliased, not copied: the source message's arena is
/// fused into `arena` and its address is returned.
pub fn to_typed(value: &Value, field_type: &FieldType, arena: &Arena) -> Result<TypedValue> {
    if value.is_null() {
        return Err(Error::null_not_allowed(field_type.to_string()));
    }
    match field_type {
        FieldType::Int32 => {
            let v = integer_in_range(value, field_type, i128::from(i32::MIN), i128::from(i32::MAX))?;
            Ok(TypedValue::I32(v as i32))
        }
        FieldType::Int64 => {
            let v = integer_in_range(value, field_type, i128::from(i64::MIN), i128::from(i64::MAX))?;
            Ok(TypedValue::I64(v as i64))
        }
        FieldType::Uint32 => {
            let v = integer_in_range(value, field_type, 0, i128::from(u32::MAX))?;
            Ok(TypedValue::U32(v as u32))
        }
        FieldType::Uint64 => {
            let v = integer_in_range(value, field_type, 0, i128::from(u64::MAX))?;
            Ok(TypedValue::U64(v as u64))
        }
        FieldType::Float => {
            let v = float_value(value, field_type)?;
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                return Err(Error::out_of_range(v, "float"));
            }
            Ok(TypedValue::F32(v as f32))
        }
        FieldType::Double => Ok(TypedValue::F64(float_value(value, field_type)?)),
        FieldType::Bool => truthiness(value).map(TypedValue::Bool),
        FieldType::String => match value {
            Value::String(s) => Ok(TypedValue::String(s.clone())),
            Value::Bytes(b) => String::from_utf8(b.clone())
                .map(TypedValue::String)
                .map_err(|_| Error::InvalidEncoding {
                    context: "string field".into(),
                }),
            other => Err(Error::type_mismatch("string", other.kind_name())),
        },
        FieldType::Bytes => match value {
            Value::String(s) => Ok(TypedValue::Bytes(s.as_bytes().to_vec())),
            Value::Bytes(b) => Ok(TypedValue::Bytes(b.clone())),
            other => Err(Error::type_mismatch("bytes", other.kind_name())),
        },
        FieldType::Enum(desc) => enum_value(value, field_type, desc).map(TypedValue::Enum),
        FieldType::Message(desc) => message_value(value, desc, arena).map(TypedValue::Message),
    }
}

/// Convert a typed value back to a host value.
///
/// Message values go through the identity cache, so the same stored
/// submessage always yields the same wrapper while that wrapper is alive.
pub fn to_dynamic(value: &TypedValue, field_type: &FieldType, arena: &Arena) -> Value {
    match value {
        TypedValue::Bool(v) => Value::Bool(*v),
        TypedValue::I32(v) | TypedValue::Enum(v) => Value::Int(i64::from(*v)),
        TypedValue::I64(v) => Value::Int(*v),
        TypedValue::U32(v) => Value::Int(i64::from(*v)),
        TypedValue::U64(v) => Value::from(*v),
        TypedValue::F32(v) => Value::Float(f64::from(*v)),
        TypedValue::F64(v) => Value::Float(*v),
        TypedValue::String(v) => Value::String(v.clone()),
        TypedValue::Bytes(v) => Value::Bytes(v.clone()),
        TypedValue::Message(addr) => match field_type {
            FieldType::Message(desc) => Value::Message(Message::wrap(arena, desc, *addr)),
            other => panic!("message stored in a {other} slot"),
        },
    }
}

/// Convert a host value to a map key of `key_type`.
pub fn to_map_key(value: &Value, key_type: &FieldType, arena: &Arena) -> Result<MapKey> {
    if !key_type.is_valid_map_key() {
        return Err(Error::InvalidMapKeyType(key_type.to_string()));
    }
    let typed = to_typed(value, key_type, arena)?;
    MapKey::from_typed(typed).ok_or_else(|| Error::InvalidMapKeyType(key_type.to_string()))
}

/// Convert a map key back to a host value.
pub fn map_key_to_dynamic(key: &MapKey, key_type: &FieldType, arena: &Arena) -> Value {
    to_dynamic(&key.to_typed(key_type), key_type, arena)
}

/// Integer content of a host value, for integer-typed targets.
fn integer_in_range(value: &Value, target: &FieldType, min: i128, max: i128) -> Result<i128> {
    let v = match value {
        Value::Int(v) => i128::from(*v),
        Value::Uint(v) => i128::from(*v),
        Value::Float(f) => {
            if !f.is_finite() || f.fract() != 0.0 {
                return Err(Error::type_mismatch(target.to_string(), format!("float {f}")));
            }
            // Beyond 2^64 nothing fits; keep the cast exact.
            if f.abs() >= 2f64.powi(65) {
                return Err(Error::out_of_range(f, target.to_string()));
            }
            *f as i128
        }
        other => return Err(Error::type_mismatch(target.to_string(), other.kind_name())),
    };
    if v < min || v > max {
        return Err(Error::out_of_range(v, target.to_string()));
    }
    Ok(v)
}

fn float_value(value: &Value, target: &FieldType) -> Result<f64> {
    match value {
        Value::Float(v) => Ok(*v),
        Value::Int(v) => Ok(*v as f64),
        Value::Uint(v) => Ok(*v as f64),
        other => Err(Error::type_mismatch(target.to_string(), other.kind_name())),
    }
}

/// Canonical truthiness for declared-bool fields.
fn truthiness(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(v) => Ok(*v),
        Value::Int(v) => Ok(*v != 0),
        Value::Uint(v) => Ok(*v != 0),
        Value::Float(v) => Ok(*v != 0.0),
        Value::String(s) => Ok(!s.is_empty() && s != "0"),
        Value::Bytes(b) => Ok(!b.is_empty() && b.as_slice() != b"0"),
        other => Err(Error::type_mismatch("bool", other.kind_name())),
    }
}

fn enum_value(value: &Value, target: &FieldType, desc: &EnumDescriptor) -> Result<i32> {
    let raw = integer_in_range(value, target, i128::from(i32::MIN), i128::from(i32::MAX))? as i32;
    if desc.is_closed() && desc.value_by_number(raw).is_none() {
        return Err(Error::out_of_range(raw, target.to_string()));
    }
    Ok(raw)
}

fn message_value(
    value: &Value,
    expected: &MessageDescriptor,
    arena: &Arena,
) -> Result<crate::storage::Addr> {
    match value {
        Value::Message(msg) if msg.descriptor() == expected => {
            arena.fuse(msg.arena());
            Ok(msg.addr())
        }
        other => Err(Error::type_mismatch(
            format!("message {}", expected.full_name()),
            other.kind_name(),
        )),
    }
}
