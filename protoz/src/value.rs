//! Host-side dynamic values.
//!
//! `Value` is the closed set of shapes a dynamically typed host can hand to
//! the bridge, or receive back from it. Scalars are plain data; messages and
//! collection views are live handles into arena storage.

use crate::collection::{MapField, RepeatedField};
use crate::message::Message;

/// A dynamically typed host value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integer too large for `Int`
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),

    /// Sequence literal
    List(Vec<Value>),
    /// Mapping literal, in insertion order
    Map(Vec<(Value, Value)>),

    /// Live message wrapper
    Message(Message),
    /// Live view over a map field
    MapField(MapField),
    /// Live view over a repeated field
    RepeatedField(RepeatedField),
}

/// Macro to generate accessor methods for copyable variants.
macro_rules! impl_primitive_accessors {
    ($($method:ident -> $variant:ident : $ty:ty),* $(,)?) => {
        impl Value {
            $(
                #[doc = concat!("Try to extract as ", stringify!($ty), ".")]
                pub fn $method(&self) -> Option<$ty> {
                    match self {
                        Value::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

/// Macro to generate borrowing accessor methods for the remaining variants.
macro_rules! impl_ref_accessors {
    ($($method:ident -> $variant:ident : $ty:ty),* $(,)?) => {
        impl Value {
            $(
                #[doc = concat!("Try to borrow as ", stringify!($ty), ".")]
                pub fn $method(&self) -> Option<&$ty> {
                    match self {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

impl_primitive_accessors! {
    as_bool -> Bool: bool,
    as_f64 -> Float: f64,
}

impl_ref_accessors! {
    as_str -> String: str,
    as_bytes -> Bytes: [u8],
    as_list -> List: [Value],
    as_message -> Message: Message,
    as_map_field -> MapField: MapField,
    as_repeated_field -> RepeatedField: RepeatedField,
}

impl Value {
    /// Build a list literal.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a mapping literal, keeping the given order.
    pub fn map<K: Into<Value>, V: Into<Value>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer value as i64, whichever integer variant holds it.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Integer value as u64, whichever integer variant holds it.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Short description of the value's shape, for error messages.
    pub fn kind_name(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Uint(_) => "uint".into(),
            Value::Float(_) => "float".into(),
            Value::String(_) => "string".into(),
            Value::Bytes(_) => "bytes".into(),
            Value::List(_) => "list".into(),
            Value::Map(_) => "map".into(),
            Value::Message(m) => format!("message {}", m.descriptor().full_name()),
            Value::MapField(_) => "map field".into(),
            Value::RepeatedField(_) => "repeated field".into(),
        }
    }
}

impl PartialEq for Value {
    /// Scalars compare by value (`Int` and `Uint` across variants); handles
    /// compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Int(a), Value::Uint(b)) | (Value::Uint(b), Value::Int(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => Message::same_instance(a, b),
            (Value::MapField(a), Value::MapField(b)) => a.same_storage(b),
            (Value::RepeatedField(a), Value::RepeatedField(b)) => a.same_storage(b),
            _ => false,
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_int! {
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(small) => Value::Int(small),
            Err(_) => Value::Uint(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Message> for Value {
    fn from(v: Message) -> Self {
        Value::Message(v)
    }
}

impl From<&Message> for Value {
    fn from(v: &Message) -> Self {
        Value::Message(v.clone())
    }
}

impl From<MapField> for Value {
    fn from(v: MapField) -> Self {
        Value::MapField(v)
    }
}

impl From<RepeatedField> for Value {
    fn from(v: RepeatedField) -> Self {
        Value::RepeatedField(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
