//! Typed storage records living inside arena regions.
//!
//! A region is a list of blocks; each block is a message record, an array
//! or a map. Blocks refer to one another by [`Addr`], never by pointer, so
//! a submessage may be referenced from several parents once their arenas
//! are fused.

use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::{FieldType, MessageDescriptor};

/// Address of a block: region id plus slot inside that region.
///
/// Addresses are never reused: region ids come from a process-wide counter
/// and regions are append-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr {
    pub(crate) region: u64,
    pub(crate) slot: u32,
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.region, self.slot)
    }
}

/// A single typed field value as stored in a message slot.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Enum(i32),
    String(String),
    Bytes(Vec<u8>),
    /// Submessage stored elsewhere in the same arena group
    Message(Addr),
}

impl TypedValue {
    /// Zero value of a field type. Message fields have no default value.
    pub fn default_for(field_type: &FieldType) -> Option<TypedValue> {
        Some(match field_type {
            FieldType::Int32 => TypedValue::I32(0),
            FieldType::Int64 => TypedValue::I64(0),
            FieldType::Uint32 => TypedValue::U32(0),
            FieldType::Uint64 => TypedValue::U64(0),
            FieldType::Bool => TypedValue::Bool(false),
            FieldType::Float => TypedValue::F32(0.0),
            FieldType::Double => TypedValue::F64(0.0),
            FieldType::String => TypedValue::String(String::new()),
            FieldType::Bytes => TypedValue::Bytes(Vec::new()),
            FieldType::Enum(desc) => TypedValue::Enum(desc.default_value()),
            FieldType::Message(_) => return None,
        })
    }

    /// Whether proto3 implicit presence would omit this value.
    pub fn is_zero(&self) -> bool {
        match self {
            TypedValue::Bool(v) => !v,
            TypedValue::I32(v) | TypedValue::Enum(v) => *v == 0,
            TypedValue::I64(v) => *v == 0,
            TypedValue::U32(v) => *v == 0,
            TypedValue::U64(v) => *v == 0,
            // -0.0 is not a default: its bit pattern differs.
            TypedValue::F32(v) => v.to_bits() == 0,
            TypedValue::F64(v) => v.to_bits() == 0,
            TypedValue::String(v) => v.is_empty(),
            TypedValue::Bytes(v) => v.is_empty(),
            TypedValue::Message(_) => false,
        }
    }

    pub fn as_message(&self) -> Option<Addr> {
        match self {
            TypedValue::Message(addr) => Some(*addr),
            _ => None,
        }
    }
}

/// Ordered map key. Signed and unsigned widths collapse onto one variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
    Bytes(Vec<u8>),
}

impl MapKey {
    /// Narrow a converted key value. Only valid key types produce a key.
    pub(crate) fn from_typed(value: TypedValue) -> Option<MapKey> {
        match value {
            TypedValue::Bool(v) => Some(MapKey::Bool(v)),
            TypedValue::I32(v) => Some(MapKey::Int(i64::from(v))),
            TypedValue::I64(v) => Some(MapKey::Int(v)),
            TypedValue::U32(v) => Some(MapKey::Uint(u64::from(v))),
            TypedValue::U64(v) => Some(MapKey::Uint(v)),
            TypedValue::String(v) => Some(MapKey::String(v)),
            TypedValue::Bytes(v) => Some(MapKey::Bytes(v)),
            _ => None,
        }
    }

    /// Widen back to a typed value of the declared key type.
    pub(crate) fn to_typed(&self, key_type: &FieldType) -> TypedValue {
        match (self, key_type) {
            (MapKey::Bool(v), _) => TypedValue::Bool(*v),
            (MapKey::Int(v), FieldType::Int32) => TypedValue::I32(*v as i32),
            (MapKey::Int(v), _) => TypedValue::I64(*v),
            (MapKey::Uint(v), FieldType::Uint32) => TypedValue::U32(*v as u32),
            (MapKey::Uint(v), _) => TypedValue::U64(*v),
            (MapKey::String(v), _) => TypedValue::String(v.clone()),
            (MapKey::Bytes(v), _) => TypedValue::Bytes(v.clone()),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(v) => write!(f, "{v}"),
            MapKey::Int(v) => write!(f, "{v}"),
            MapKey::Uint(v) => write!(f, "{v}"),
            MapKey::String(v) => write!(f, "{v:?}"),
            MapKey::Bytes(v) => write!(f, "{v:?}"),
        }
    }
}

/// Storage state of one field inside a message record.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Slot {
    Unset,
    Value(TypedValue),
    Array(Addr),
    Map(Addr),
}

#[derive(Debug)]
pub(crate) struct MessageData {
    pub(crate) desc: MessageDescriptor,
    /// One slot per field, in descriptor field order.
    pub(crate) slots: Vec<Slot>,
    /// Unrecognized wire fields, re-emitted verbatim.
    pub(crate) unknown: Vec<u8>,
}

impl MessageData {
    pub(crate) fn new(desc: &MessageDescriptor) -> Self {
        Self {
            desc: desc.clone(),
            slots: vec![Slot::Unset; desc.field_count()],
            unknown: Vec::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.fill(Slot::Unset);
        self.unknown.clear();
    }

    /// Unset every field in `members` except `keep`.
    pub(crate) fn clear_oneof_siblings(&mut self, members: &[usize], keep: usize) {
        for &index in members {
            if index != keep {
                self.slots[index] = Slot::Unset;
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ArrayData {
    pub(crate) items: Vec<TypedValue>,
}

#[derive(Debug, Default)]
pub(crate) struct MapData {
    pub(crate) entries: BTreeMap<MapKey, TypedValue>,
}

#[derive(Debug)]
pub(crate) enum Block {
    Message(MessageData),
    Array(ArrayData),
    Map(MapData),
}

impl Block {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Block::Message(_) => "message",
            Block::Array(_) => "array",
            Block::Map(_) => "map",
        }
    }
}
