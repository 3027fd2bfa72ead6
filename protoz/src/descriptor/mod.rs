//! Descriptor pool: immutable schema metadata for messages, fields, oneofs
//! and enums.
//!
//! Descriptors are cheap handles (`Arc` to the pool plus an index). Equality
//! is structural: two handles are equal only when they point into the same
//! pool instance at the same type, never because their names match.
//!
//! # Example
//!
//! ```rust
//! use protoz::descriptor::{DescriptorPool, DescriptorType, FieldSpec, MessageBuilder};
//!
//! let pool = DescriptorPool::builder()
//!     .message(
//!         MessageBuilder::new("demo.Point")
//!             .field(FieldSpec::scalar("x", 1, DescriptorType::Int32))
//!             .field(FieldSpec::scalar("y", 2, DescriptorType::Int32)),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let point = pool.message("demo.Point").unwrap();
//! assert_eq!(point.field_by_number(2).unwrap().name(), "y");
//! ```

mod builder;
mod types;

pub use builder::{DescriptorPoolBuilder, EnumBuilder, FieldSpec, MessageBuilder};
pub use types::{Cardinality, DescriptorType, FieldType};

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Errors raised while building a descriptor pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("type '{0}' is defined more than once")]
    DuplicateType(String),

    #[error("field name '{field}' is used more than once in '{message}'")]
    DuplicateFieldName { message: String, field: String },

    #[error("field number {number} is used more than once in '{message}'")]
    DuplicateFieldNumber { message: String, number: u32 },

    #[error("field '{field}' in '{message}' has invalid number {number}")]
    InvalidFieldNumber {
        message: String,
        field: String,
        number: u32,
    },

    #[error("field '{field}' in '{message}' needs a type name")]
    MissingTypeName { message: String, field: String },

    #[error("field '{field}' in '{message}' refers to unknown type '{type_name}'")]
    UnresolvedType {
        message: String,
        field: String,
        type_name: String,
    },

    #[error("field '{field}' in '{message}' expects {expected} type, '{type_name}' is not one")]
    WrongTypeKind {
        message: String,
        field: String,
        type_name: String,
        expected: &'static str,
    },

    #[error("map field '{field}' in '{message}' cannot be keyed by {key}")]
    InvalidMapKey {
        message: String,
        field: String,
        key: DescriptorType,
    },

    #[error("oneof member '{field}' in '{message}' cannot be repeated or a map")]
    InvalidOneofMember { message: String, field: String },
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TypeIndex {
    Message(usize),
    Enum(usize),
}

#[derive(Debug)]
pub(crate) struct PoolInner {
    pub(crate) messages: Vec<MessageData>,
    pub(crate) enums: Vec<EnumData>,
    pub(crate) names: HashMap<String, TypeIndex>,
}

#[derive(Debug)]
pub(crate) struct MessageData {
    pub(crate) full_name: String,
    /// Sorted by field number.
    pub(crate) fields: Vec<FieldData>,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_json_name: HashMap<String, usize>,
    pub(crate) by_number: HashMap<u32, usize>,
    pub(crate) oneofs: Vec<OneofData>,
    pub(crate) map_entry: bool,
}

#[derive(Debug)]
pub(crate) struct FieldData {
    pub(crate) name: String,
    pub(crate) json_name: String,
    pub(crate) number: u32,
    pub(crate) descriptor_type: DescriptorType,
    pub(crate) cardinality: Cardinality,
    pub(crate) type_index: Option<usize>,
    pub(crate) oneof: Option<usize>,
    pub(crate) explicit_presence: bool,
    pub(crate) packed: bool,
}

#[derive(Debug)]
pub(crate) struct OneofData {
    pub(crate) name: String,
    pub(crate) fields: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct EnumData {
    pub(crate) full_name: String,
    pub(crate) values: Vec<(String, i32)>,
    pub(crate) closed: bool,
}

/// Shared, immutable collection of message and enum descriptors.
#[derive(Clone)]
pub struct DescriptorPool {
    inner: Arc<PoolInner>,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::new()
    }

    pub(crate) fn from_inner(inner: PoolInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Look up a message type by full name (a leading `.` is ignored).
    pub fn message(&self, full_name: &str) -> Option<MessageDescriptor> {
        match self.inner.names.get(full_name.trim_start_matches('.'))? {
            TypeIndex::Message(index) => Some(MessageDescriptor {
                pool: self.clone(),
                index: *index,
            }),
            TypeIndex::Enum(_) => None,
        }
    }

    /// Look up an enum type by full name (a leading `.` is ignored).
    pub fn enumeration(&self, full_name: &str) -> Option<EnumDescriptor> {
        match self.inner.names.get(full_name.trim_start_matches('.'))? {
            TypeIndex::Enum(index) => Some(EnumDescriptor {
                pool: self.clone(),
                index: *index,
            }),
            TypeIndex::Message(_) => None,
        }
    }

    /// All message types, including synthesized map entries.
    pub fn messages(&self) -> impl Iterator<Item = MessageDescriptor> + '_ {
        (0..self.inner.messages.len()).map(|index| MessageDescriptor {
            pool: self.clone(),
            index,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = EnumDescriptor> + '_ {
        (0..self.inner.enums.len()).map(|index| EnumDescriptor {
            pool: self.clone(),
            index,
        })
    }

    pub fn ptr_eq(a: &DescriptorPool, b: &DescriptorPool) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for DescriptorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorPool")
            .field("messages", &self.inner.messages.len())
            .field("enums", &self.inner.enums.len())
            .finish()
    }
}

/// Handle to a message type.
#[derive(Clone)]
pub struct MessageDescriptor {
    pool: DescriptorPool,
    index: usize,
}

impl MessageDescriptor {
    fn data(&self) -> &MessageData {
        &self.pool.inner.messages[self.index]
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Last component of the full name.
    pub fn name(&self) -> &str {
        let full = self.full_name();
        full.rsplit('.').next().unwrap_or(full)
    }

    pub fn is_map_entry(&self) -> bool {
        self.data().map_entry
    }

    pub fn field_count(&self) -> usize {
        self.data().fields.len()
    }

    /// Fields in field-number order.
    pub fn fields(&self) -> impl Iterator<Item = FieldDescriptor> + '_ {
        (0..self.field_count()).map(|index| FieldDescriptor {
            message: self.clone(),
            index,
        })
    }

    pub(crate) fn field(&self, index: usize) -> FieldDescriptor {
        FieldDescriptor {
            message: self.clone(),
            index,
        }
    }

    pub fn field_by_name(&self, name: &str) -> Option<FieldDescriptor> {
        self.data().by_name.get(name).map(|&index| self.field(index))
    }

    pub fn field_by_json_name(&self, name: &str) -> Option<FieldDescriptor> {
        self.data().by_json_name.get(name).map(|&index| self.field(index))
    }

    pub fn field_by_number(&self, number: u32) -> Option<FieldDescriptor> {
        self.data().by_number.get(&number).map(|&index| self.field(index))
    }

    pub fn oneofs(&self) -> impl Iterator<Item = OneofDescriptor> + '_ {
        (0..self.data().oneofs.len()).map(|index| OneofDescriptor {
            message: self.clone(),
            index,
        })
    }

    pub fn oneof_count(&self) -> usize {
        self.data().oneofs.len()
    }

    pub fn oneof_by_name(&self, name: &str) -> Option<OneofDescriptor> {
        self.data()
            .oneofs
            .iter()
            .position(|o| o.name == name)
            .map(|index| OneofDescriptor {
                message: self.clone(),
                index,
            })
    }
}

impl PartialEq for MessageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        DescriptorPool::ptr_eq(&self.pool, &other.pool) && self.index == other.index
    }
}

impl Eq for MessageDescriptor {}

impl Hash for MessageDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.pool.inner).hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageDescriptor({})", self.full_name())
    }
}

/// Handle to one field of a message type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    message: MessageDescriptor,
    index: usize,
}

impl FieldDescriptor {
    fn data(&self) -> &FieldData {
        &self.message.data().fields[self.index]
    }

    /// Position of the field inside its message's slot table.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub fn containing_message(&self) -> &MessageDescriptor {
        &self.message
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn json_name(&self) -> &str {
        &self.data().json_name
    }

    pub fn number(&self) -> u32 {
        self.data().number
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.data().descriptor_type
    }

    pub fn cardinality(&self) -> Cardinality {
        self.data().cardinality
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality() == Cardinality::Repeated
    }

    pub fn is_map(&self) -> bool {
        self.cardinality() == Cardinality::Map
    }

    pub fn is_packed(&self) -> bool {
        self.data().packed
    }

    /// Bridge-level type of one value of this field.
    ///
    /// For map fields this is the entry message; use `map_key`/`map_value`
    /// for the key and value types.
    pub fn field_type(&self) -> FieldType {
        let data = self.data();
        let pool = &self.message.pool;
        match data.descriptor_type {
            DescriptorType::Int32 | DescriptorType::Sint32 | DescriptorType::Sfixed32 => {
                FieldType::Int32
            }
            DescriptorType::Int64 | DescriptorType::Sint64 | DescriptorType::Sfixed64 => {
                FieldType::Int64
            }
            DescriptorType::Uint32 | DescriptorType::Fixed32 => FieldType::Uint32,
            DescriptorType::Uint64 | DescriptorType::Fixed64 => FieldType::Uint64,
            DescriptorType::Bool => FieldType::Bool,
            DescriptorType::Float => FieldType::Float,
            DescriptorType::Double => FieldType::Double,
            DescriptorType::String => FieldType::String,
            DescriptorType::Bytes => FieldType::Bytes,
            // Builder guarantees type_index for enum and message fields.
            DescriptorType::Enum => FieldType::Enum(EnumDescriptor {
                pool: pool.clone(),
                index: data.type_index.unwrap_or_default(),
            }),
            DescriptorType::Message => FieldType::Message(MessageDescriptor {
                pool: pool.clone(),
                index: data.type_index.unwrap_or_default(),
            }),
        }
    }

    pub fn message_type(&self) -> Option<MessageDescriptor> {
        match self.field_type() {
            FieldType::Message(desc) => Some(desc),
            _ => None,
        }
    }

    pub fn enum_type(&self) -> Option<EnumDescriptor> {
        match self.field_type() {
            FieldType::Enum(desc) => Some(desc),
            _ => None,
        }
    }

    /// Whether "unset" is observable, as opposed to reading back the default.
    pub fn has_presence(&self) -> bool {
        let data = self.data();
        data.cardinality == Cardinality::Singular
            && (data.explicit_presence
                || data.oneof.is_some()
                || data.descriptor_type == DescriptorType::Message)
    }

    pub fn containing_oneof(&self) -> Option<OneofDescriptor> {
        self.data().oneof.map(|index| OneofDescriptor {
            message: self.message.clone(),
            index,
        })
    }

    pub fn map_entry(&self) -> Option<MessageDescriptor> {
        if self.is_map() { self.message_type() } else { None }
    }

    pub fn map_key(&self) -> Option<FieldDescriptor> {
        self.map_entry().and_then(|entry| entry.field_by_number(1))
    }

    pub fn map_value(&self) -> Option<FieldDescriptor> {
        self.map_entry().and_then(|entry| entry.field_by_number(2))
    }

    /// Key and value types of a map field.
    pub(crate) fn map_types(&self) -> (FieldType, FieldType) {
        match self.map_entry() {
            Some(entry) => (entry.field(0).field_type(), entry.field(1).field_type()),
            None => panic!("field {} is not a map", self.name()),
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FieldDescriptor({}.{} = {})",
            self.message.full_name(),
            self.name(),
            self.number()
        )
    }
}

/// Handle to a oneof group.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OneofDescriptor {
    message: MessageDescriptor,
    index: usize,
}

impl OneofDescriptor {
    fn data(&self) -> &OneofData {
        &self.message.data().oneofs[self.index]
    }

    /// Slot indices of the member fields.
    pub(crate) fn member_indices(&self) -> &[usize] {
        &self.data().fields
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn containing_message(&self) -> &MessageDescriptor {
        &self.message
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldDescriptor> + '_ {
        self.data()
            .fields
            .iter()
            .map(|&index| self.message.field(index))
    }
}

impl fmt::Debug for OneofDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OneofDescriptor({}.{})", self.message.full_name(), self.name())
    }
}

/// Handle to an enum type.
#[derive(Clone)]
pub struct EnumDescriptor {
    pool: DescriptorPool,
    index: usize,
}

impl EnumDescriptor {
    fn data(&self) -> &EnumData {
        &self.pool.inner.enums[self.index]
    }

    pub fn full_name(&self) -> &str {
        &self.data().full_name
    }

    /// Closed enums reject numbers outside the declared set.
    pub fn is_closed(&self) -> bool {
        self.data().closed
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.data().values.iter().map(|(name, n)| (name.as_str(), *n))
    }

    pub fn value_by_name(&self, name: &str) -> Option<i32> {
        self.data()
            .values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, number)| *number)
    }

    /// First declared name for a number (aliases resolve to the first).
    pub fn value_by_number(&self, number: i32) -> Option<&str> {
        self.data()
            .values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }

    /// Default value: the first declared number.
    pub fn default_value(&self) -> i32 {
        self.data().values.first().map(|(_, n)| *n).unwrap_or(0)
    }
}

impl PartialEq for EnumDescriptor {
    fn eq(&self, other: &Self) -> bool {
        DescriptorPool::ptr_eq(&self.pool, &other.pool) && self.index == other.index
    }
}

impl Eq for EnumDescriptor {}

impl Hash for EnumDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.pool.inner).hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for EnumDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnumDescriptor({})", self.full_name())
    }
}
