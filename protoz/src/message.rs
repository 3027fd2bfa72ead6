//! Message façade: the host-visible wrapper around one typed message.
//!
//! A [`Message`] identifies one (arena, address) pair. Wrappers are interned
//! per fuse group through the identity cache, so reading the same
//! submessage twice yields the same wrapper (`Message::same_instance`).
//!
//! # Example
//!
//! ```rust
//! use protoz::descriptor::{DescriptorPool, DescriptorType, FieldSpec, MessageBuilder};
//! use protoz::{Message, Value};
//!
//! let pool = DescriptorPool::builder()
//!     .message(
//!         MessageBuilder::new("demo.Node")
//!             .field(FieldSpec::scalar("id", 1, DescriptorType::Int32))
//!             .field(FieldSpec::message("next", 2, "demo.Node")),
//!     )
//!     .build()
//!     .unwrap();
//! let desc = pool.message("demo.Node").unwrap();
//!
//! let head = Message::new(&desc);
//! head.set("id", &Value::Int(1)).unwrap();
//! let next = head.mutable_message("next").unwrap();
//! next.set("id", &Value::Int(2)).unwrap();
//!
//! let again = head.get("next").unwrap();
//! assert!(Message::same_instance(again.as_message().unwrap(), &next));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::arena::Arena;
use crate::codec::{json, wire};
use crate::collection::{MapField, RepeatedField};
use crate::config::CodecConfig;
use crate::convert::{to_dynamic, to_map_key, to_typed};
use crate::descriptor::{Cardinality, FieldDescriptor, FieldType, MessageDescriptor};
use crate::error::{Error, Result};
use crate::storage::{Addr, ArrayData, Block, MapData, MessageData, Slot, TypedValue};
use crate::value::Value;

pub(crate) struct MessageInner {
    arena: Arena,
    desc: MessageDescriptor,
    addr: Addr,
}

impl Drop for MessageInner {
    fn drop(&mut self) {
        self.arena.group().identity.unregister(self.addr);
    }
}

/// Host-visible handle to one arena-owned message.
///
/// Cloning the handle does not copy the message; all clones are the same
/// instance.
#[derive(Clone)]
pub struct Message {
    inner: Rc<MessageInner>,
}

impl Message {
    /// Allocate an empty message in a fresh arena.
    pub fn new(desc: &MessageDescriptor) -> Self {
        let arena = Arena::new();
        let addr = arena.alloc_message(MessageData::new(desc));
        trace!("[MSG] New {} at {}", desc.full_name(), addr);
        Self::wrap(&arena, desc, addr)
    }

    /// Allocate a message and apply a `Value::Map` initializer of
    /// field name to value.
    ///
    /// Message-typed fields take an existing `Message`; nested literals are
    /// rejected with `TypeMismatch`.
    pub fn with_init(desc: &MessageDescriptor, init: &Value) -> Result<Self> {
        let msg = Self::new(desc);
        msg.apply(init)?;
        Ok(msg)
    }

    /// Apply an initializer field by field.
    ///
    /// Stops at the first failing field; fields applied before it keep
    /// their new values.
    pub fn apply(&self, init: &Value) -> Result<()> {
        match init {
            Value::Null => Ok(()),
            Value::Map(entries) => {
                for (name, value) in entries {
                    let Some(name) = name.as_str() else {
                        return Err(Error::type_mismatch("field name", name.kind_name()));
                    };
                    self.set(name, value)?;
                }
                Ok(())
            }
            other => Err(Error::type_mismatch("map initializer", other.kind_name())),
        }
    }

    /// Parse wire bytes into a new message.
    pub fn decode(desc: &MessageDescriptor, bytes: &[u8]) -> Result<Self> {
        Self::decode_with(desc, bytes, &CodecConfig::current())
    }

    pub fn decode_with(desc: &MessageDescriptor, bytes: &[u8], cfg: &CodecConfig) -> Result<Self> {
        let msg = Self::new(desc);
        msg.merge_from_bytes_with(bytes, cfg)?;
        Ok(msg)
    }

    /// Parse JSON text into a new message.
    pub fn from_json(desc: &MessageDescriptor, text: &str, ignore_unknown_fields: bool) -> Result<Self> {
        let msg = Self::new(desc);
        msg.merge_from_json(text, ignore_unknown_fields)?;
        Ok(msg)
    }

    /// Wrapper for `addr`: the cached one if alive, else a new registered one.
    pub(crate) fn wrap(arena: &Arena, desc: &MessageDescriptor, addr: Addr) -> Self {
        let group = arena.group();
        if let Some(inner) = group.identity.lookup(addr) {
            return Self { inner };
        }
        let inner = Rc::new(MessageInner {
            arena: arena.clone(),
            desc: desc.clone(),
            addr,
        });
        group.identity.register(addr, &inner);
        Self { inner }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.inner.desc
    }

    pub fn arena(&self) -> &Arena {
        &self.inner.arena
    }

    pub fn addr(&self) -> Addr {
        self.inner.addr
    }

    /// Reference identity: both handles wrap the same native message.
    pub fn same_instance(a: &Message, b: &Message) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    fn field(&self, name: &str) -> Result<FieldDescriptor> {
        self.inner
            .desc
            .field_by_name(name)
            .ok_or_else(|| Error::FieldNotFound {
                message: self.inner.desc.full_name().to_string(),
                field: name.to_string(),
            })
    }

    fn field_by_number(&self, number: u32) -> Result<FieldDescriptor> {
        self.inner
            .desc
            .field_by_number(number)
            .ok_or_else(|| Error::FieldNotFound {
                message: self.inner.desc.full_name().to_string(),
                field: number.to_string(),
            })
    }

    fn slot(&self, field: &FieldDescriptor) -> Slot {
        self.arena()
            .with_message(self.addr(), |m| m.slots[field.index()].clone())
    }

    /// Read a field.
    ///
    /// Map and repeated fields return a live view (materializing empty
    /// storage when needed). An unset message field reads as `Null`; an
    /// unset scalar reads as its default.
    pub fn get(&self, name: &str) -> Result<Value> {
        let field = self.field(name)?;
        Ok(self.get_field(&field))
    }

    pub(crate) fn get_field(&self, field: &FieldDescriptor) -> Value {
        let arena = self.arena();
        match field.cardinality() {
            Cardinality::Map => {
                let addr = ensure_map(arena, self.addr(), field);
                let (key_type, value_type) = field.map_types();
                Value::MapField(MapField::bind(arena.clone(), addr, key_type, value_type))
            }
            Cardinality::Repeated => {
                let addr = ensure_array(arena, self.addr(), field);
                Value::RepeatedField(RepeatedField::bind(arena.clone(), addr, field.field_type()))
            }
            Cardinality::Singular => {
                let field_type = field.field_type();
                match self.slot(field) {
                    Slot::Value(value) => to_dynamic(&value, &field_type, arena),
                    _ => TypedValue::default_for(&field_type)
                        .map_or(Value::Null, |d| to_dynamic(&d, &field_type, arena)),
                }
            }
        }
    }

    /// Write a field.
    ///
    /// Map and repeated fields take either a literal (`Value::Map`,
    /// `Value::List`), converted in full before anything is stored, or a view
    /// of identical type, whose storage is then shared. `Null` clears fields
    /// with presence.
    pub fn set(&self, name: &str, value: &Value) -> Result<()> {
        let field = self.field(name)?;
        self.set_field(&field, value)
    }

    pub(crate) fn set_field(&self, field: &FieldDescriptor, value: &Value) -> Result<()> {
        let arena = self.arena();
        match field.cardinality() {
            Cardinality::Map => {
                let (key_type, value_type) = field.map_types();
                let addr = match value {
                    Value::MapField(view)
                        if view.key_type() == &key_type && view.value_type() == &value_type =>
                    {
                        arena.fuse(view.arena());
                        view.addr()
                    }
                    Value::Map(entries) => {
                        let mut data = MapData::default();
                        for (k, v) in entries {
                            let key = to_map_key(k, &key_type, arena)?;
                            data.entries.insert(key, to_typed(v, &value_type, arena)?);
                        }
                        arena.alloc(Block::Map(data))
                    }
                    Value::Null => return Err(Error::null_not_allowed(field.name())),
                    other => {
                        return Err(Error::type_mismatch(
                            format!("map<{key_type}, {value_type}>"),
                            other.kind_name(),
                        ));
                    }
                };
                self.store_slot(field, Slot::Map(addr));
            }
            Cardinality::Repeated => {
                let element = field.field_type();
                let addr = match value {
                    Value::RepeatedField(view) if view.element_type() == &element => {
                        arena.fuse(view.arena());
                        view.addr()
                    }
                    Value::List(items) => {
                        let items = items
                            .iter()
                            .map(|item| to_typed(item, &element, arena))
                            .collect::<Result<Vec<_>>>()?;
                        arena.alloc(Block::Array(ArrayData { items }))
                    }
                    Value::Null => return Err(Error::null_not_allowed(field.name())),
                    other => {
                        return Err(Error::type_mismatch(
                            format!("repeated {element}"),
                            other.kind_name(),
                        ));
                    }
                };
                self.store_slot(field, Slot::Array(addr));
            }
            Cardinality::Singular => {
                if value.is_null() && field.has_presence() {
                    self.store_slot(field, Slot::Unset);
                    return Ok(());
                }
                let typed = to_typed(value, &field.field_type(), arena)?;
                store_value(arena, self.addr(), field, typed);
            }
        }
        Ok(())
    }

    fn store_slot(&self, field: &FieldDescriptor, slot: Slot) {
        self.arena().with_message_mut(self.addr(), |m| {
            m.slots[field.index()] = slot;
        });
    }

    /// Whether a field is set. Implicit-presence scalars count as set when
    /// they differ from their default; collections when non-empty.
    pub fn has(&self, name: &str) -> Result<bool> {
        let field = self.field(name)?;
        let arena = self.arena();
        Ok(match self.slot(&field) {
            Slot::Unset => false,
            Slot::Value(value) => field.has_presence() || !value.is_zero(),
            Slot::Array(addr) => arena.with_array(addr, |a| !a.items.is_empty()),
            Slot::Map(addr) => arena.with_map(addr, |m| !m.entries.is_empty()),
        })
    }

    pub fn clear_field(&self, name: &str) -> Result<()> {
        let field = self.field(name)?;
        self.store_slot(&field, Slot::Unset);
        Ok(())
    }

    /// Submessage of a singular message field, created in place if unset.
    pub fn mutable_message(&self, name: &str) -> Result<Message> {
        let field = self.field(name)?;
        self.mutable_message_field(&field)
    }

    fn mutable_message_field(&self, field: &FieldDescriptor) -> Result<Message> {
        let sub = match field.field_type() {
            FieldType::Message(sub) if field.cardinality() == Cardinality::Singular => sub,
            other => {
                return Err(Error::type_mismatch(
                    "singular message field",
                    format!("{:?} {other}", field.cardinality()),
                ));
            }
        };
        let arena = self.arena();
        let addr = match self.slot(field) {
            Slot::Value(TypedValue::Message(addr)) => addr,
            _ => {
                let addr = arena.alloc_message(MessageData::new(&sub));
                store_value(arena, self.addr(), field, TypedValue::Message(addr));
                addr
            }
        };
        Ok(Message::wrap(arena, &sub, addr))
    }

    /// Reset every field. Identity and arena are unchanged.
    pub fn clear(&self) {
        self.arena()
            .with_message_mut(self.addr(), MessageData::clear);
    }

    /// Name of the member currently set in oneof `name`, if any.
    pub fn which_oneof(&self, name: &str) -> Result<Option<String>> {
        let desc = self.descriptor();
        let oneof = desc.oneof_by_name(name).ok_or_else(|| Error::OneofNotFound {
            message: desc.full_name().to_string(),
            oneof: name.to_string(),
        })?;
        let members = oneof.member_indices();
        let set = self.arena().with_message(self.addr(), |m| {
            members
                .iter()
                .copied()
                .find(|&i| !matches!(m.slots[i], Slot::Unset))
        });
        Ok(set.map(|index| desc.field(index).name().to_string()))
    }

    /// `get` by field number, for generated accessors.
    pub fn read_oneof(&self, number: u32) -> Result<Value> {
        let field = self.field_by_number(number)?;
        Ok(self.get_field(&field))
    }

    /// `set` by field number, for generated accessors.
    pub fn write_oneof(&self, number: u32, value: &Value) -> Result<()> {
        let field = self.field_by_number(number)?;
        self.set_field(&field, value)
    }

    fn wrapper_value_field(&self, field: &FieldDescriptor) -> Result<FieldDescriptor> {
        field
            .message_type()
            .filter(|_| field.cardinality() == Cardinality::Singular)
            .and_then(|sub| sub.field_by_number(1))
            .filter(|value| value.name() == "value" && value.cardinality() == Cardinality::Singular)
            .ok_or_else(|| {
                Error::type_mismatch("wrapper message field", field.field_type().to_string())
            })
    }

    /// Inner `value` of a wrapper-typed field (e.g. `Int32Value`), or
    /// `Null` when the wrapper is unset.
    pub fn read_wrapper_value(&self, name: &str) -> Result<Value> {
        let field = self.field(name)?;
        let value_field = self.wrapper_value_field(&field)?;
        match self.get_field(&field) {
            Value::Message(wrapper) => Ok(wrapper.get_field(&value_field)),
            _ => Ok(Value::Null),
        }
    }

    /// Set the inner `value` of a wrapper-typed field; `Null` clears it.
    pub fn write_wrapper_value(&self, name: &str, value: &Value) -> Result<()> {
        let field = self.field(name)?;
        let value_field = self.wrapper_value_field(&field)?;
        if value.is_null() {
            self.store_slot(&field, Slot::Unset);
            return Ok(());
        }
        let typed = to_typed(value, &value_field.field_type(), self.arena())?;
        let wrapper = self.mutable_message_field(&field)?;
        store_value(wrapper.arena(), wrapper.addr(), &value_field, typed);
        Ok(())
    }

    /// Merge `other` into `self` through its wire encoding.
    ///
    /// Scalars are last-write-wins, repeated fields append, submessages
    /// merge recursively, map entries replace by key.
    pub fn merge_from(&self, other: &Message) -> Result<()> {
        self.merge_from_with(other, &CodecConfig::current())
    }

    pub fn merge_from_with(&self, other: &Message, cfg: &CodecConfig) -> Result<()> {
        if self.descriptor() != other.descriptor() {
            return Err(Error::type_mismatch(
                format!("message {}", self.descriptor().full_name()),
                format!("message {}", other.descriptor().full_name()),
            ));
        }
        let bytes = other.to_bytes_with(cfg)?;
        debug!(
            "[MSG] Merging {} bytes into {}",
            bytes.len(),
            self.descriptor().full_name()
        );
        self.merge_from_bytes_with(&bytes, cfg)
    }

    pub fn merge_from_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.merge_from_bytes_with(bytes, &CodecConfig::current())
    }

    pub fn merge_from_bytes_with(&self, bytes: &[u8], cfg: &CodecConfig) -> Result<()> {
        wire::merge(self.arena(), self.addr(), bytes, cfg)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with(&CodecConfig::current())
    }

    pub fn to_bytes_with(&self, cfg: &CodecConfig) -> Result<Vec<u8>> {
        wire::encode(self.arena(), self.addr(), cfg)
    }

    pub fn merge_from_json(&self, text: &str, ignore_unknown_fields: bool) -> Result<()> {
        self.merge_from_json_with(text, ignore_unknown_fields, &CodecConfig::current())
    }

    pub fn merge_from_json_with(
        &self,
        text: &str,
        ignore_unknown_fields: bool,
        cfg: &CodecConfig,
    ) -> Result<()> {
        json::merge(self.arena(), self.addr(), text, ignore_unknown_fields, cfg)
    }

    pub fn to_json(&self, preserve_proto_field_names: bool) -> Result<String> {
        self.to_json_with(preserve_proto_field_names, &CodecConfig::current())
    }

    pub fn to_json_with(&self, preserve_proto_field_names: bool, cfg: &CodecConfig) -> Result<String> {
        json::encode(self.arena(), self.addr(), preserve_proto_field_names, cfg)
    }

    /// Raw bytes of unrecognized wire fields on this message.
    pub fn unknown_fields(&self) -> Vec<u8> {
        self.arena()
            .with_message(self.addr(), |m| m.unknown.clone())
    }

    /// Drop unknown fields here and in every reachable submessage.
    pub fn discard_unknown_fields(&self) {
        let mut visited = HashSet::new();
        discard_unknown(self.arena(), self.addr(), &mut visited);
    }

    /// Field-wise equality, compared through the deterministic encoding.
    pub fn fields_eq(&self, other: &Message) -> bool {
        if self.descriptor() != other.descriptor() {
            return false;
        }
        let cfg = CodecConfig::default();
        match (self.to_bytes_with(&cfg), other.to_bytes_with(&cfg)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message({} @ {})",
            self.descriptor().full_name(),
            self.addr()
        )
    }
}

// Slot helpers shared with the codecs.

/// Store a singular value, unsetting the other members of its oneof.
pub(crate) fn store_value(arena: &Arena, msg: Addr, field: &FieldDescriptor, value: TypedValue) {
    let oneof = field.containing_oneof();
    arena.with_message_mut(msg, |m| {
        if let Some(oneof) = &oneof {
            m.clear_oneof_siblings(oneof.member_indices(), field.index());
        }
        m.slots[field.index()] = Slot::Value(value);
    });
}

/// Array storage of a repeated field, allocated on first use.
pub(crate) fn ensure_array(arena: &Arena, msg: Addr, field: &FieldDescriptor) -> Addr {
    let index = field.index();
    if let Slot::Array(addr) = arena.with_message(msg, |m| m.slots[index].clone()) {
        return addr;
    }
    let addr = arena.alloc(Block::Array(ArrayData::default()));
    arena.with_message_mut(msg, |m| m.slots[index] = Slot::Array(addr));
    addr
}

/// Map storage of a map field, allocated on first use.
pub(crate) fn ensure_map(arena: &Arena, msg: Addr, field: &FieldDescriptor) -> Addr {
    let index = field.index();
    if let Slot::Map(addr) = arena.with_message(msg, |m| m.slots[index].clone()) {
        return addr;
    }
    let addr = arena.alloc(Block::Map(MapData::default()));
    arena.with_message_mut(msg, |m| m.slots[index] = Slot::Map(addr));
    addr
}

/// Existing submessage of a singular message field.
pub(crate) fn existing_message(arena: &Arena, msg: Addr, field: &FieldDescriptor) -> Option<Addr> {
    arena.with_message(msg, |m| match &m.slots[field.index()] {
        Slot::Value(TypedValue::Message(addr)) => Some(*addr),
        _ => None,
    })
}

fn discard_unknown(arena: &Arena, addr: Addr, visited: &mut HashSet<Addr>) {
    if !visited.insert(addr) {
        return;
    }
    let slots = arena.with_message_mut(addr, |m| {
        m.unknown.clear();
        m.slots.clone()
    });
    for slot in slots {
        let children: Vec<Addr> = match slot {
            Slot::Unset => continue,
            Slot::Value(value) => value.as_message().into_iter().collect(),
            Slot::Array(array) => arena.with_array(array, |a| {
                a.items.iter().filter_map(TypedValue::as_message).collect()
            }),
            Slot::Map(map) => arena.with_map(map, |m| {
                m.entries.values().filter_map(TypedValue::as_message).collect()
            }),
        };
        for child in children {
            discard_unknown(arena, child, visited);
        }
    }
}
