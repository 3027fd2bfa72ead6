//! Schema-driven protobuf wire encoding over arena storage.

use protoz_wire::{WireReader, WireType, WireWriter};
use tracing::{trace, warn};

use crate::arena::{Arena, message_ref};
use crate::config::CodecConfig;
use crate::descriptor::{
    Cardinality, DescriptorType, FieldDescriptor, FieldType, MessageDescriptor,
};
use crate::error::{Error, Result};
use crate::message::{ensure_array, ensure_map, existing_message, store_value};
use crate::storage::{Addr, MapKey, MessageData, Slot, TypedValue};

/// Encode the message at `addr`.
pub(crate) fn encode(arena: &Arena, addr: Addr, cfg: &CodecConfig) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    Encoder { arena, cfg }.message(addr, 0, &mut out)?;
    trace!("[WIRE] Encoded {} bytes", out.len());
    Ok(out)
}

/// Merge wire bytes into the message at `addr`.
pub(crate) fn merge(arena: &Arena, addr: Addr, bytes: &[u8], cfg: &CodecConfig) -> Result<()> {
    trace!("[WIRE] Decoding {} bytes", bytes.len());
    Decoder { arena, cfg }.message(addr, bytes, 0).inspect_err(|e| {
        tracing::debug!("[WIRE] Decode failed: {}", e);
    })
}

struct Encoder<'a> {
    arena: &'a Arena,
    cfg: &'a CodecConfig,
}

impl Encoder<'_> {
    fn message(&self, addr: Addr, depth: u32, out: &mut Vec<u8>) -> Result<()> {
        if depth > self.cfg.recursion_limit {
            return Err(Error::SerializationError(format!(
                "message nesting exceeds recursion limit of {}",
                self.cfg.recursion_limit
            )));
        }
        let block = self.arena.block(addr);
        let guard = block.borrow();
        let data = message_ref(&guard, addr);

        for field in data.desc.fields() {
            match &data.slots[field.index()] {
                Slot::Unset => {}
                Slot::Value(value) => {
                    if field.has_presence() || !value.is_zero() {
                        self.value(field.descriptor_type(), field.number(), value, depth, out)?;
                    }
                }
                Slot::Array(array) => self.repeated(&field, *array, depth, out)?,
                Slot::Map(map) => self.map(&field, *map, depth, out)?,
            }
        }

        if self.cfg.preserve_unknown_fields {
            WireWriter::new(out).write_raw(&data.unknown);
        }
        Ok(())
    }

    /// One keyed value. Submessages are length-prefixed.
    fn value(
        &self,
        ty: DescriptorType,
        number: u32,
        value: &TypedValue,
        depth: u32,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if ty == DescriptorType::Message {
            let TypedValue::Message(child) = value else {
                return Err(mismatch(ty, value));
            };
            let mut nested = Vec::new();
            self.message(*child, depth + 1, &mut nested)?;
            let mut writer = WireWriter::new(out);
            writer.write_key(number, WireType::LengthDelimited);
            writer.write_bytes(&nested);
            return Ok(());
        }
        let mut writer = WireWriter::new(out);
        writer.write_key(number, ty.wire_type());
        write_scalar(&mut writer, ty, value)
    }

    fn repeated(
        &self,
        field: &FieldDescriptor,
        addr: Addr,
        depth: u32,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let ty = field.descriptor_type();
        self.arena.with_array(addr, |array| {
            if array.items.is_empty() {
                return Ok(());
            }
            if field.is_packed() {
                let mut run = Vec::new();
                let mut packed = WireWriter::new(&mut run);
                for item in &array.items {
                    write_scalar(&mut packed, ty, item)?;
                }
                let mut writer = WireWriter::new(out);
                writer.write_key(field.number(), WireType::LengthDelimited);
                writer.write_bytes(&run);
            } else {
                for item in &array.items {
                    self.value(ty, field.number(), item, depth, out)?;
                }
            }
            Ok(())
        })
    }

    fn map(&self, field: &FieldDescriptor, addr: Addr, depth: u32, out: &mut Vec<u8>) -> Result<()> {
        let (key_field, value_field) = entry_fields(field);
        let key_type = key_field.field_type();
        self.arena.with_map(addr, |map| {
            for (key, value) in &map.entries {
                let mut entry = Vec::new();
                self.value(
                    key_field.descriptor_type(),
                    1,
                    &key.to_typed(&key_type),
                    depth + 1,
                    &mut entry,
                )?;
                self.value(value_field.descriptor_type(), 2, value, depth + 1, &mut entry)?;
                let mut writer = WireWriter::new(out);
                writer.write_key(field.number(), WireType::LengthDelimited);
                writer.write_bytes(&entry);
            }
            Ok(())
        })
    }
}

fn write_scalar(writer: &mut WireWriter<'_>, ty: DescriptorType, value: &TypedValue) -> Result<()> {
    match (ty, value) {
        (DescriptorType::Int32, TypedValue::I32(v)) => writer.write_int32(*v),
        (DescriptorType::Sint32, TypedValue::I32(v)) => writer.write_sint32(*v),
        (DescriptorType::Sfixed32, TypedValue::I32(v)) => writer.write_sfixed32(*v),
        (DescriptorType::Int64, TypedValue::I64(v)) => writer.write_int64(*v),
        (DescriptorType::Sint64, TypedValue::I64(v)) => writer.write_sint64(*v),
        (DescriptorType::Sfixed64, TypedValue::I64(v)) => writer.write_sfixed64(*v),
        (DescriptorType::Uint32, TypedValue::U32(v)) => writer.write_uint32(*v),
        (DescriptorType::Fixed32, TypedValue::U32(v)) => writer.write_fixed32(*v),
        (DescriptorType::Uint64, TypedValue::U64(v)) => writer.write_uint64(*v),
        (DescriptorType::Fixed64, TypedValue::U64(v)) => writer.write_fixed64(*v),
        (DescriptorType::Bool, TypedValue::Bool(v)) => writer.write_bool(*v),
        (DescriptorType::Float, TypedValue::F32(v)) => writer.write_float(*v),
        (DescriptorType::Double, TypedValue::F64(v)) => writer.write_double(*v),
        (DescriptorType::Enum, TypedValue::Enum(v)) => writer.write_int32(*v),
        (DescriptorType::String, TypedValue::String(v)) => writer.write_bytes(v.as_bytes()),
        (DescriptorType::Bytes, TypedValue::Bytes(v)) => writer.write_bytes(v),
        (ty, value) => return Err(mismatch(ty, value)),
    }
    Ok(())
}

fn mismatch(ty: DescriptorType, value: &TypedValue) -> Error {
    Error::SerializationError(format!("cannot encode {value:?} as {ty}"))
}

fn entry_fields(field: &FieldDescriptor) -> (FieldDescriptor, FieldDescriptor) {
    match field.map_entry() {
        Some(entry) => (entry.field(0), entry.field(1)),
        None => panic!("field {} is not a map", field.name()),
    }
}

struct Decoder<'a> {
    arena: &'a Arena,
    cfg: &'a CodecConfig,
}

impl Decoder<'_> {
    fn check_depth(&self, depth: u32) -> Result<()> {
        if depth > self.cfg.recursion_limit {
            return Err(Error::ParseError(format!(
                "message nesting exceeds recursion limit of {}",
                self.cfg.recursion_limit
            )));
        }
        Ok(())
    }

    fn message(&self, addr: Addr, bytes: &[u8], depth: u32) -> Result<()> {
        self.check_depth(depth)?;
        let desc = self.arena.with_message(addr, |m| m.desc.clone());
        let mut reader = WireReader::new(bytes);

        while !reader.is_empty() {
            let start = reader.position();
            let (number, wire_type) = reader.read_key()?;
            let handled = match desc.field_by_number(number) {
                Some(field) => self.field(addr, &field, wire_type, &mut reader, depth)?,
                None => false,
            };
            if !handled {
                reader.skip_value(number, wire_type)?;
                let raw = reader.slice(start, reader.position());
                self.keep_unknown(addr, raw);
            }
        }
        Ok(())
    }

    fn keep_unknown(&self, addr: Addr, raw: &[u8]) {
        if self.cfg.preserve_unknown_fields {
            self.arena
                .with_message_mut(addr, |m| WireWriter::new(&mut m.unknown).write_raw(raw));
        }
    }

    /// Decode one field occurrence. Returns false, consuming nothing, when
    /// the wire type does not fit the field; the caller then keeps it as
    /// an unknown field.
    fn field(
        &self,
        addr: Addr,
        field: &FieldDescriptor,
        wire_type: WireType,
        reader: &mut WireReader<'_>,
        depth: u32,
    ) -> Result<bool> {
        let ty = field.descriptor_type();
        match field.cardinality() {
            Cardinality::Map => {
                if wire_type != WireType::LengthDelimited {
                    return Ok(false);
                }
                let entry = reader.read_bytes()?;
                self.map_entry(addr, field, entry, depth)?;
            }
            Cardinality::Repeated => {
                if wire_type == WireType::LengthDelimited && ty.is_packable() {
                    let run = reader.read_bytes()?;
                    let mut packed = WireReader::new(run);
                    let array = ensure_array(self.arena, addr, field);
                    while !packed.is_empty() {
                        let value = read_scalar(&mut packed, ty)?;
                        if self.accept_enum(addr, field, &value) {
                            self.arena
                                .with_array_mut(array, |a| a.items.push(value));
                        }
                    }
                } else if wire_type == ty.wire_type() {
                    let value = self.read_value(field, reader, None, depth)?;
                    if self.accept_enum(addr, field, &value) {
                        let array = ensure_array(self.arena, addr, field);
                        self.arena
                            .with_array_mut(array, |a| a.items.push(value));
                    }
                } else {
                    return Ok(false);
                }
            }
            Cardinality::Singular => {
                if wire_type != ty.wire_type() {
                    return Ok(false);
                }
                let existing = existing_message(self.arena, addr, field);
                let value = self.read_value(field, reader, existing, depth)?;
                if self.accept_enum(addr, field, &value) {
                    store_value(self.arena, addr, field, value);
                }
            }
        }
        Ok(true)
    }

    /// Read a value of `field`'s type. Submessages merge into `existing`
    /// when given, else into a fresh allocation.
    fn read_value(
        &self,
        field: &FieldDescriptor,
        reader: &mut WireReader<'_>,
        existing: Option<Addr>,
        depth: u32,
    ) -> Result<TypedValue> {
        match field.field_type() {
            FieldType::Message(sub) => {
                let bytes = reader.read_bytes()?;
                let child = existing.unwrap_or_else(|| self.alloc(&sub));
                self.message(child, bytes, depth + 1)?;
                Ok(TypedValue::Message(child))
            }
            _ => read_scalar(reader, field.descriptor_type()),
        }
    }

    fn alloc(&self, desc: &MessageDescriptor) -> Addr {
        self.arena.alloc_message(MessageData::new(desc))
    }

    /// Closed enums route undeclared numbers to unknown fields.
    fn accept_enum(&self, addr: Addr, field: &FieldDescriptor, value: &TypedValue) -> bool {
        let TypedValue::Enum(number) = value else {
            return true;
        };
        let Some(desc) = field.enum_type() else {
            return true;
        };
        if !desc.is_closed() || desc.value_by_number(*number).is_some() {
            return true;
        }
        warn!(
            "[WIRE] Value {} is not declared by closed enum {}; keeping it as unknown",
            number,
            desc.full_name()
        );
        let mut raw = Vec::new();
        let mut writer = WireWriter::new(&mut raw);
        writer.write_key(field.number(), WireType::Varint);
        writer.write_int32(*number);
        self.keep_unknown(addr, &raw);
        false
    }

    fn map_entry(
        &self,
        addr: Addr,
        field: &FieldDescriptor,
        bytes: &[u8],
        depth: u32,
    ) -> Result<()> {
        self.check_depth(depth + 1)?;
        let (key_field, value_field) = entry_fields(field);
        let key_type = key_field.field_type();
        let value_type = value_field.field_type();

        let mut key = None;
        let mut value = None;
        let mut reader = WireReader::new(bytes);
        while !reader.is_empty() {
            let (number, wire_type) = reader.read_key()?;
            match number {
                1 if wire_type == key_field.descriptor_type().wire_type() => {
                    key = Some(read_scalar(&mut reader, key_field.descriptor_type())?);
                }
                2 if wire_type == value_field.descriptor_type().wire_type() => {
                    let existing = value.as_ref().and_then(TypedValue::as_message);
                    value = Some(self.read_value(&value_field, &mut reader, existing, depth + 1)?);
                }
                _ => reader.skip_value(number, wire_type)?,
            }
        }

        let key = key
            .or_else(|| TypedValue::default_for(&key_type))
            .and_then(MapKey::from_typed)
            .ok_or_else(|| Error::ParseError(format!("invalid key in map {}", field.name())))?;
        let value = match value {
            Some(value) => value,
            None => match &value_type {
                FieldType::Message(sub) => TypedValue::Message(self.alloc(sub)),
                other => TypedValue::default_for(other).ok_or_else(|| {
                    Error::ParseError(format!("missing value in map {}", field.name()))
                })?,
            },
        };

        if let (TypedValue::Enum(number), Some(desc)) = (&value, value_field.enum_type()) {
            if desc.is_closed() && desc.value_by_number(*number).is_none() {
                warn!(
                    "[WIRE] Map {} entry with undeclared enum value {}; keeping it as unknown",
                    field.name(),
                    number
                );
                let mut raw = Vec::new();
                let mut writer = WireWriter::new(&mut raw);
                writer.write_key(field.number(), WireType::LengthDelimited);
                writer.write_bytes(bytes);
                self.keep_unknown(addr, &raw);
                return Ok(());
            }
        }

        let map = ensure_map(self.arena, addr, field);
        self.arena.with_map_mut(map, |m| {
            m.entries.insert(key, value);
        });
        Ok(())
    }
}

fn read_scalar(reader: &mut WireReader<'_>, ty: DescriptorType) -> Result<TypedValue> {
    Ok(match ty {
        DescriptorType::Int32 => TypedValue::I32(reader.read_int32()?),
        DescriptorType::Sint32 => TypedValue::I32(reader.read_sint32()?),
        DescriptorType::Sfixed32 => TypedValue::I32(reader.read_sfixed32()?),
        DescriptorType::Int64 => TypedValue::I64(reader.read_int64()?),
        DescriptorType::Sint64 => TypedValue::I64(reader.read_sint64()?),
        DescriptorType::Sfixed64 => TypedValue::I64(reader.read_sfixed64()?),
        DescriptorType::Uint32 => TypedValue::U32(reader.read_uint32()?),
        DescriptorType::Fixed32 => TypedValue::U32(reader.read_fixed32()?),
        DescriptorType::Uint64 => TypedValue::U64(reader.read_uint64()?),
        DescriptorType::Fixed64 => TypedValue::U64(reader.read_fixed64()?),
        DescriptorType::Bool => TypedValue::Bool(reader.read_bool()?),
        DescriptorType::Float => TypedValue::F32(reader.read_float()?),
        DescriptorType::Double => TypedValue::F64(reader.read_double()?),
        DescriptorType::Enum => TypedValue::Enum(reader.read_int32()?),
        DescriptorType::String => {
            let bytes = reader.read_bytes()?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| Error::ParseError("invalid UTF-8 in string field".into()))?;
            TypedValue::String(text.to_string())
        }
        DescriptorType::Bytes => TypedValue::Bytes(reader.read_bytes()?.to_vec()),
        DescriptorType::Message => {
            return Err(Error::ParseError("submessage read as scalar".into()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorPool, EnumBuilder, FieldSpec, MessageBuilder};
    use crate::message::Message;
    use crate::value::Value;

    fn pool() -> DescriptorPool {
        DescriptorPool::builder()
            .message(
                MessageBuilder::new("wire.Scalars")
                    .field(FieldSpec::scalar("a", 1, DescriptorType::Int32))
                    .field(FieldSpec::scalar("b", 2, DescriptorType::Sint64))
                    .field(FieldSpec::scalar("c", 3, DescriptorType::String))
                    .field(FieldSpec::scalar("d", 4, DescriptorType::Fixed32).optional())
                    .field(FieldSpec::scalar("xs", 5, DescriptorType::Int32).repeated())
                    .field(FieldSpec::enumeration("e", 6, "wire.Closed").repeated()),
            )
            .enumeration(EnumBuilder::new("wire.Closed").value("A", 0).value("B", 1).closed(true))
            .build()
            .unwrap()
    }

    fn cfg() -> CodecConfig {
        CodecConfig::default()
    }

    #[test]
    fn test_known_bytes() {
        let desc = pool().message("wire.Scalars").unwrap();
        let msg = Message::new(&desc);
        msg.set("a", &Value::Int(150)).unwrap();
        assert_eq!(msg.to_bytes_with(&cfg()).unwrap(), vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn test_implicit_presence_skips_defaults() {
        let desc = pool().message("wire.Scalars").unwrap();
        let msg = Message::new(&desc);
        msg.set("a", &Value::Int(0)).unwrap();
        msg.set("c", &Value::from("")).unwrap();
        assert!(msg.to_bytes_with(&cfg()).unwrap().is_empty());

        // Explicit presence keeps a zero.
        msg.set("d", &Value::Int(0)).unwrap();
        assert_eq!(msg.to_bytes_with(&cfg()).unwrap(), vec![0x25, 0, 0, 0, 0]);
    }

    #[test]
    fn test_packed_encoding_and_unpacked_decoding() {
        let desc = pool().message("wire.Scalars").unwrap();
        let msg = Message::new(&desc);
        msg.set("xs", &Value::list([1, 2, 3])).unwrap();
        assert_eq!(
            msg.to_bytes_with(&cfg()).unwrap(),
            vec![0x2A, 3, 1, 2, 3]
        );

        let unpacked = [0x28, 7, 0x28, 8];
        let decoded = Message::decode_with(&desc, &unpacked, &cfg()).unwrap();
        let xs = decoded.get("xs").unwrap();
        assert_eq!(
            xs.as_repeated_field().unwrap().to_vec(),
            vec![Value::Int(7), Value::Int(8)]
        );
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let desc = pool().message("wire.Scalars").unwrap();
        // Field 99, varint 5.
        let bytes = [0x98, 0x06, 0x05];
        let msg = Message::decode_with(&desc, &bytes, &cfg()).unwrap();
        assert_eq!(msg.unknown_fields(), bytes.to_vec());
        assert_eq!(msg.to_bytes_with(&cfg()).unwrap(), bytes.to_vec());

        let dropping = cfg().with_preserve_unknown_fields(false);
        assert!(msg.to_bytes_with(&dropping).unwrap().is_empty());

        msg.discard_unknown_fields();
        assert!(msg.unknown_fields().is_empty());
    }

    #[test]
    fn test_wire_type_mismatch_is_unknown() {
        let desc = pool().message("wire.Scalars").unwrap();
        // Field 1 as fixed32 instead of varint.
        let bytes = [0x0D, 1, 0, 0, 0];
        let msg = Message::decode_with(&desc, &bytes, &cfg()).unwrap();
        assert_eq!(msg.get("a").unwrap(), Value::Int(0));
        assert_eq!(msg.unknown_fields(), bytes.to_vec());
    }

    #[test]
    fn test_closed_enum_values_routed_to_unknown() {
        let desc = pool().message("wire.Scalars").unwrap();
        // Field 6 unpacked: 1, then 9.
        let bytes = [0x30, 1, 0x30, 9];
        let msg = Message::decode_with(&desc, &bytes, &cfg()).unwrap();
        let e = msg.get("e").unwrap();
        assert_eq!(e.as_repeated_field().unwrap().to_vec(), vec![Value::Int(1)]);
        assert_eq!(msg.unknown_fields(), vec![0x30, 9]);
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let desc = pool().message("wire.Scalars").unwrap();
        let bytes = [0x1A, 2, 0xFF, 0xFE];
        assert!(matches!(
            Message::decode_with(&desc, &bytes, &cfg()),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn test_truncated_input_is_parse_error() {
        let desc = pool().message("wire.Scalars").unwrap();
        assert!(matches!(
            Message::decode_with(&desc, &[0x1A, 10, b'a'], &cfg()),
            Err(Error::ParseError(_))
        ));
        // Group start on an unknown field.
        assert!(matches!(
            Message::decode_with(&desc, &[0x63], &cfg()),
            Err(Error::ParseError(_))
        ));
    }
}
