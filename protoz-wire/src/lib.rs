//! Protobuf wire-format primitives for protoz.
//!
//! This crate provides the byte-level reader and writer used by the protoz
//! codec to walk schema-driven (dynamic) messages. Varint and field-key
//! coding delegate to `prost::encoding`, so the wire rules themselves come
//! from prost; this crate only adds the cursor bookkeeping a dynamic walker
//! needs (raw slices for unknown fields, packed runs, field skipping).
//!
//! # Example
//!
//! ```rust
//! use protoz_wire::{WireReader, WireType, WireWriter};
//!
//! let mut buf = Vec::new();
//! let mut writer = WireWriter::new(&mut buf);
//! writer.write_key(1, WireType::Varint);
//! writer.write_int32(-7);
//!
//! let mut reader = WireReader::new(&buf);
//! let (number, wire_type) = reader.read_key().unwrap();
//! assert_eq!((number, wire_type), (1, WireType::Varint));
//! assert_eq!(reader.read_int32().unwrap(), -7);
//! ```

pub mod error;
pub mod primitives;

pub use error::{Error, Result};
pub use primitives::{WireReader, WireWriter, decode_zigzag32, decode_zigzag64, encode_zigzag32, encode_zigzag64};
pub use prost::encoding::WireType;

/// Largest field number protobuf allows.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;
