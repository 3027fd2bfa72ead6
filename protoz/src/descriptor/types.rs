//! Field type vocabulary.
//!
//! `DescriptorType` is the wire-level declaration (seventeen protobuf
//! spellings); `FieldType` is what the bridge converts against, with the
//! submessage or enum descriptor attached.

use std::fmt;

use protoz_wire::WireType;

use super::{EnumDescriptor, MessageDescriptor};

/// Declared protobuf type of a field, as written in a `.proto` file.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum DescriptorType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl DescriptorType {
    /// Wire type used for a single (unpacked) value of this type.
    pub fn wire_type(self) -> WireType {
        match self {
            DescriptorType::Double | DescriptorType::Fixed64 | DescriptorType::Sfixed64 => {
                WireType::SixtyFourBit
            }
            DescriptorType::Float | DescriptorType::Fixed32 | DescriptorType::Sfixed32 => {
                WireType::ThirtyTwoBit
            }
            DescriptorType::String | DescriptorType::Bytes | DescriptorType::Message => {
                WireType::LengthDelimited
            }
            _ => WireType::Varint,
        }
    }

    /// Scalar numeric types may be packed when repeated.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            DescriptorType::String | DescriptorType::Bytes | DescriptorType::Message
        )
    }

    pub fn is_valid_map_key(self) -> bool {
        !matches!(
            self,
            DescriptorType::Double
                | DescriptorType::Float
                | DescriptorType::Enum
                | DescriptorType::Message
        )
    }

    pub(crate) fn needs_type_name(self) -> bool {
        matches!(self, DescriptorType::Message | DescriptorType::Enum)
    }
}

/// How many values a field holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Singular,
    Repeated,
    Map,
}

/// Bridge-level type of a value slot.
///
/// Several wire encodings collapse onto one variant (`sint32`, `sfixed32`
/// and `int32` are all `Int32`), since they convert identically.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Bool,
    Float,
    Double,
    String,
    Bytes,
    Enum(EnumDescriptor),
    Message(MessageDescriptor),
}

impl FieldType {
    /// Check if this type can key a map.
    pub fn is_valid_map_key(&self) -> bool {
        matches!(
            self,
            FieldType::Int32
                | FieldType::Int64
                | FieldType::Uint32
                | FieldType::Uint64
                | FieldType::Bool
                | FieldType::String
                | FieldType::Bytes
        )
    }

    pub fn message_descriptor(&self) -> Option<&MessageDescriptor> {
        match self {
            FieldType::Message(desc) => Some(desc),
            _ => None,
        }
    }

    pub fn enum_descriptor(&self) -> Option<&EnumDescriptor> {
        match self {
            FieldType::Enum(desc) => Some(desc),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int32 => write!(f, "int32"),
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Uint32 => write!(f, "uint32"),
            FieldType::Uint64 => write!(f, "uint64"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Float => write!(f, "float"),
            FieldType::Double => write!(f, "double"),
            FieldType::String => write!(f, "string"),
            FieldType::Bytes => write!(f, "bytes"),
            FieldType::Enum(desc) => write!(f, "enum {}", desc.full_name()),
            FieldType::Message(desc) => write!(f, "message {}", desc.full_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_descriptor_type_spelling() {
        assert_eq!(DescriptorType::Sfixed32.to_string(), "sfixed32");
        assert_eq!(
            DescriptorType::from_str("uint64").unwrap(),
            DescriptorType::Uint64
        );
        assert!(DescriptorType::from_str("int128").is_err());
    }

    #[test]
    fn test_every_type_parses_back() {
        for ty in DescriptorType::iter() {
            let name: &'static str = ty.into();
            assert_eq!(DescriptorType::from_str(name).unwrap(), ty);
        }
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(DescriptorType::Sint64.wire_type(), WireType::Varint);
        assert_eq!(DescriptorType::Fixed32.wire_type(), WireType::ThirtyTwoBit);
        assert_eq!(DescriptorType::Double.wire_type(), WireType::SixtyFourBit);
        assert_eq!(DescriptorType::Bytes.wire_type(), WireType::LengthDelimited);
        assert!(!DescriptorType::String.is_packable());
        assert!(DescriptorType::Enum.is_packable());
    }

    #[test]
    fn test_map_key_rules() {
        assert!(DescriptorType::Bytes.is_valid_map_key());
        assert!(DescriptorType::Sint32.is_valid_map_key());
        assert!(!DescriptorType::Float.is_valid_map_key());
        assert!(FieldType::Bool.is_valid_map_key());
        assert!(!FieldType::Double.is_valid_map_key());
    }
}
