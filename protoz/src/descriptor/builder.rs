//! Programmatic construction of descriptor pools.

use std::collections::{HashMap, HashSet};

use protoz_wire::MAX_FIELD_NUMBER;

use super::{
    Cardinality, DescriptorError, DescriptorPool, DescriptorType, EnumData, FieldData,
    MessageData, OneofData, PoolInner, TypeIndex,
};

/// Field numbers reserved by the protobuf implementation.
const RESERVED_NUMBERS: std::ops::RangeInclusive<u32> = 19000..=19999;

#[derive(Clone, Debug)]
struct MapSpec {
    key: DescriptorType,
    value: DescriptorType,
    value_type_name: Option<String>,
}

/// Declaration of a single field.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    name: String,
    number: u32,
    descriptor_type: DescriptorType,
    type_name: Option<String>,
    cardinality: Cardinality,
    map: Option<MapSpec>,
    optional: bool,
    packed: Option<bool>,
    json_name: Option<String>,
    oneof: Option<usize>,
}

impl FieldSpec {
    fn new(name: &str, number: u32, descriptor_type: DescriptorType) -> Self {
        Self {
            name: name.to_string(),
            number,
            descriptor_type,
            type_name: None,
            cardinality: Cardinality::Singular,
            map: None,
            optional: false,
            packed: None,
            json_name: None,
            oneof: None,
        }
    }

    /// Scalar field (numeric, bool, string or bytes).
    pub fn scalar(name: &str, number: u32, descriptor_type: DescriptorType) -> Self {
        Self::new(name, number, descriptor_type)
    }

    /// Field holding a submessage of the named type.
    pub fn message(name: &str, number: u32, type_name: &str) -> Self {
        let mut spec = Self::new(name, number, DescriptorType::Message);
        spec.type_name = Some(type_name.to_string());
        spec
    }

    /// Field holding a value of the named enum type.
    pub fn enumeration(name: &str, number: u32, type_name: &str) -> Self {
        let mut spec = Self::new(name, number, DescriptorType::Enum);
        spec.type_name = Some(type_name.to_string());
        spec
    }

    /// Map field with scalar values.
    pub fn map(name: &str, number: u32, key: DescriptorType, value: DescriptorType) -> Self {
        let mut spec = Self::new(name, number, DescriptorType::Message);
        spec.cardinality = Cardinality::Map;
        spec.map = Some(MapSpec {
            key,
            value,
            value_type_name: None,
        });
        spec
    }

    /// Map field whose values are messages or enums of the named type.
    pub fn map_to(
        name: &str,
        number: u32,
        key: DescriptorType,
        value: DescriptorType,
        value_type_name: &str,
    ) -> Self {
        let mut spec = Self::map(name, number, key, value);
        if let Some(map) = spec.map.as_mut() {
            map.value_type_name = Some(value_type_name.to_string());
        }
        spec
    }

    pub fn repeated(mut self) -> Self {
        if self.cardinality != Cardinality::Map {
            self.cardinality = Cardinality::Repeated;
        }
        self
    }

    /// Explicit presence (`optional` in proto3).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn packed(mut self, packed: bool) -> Self {
        self.packed = Some(packed);
        self
    }

    pub fn json_name(mut self, json_name: &str) -> Self {
        self.json_name = Some(json_name.to_string());
        self
    }
}

/// Builder for one message type.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    full_name: String,
    fields: Vec<FieldSpec>,
    oneofs: Vec<String>,
}

impl MessageBuilder {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.trim_start_matches('.').to_string(),
            fields: Vec::new(),
            oneofs: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Declare a oneof whose members are the given fields.
    pub fn oneof(mut self, name: &str, members: impl IntoIterator<Item = FieldSpec>) -> Self {
        let index = self.oneofs.len();
        self.oneofs.push(name.to_string());
        for mut spec in members {
            spec.oneof = Some(index);
            self.fields.push(spec);
        }
        self
    }
}

/// Builder for one enum type.
#[derive(Clone, Debug)]
pub struct EnumBuilder {
    full_name: String,
    values: Vec<(String, i32)>,
    closed: bool,
}

impl EnumBuilder {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.trim_start_matches('.').to_string(),
            values: Vec::new(),
            closed: false,
        }
    }

    pub fn value(mut self, name: &str, number: i32) -> Self {
        self.values.push((name.to_string(), number));
        self
    }

    /// Closed enums (proto2 semantics) reject undeclared numbers.
    pub fn closed(mut self, closed: bool) -> Self {
        self.closed = closed;
        self
    }
}

/// Collects message and enum definitions into an immutable pool.
#[derive(Clone, Debug, Default)]
pub struct DescriptorPoolBuilder {
    messages: Vec<MessageBuilder>,
    enums: Vec<EnumBuilder>,
}

struct Pending {
    full_name: String,
    fields: Vec<FieldSpec>,
    oneofs: Vec<String>,
    map_entry: bool,
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: MessageBuilder) -> Self {
        self.messages.push(message);
        self
    }

    pub fn enumeration(mut self, enumeration: EnumBuilder) -> Self {
        self.enums.push(enumeration);
        self
    }

    /// Validate all definitions and resolve type references.
    pub fn build(self) -> Result<DescriptorPool, DescriptorError> {
        let pending = expand_map_entries(self.messages)?;

        let mut names = HashMap::new();
        for (index, msg) in pending.iter().enumerate() {
            if names
                .insert(msg.full_name.clone(), TypeIndex::Message(index))
                .is_some()
            {
                return Err(DescriptorError::DuplicateType(msg.full_name.clone()));
            }
        }
        for (index, en) in self.enums.iter().enumerate() {
            if names
                .insert(en.full_name.clone(), TypeIndex::Enum(index))
                .is_some()
            {
                return Err(DescriptorError::DuplicateType(en.full_name.clone()));
            }
        }

        let messages = pending
            .into_iter()
            .map(|msg| resolve_message(msg, &names))
            .collect::<Result<Vec<_>, _>>()?;

        let enums = self
            .enums
            .into_iter()
            .map(|en| EnumData {
                full_name: en.full_name,
                values: en.values,
                closed: en.closed,
            })
            .collect();

        tracing::debug!(
            "[DESC] Built descriptor pool with {} types",
            names.len()
        );

        Ok(DescriptorPool::from_inner(PoolInner {
            messages,
            enums,
            names,
        }))
    }
}

/// Replace map declarations with references to synthesized entry messages.
fn expand_map_entries(messages: Vec<MessageBuilder>) -> Result<Vec<Pending>, DescriptorError> {
    let mut pending = Vec::with_capacity(messages.len());
    let mut entries = Vec::new();

    for msg in messages {
        let mut fields = Vec::with_capacity(msg.fields.len());
        for mut spec in msg.fields {
            if let Some(map) = spec.map.take() {
                if !map.key.is_valid_map_key() {
                    return Err(DescriptorError::InvalidMapKey {
                        message: msg.full_name.clone(),
                        field: spec.name,
                        key: map.key,
                    });
                }
                let entry_name = format!("{}.{}Entry", msg.full_name, upper_camel(&spec.name));
                let mut value = FieldSpec::new("value", 2, map.value);
                value.type_name = map.value_type_name;
                entries.push(Pending {
                    full_name: entry_name.clone(),
                    fields: vec![FieldSpec::new("key", 1, map.key), value],
                    oneofs: Vec::new(),
                    map_entry: true,
                });
                spec.type_name = Some(entry_name);
            }
            fields.push(spec);
        }
        pending.push(Pending {
            full_name: msg.full_name,
            fields,
            oneofs: msg.oneofs,
            map_entry: false,
        });
    }

    pending.extend(entries);
    Ok(pending)
}

fn resolve_message(
    msg: Pending,
    names: &HashMap<String, TypeIndex>,
) -> Result<MessageData, DescriptorError> {
    let mut specs = msg.fields;
    specs.sort_by_key(|f| f.number);

    let mut seen_names = HashSet::new();
    let mut seen_numbers = HashSet::new();
    let mut fields = Vec::with_capacity(specs.len());
    let mut oneofs: Vec<OneofData> = msg
        .oneofs
        .into_iter()
        .map(|name| OneofData {
            name,
            fields: Vec::new(),
        })
        .collect();

    for (index, spec) in specs.into_iter().enumerate() {
        if !seen_names.insert(spec.name.clone()) {
            return Err(DescriptorError::DuplicateFieldName {
                message: msg.full_name,
                field: spec.name,
            });
        }
        if !seen_numbers.insert(spec.number) {
            return Err(DescriptorError::DuplicateFieldNumber {
                message: msg.full_name,
                number: spec.number,
            });
        }
        if spec.number == 0 || spec.number > MAX_FIELD_NUMBER || RESERVED_NUMBERS.contains(&spec.number)
        {
            return Err(DescriptorError::InvalidFieldNumber {
                message: msg.full_name,
                field: spec.name,
                number: spec.number,
            });
        }

        let type_index = if spec.descriptor_type.needs_type_name() {
            let Some(type_name) = spec.type_name.as_deref() else {
                return Err(DescriptorError::MissingTypeName {
                    message: msg.full_name,
                    field: spec.name,
                });
            };
            let Some(found) = lookup_scoped(names, &msg.full_name, type_name) else {
                return Err(DescriptorError::UnresolvedType {
                    message: msg.full_name,
                    field: spec.name,
                    type_name: type_name.to_string(),
                });
            };
            match (spec.descriptor_type, found) {
                (DescriptorType::Message, TypeIndex::Message(i))
                | (DescriptorType::Enum, TypeIndex::Enum(i)) => Some(i),
                (ty, _) => {
                    return Err(DescriptorError::WrongTypeKind {
                        message: msg.full_name,
                        field: spec.name,
                        type_name: type_name.to_string(),
                        expected: if ty == DescriptorType::Message {
                            "a message"
                        } else {
                            "an enum"
                        },
                    });
                }
            }
        } else {
            None
        };

        if let Some(oneof) = spec.oneof {
            if spec.cardinality != Cardinality::Singular {
                return Err(DescriptorError::InvalidOneofMember {
                    message: msg.full_name,
                    field: spec.name,
                });
            }
            oneofs[oneof].fields.push(index);
        }

        let packed = spec.cardinality == Cardinality::Repeated
            && spec.descriptor_type.is_packable()
            && spec.packed.unwrap_or(true);

        fields.push(FieldData {
            json_name: spec.json_name.unwrap_or_else(|| lower_camel(&spec.name)),
            name: spec.name,
            number: spec.number,
            descriptor_type: spec.descriptor_type,
            cardinality: spec.cardinality,
            type_index,
            oneof: spec.oneof,
            explicit_presence: spec.optional,
            packed,
        });
    }

    let by_name = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.clone(), i))
        .collect();
    let by_json_name = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.json_name.clone(), i))
        .collect();
    let by_number = fields.iter().enumerate().map(|(i, f)| (f.number, i)).collect();

    Ok(MessageData {
        full_name: msg.full_name,
        fields,
        by_name,
        by_json_name,
        by_number,
        oneofs,
        map_entry: msg.map_entry,
    })
}

/// Resolve a type name the way protoc does: absolute when it starts with a
/// dot, otherwise innermost scope first.
fn lookup_scoped(
    names: &HashMap<String, TypeIndex>,
    scope: &str,
    type_name: &str,
) -> Option<TypeIndex> {
    if let Some(absolute) = type_name.strip_prefix('.') {
        return names.get(absolute).copied();
    }
    let mut scope = scope;
    loop {
        let candidate = if scope.is_empty() {
            type_name.to_string()
        } else {
            format!("{scope}.{type_name}")
        };
        if let Some(found) = names.get(&candidate) {
            return Some(*found);
        }
        if scope.is_empty() {
            return None;
        }
        scope = scope.rsplit_once('.').map(|(outer, _)| outer).unwrap_or("");
    }
}

/// `foo_bar_baz` -> `fooBarBaz`
pub(crate) fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `foo_bar` -> `FooBar`
fn upper_camel(name: &str) -> String {
    let lower = lower_camel(name);
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldType;

    fn point() -> MessageBuilder {
        MessageBuilder::new("demo.Point")
            .field(FieldSpec::scalar("x", 1, DescriptorType::Int32))
            .field(FieldSpec::scalar("y", 2, DescriptorType::Sint32))
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(lower_camel("foo_bar_baz"), "fooBarBaz");
        assert_eq!(lower_camel("plain"), "plain");
        assert_eq!(upper_camel("int_map"), "IntMap");
    }

    #[test]
    fn test_fields_sorted_by_number() {
        let pool = DescriptorPool::builder()
            .message(
                MessageBuilder::new("demo.M")
                    .field(FieldSpec::scalar("c", 3, DescriptorType::Bool))
                    .field(FieldSpec::scalar("a", 1, DescriptorType::Bool)),
            )
            .build()
            .unwrap();
        let m = pool.message("demo.M").unwrap();
        let numbers: Vec<u32> = m.fields().map(|f| f.number()).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(m.field_by_name("c").unwrap().number(), 3);
    }

    #[test]
    fn test_relative_type_resolution() {
        let pool = DescriptorPool::builder()
            .message(point())
            .message(MessageBuilder::new("demo.Line").field(FieldSpec::message("a", 1, "Point")))
            .build()
            .unwrap();
        let line = pool.message("demo.Line").unwrap();
        let field = line.field_by_name("a").unwrap();
        assert_eq!(field.message_type().unwrap(), pool.message("demo.Point").unwrap());
        assert!(field.has_presence());
    }

    #[test]
    fn test_map_entry_synthesis() {
        let pool = DescriptorPool::builder()
            .message(MessageBuilder::new("demo.M").field(FieldSpec::map(
                "int_map",
                4,
                DescriptorType::String,
                DescriptorType::Int64,
            )))
            .build()
            .unwrap();
        let m = pool.message("demo.M").unwrap();
        let field = m.field_by_name("int_map").unwrap();
        assert!(field.is_map());
        let entry = field.map_entry().unwrap();
        assert_eq!(entry.full_name(), "demo.M.IntMapEntry");
        assert!(entry.is_map_entry());
        assert_eq!(field.map_key().unwrap().field_type(), FieldType::String);
        assert_eq!(field.map_value().unwrap().field_type(), FieldType::Int64);
        assert_eq!(field.json_name(), "intMap");
    }

    #[test]
    fn test_invalid_map_key() {
        let err = DescriptorPool::builder()
            .message(MessageBuilder::new("demo.M").field(FieldSpec::map(
                "m",
                1,
                DescriptorType::Double,
                DescriptorType::Int32,
            )))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidMapKey { .. }));
    }

    #[test]
    fn test_duplicate_checks() {
        let err = DescriptorPool::builder()
            .message(point())
            .message(point())
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptorError::DuplicateType("demo.Point".into()));

        let err = DescriptorPool::builder()
            .message(point().field(FieldSpec::scalar("z", 2, DescriptorType::Bool)))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateFieldNumber { number: 2, .. }));

        let err = DescriptorPool::builder()
            .message(point().field(FieldSpec::scalar("x", 9, DescriptorType::Bool)))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateFieldName { .. }));
    }

    #[test]
    fn test_invalid_numbers() {
        for number in [0, 19000, MAX_FIELD_NUMBER + 1] {
            let err = DescriptorPool::builder()
                .message(
                    MessageBuilder::new("demo.M")
                        .field(FieldSpec::scalar("f", number, DescriptorType::Bool)),
                )
                .build()
                .unwrap_err();
            assert!(matches!(err, DescriptorError::InvalidFieldNumber { .. }));
        }
    }

    #[test]
    fn test_type_reference_errors() {
        let err = DescriptorPool::builder()
            .message(MessageBuilder::new("demo.M").field(FieldSpec::message("f", 1, "Nope")))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::UnresolvedType { .. }));

        let err = DescriptorPool::builder()
            .message(point())
            .message(
                MessageBuilder::new("demo.M").field(FieldSpec::enumeration("f", 1, "demo.Point")),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::WrongTypeKind { .. }));

        let err = DescriptorPool::builder()
            .message(
                MessageBuilder::new("demo.M")
                    .field(FieldSpec::scalar("f", 1, DescriptorType::Message)),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::MissingTypeName { .. }));
    }

    #[test]
    fn test_oneof_members() {
        let pool = DescriptorPool::builder()
            .message(MessageBuilder::new("demo.M").oneof(
                "choice",
                [
                    FieldSpec::scalar("a", 1, DescriptorType::Int32),
                    FieldSpec::scalar("b", 2, DescriptorType::String),
                ],
            ))
            .build()
            .unwrap();
        let m = pool.message("demo.M").unwrap();
        let oneof = m.oneof_by_name("choice").unwrap();
        let members: Vec<String> = oneof.fields().map(|f| f.name().to_string()).collect();
        assert_eq!(members, vec!["a", "b"]);
        assert!(m.field_by_name("a").unwrap().has_presence());

        let err = DescriptorPool::builder()
            .message(MessageBuilder::new("demo.M").oneof(
                "choice",
                [FieldSpec::scalar("a", 1, DescriptorType::Int32).repeated()],
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidOneofMember { .. }));
    }

    #[test]
    fn test_packed_defaults() {
        let pool = DescriptorPool::builder()
            .message(
                MessageBuilder::new("demo.M")
                    .field(FieldSpec::scalar("a", 1, DescriptorType::Int32).repeated())
                    .field(FieldSpec::scalar("b", 2, DescriptorType::Int32).repeated().packed(false))
                    .field(FieldSpec::scalar("c", 3, DescriptorType::String).repeated()),
            )
            .build()
            .unwrap();
        let m = pool.message("demo.M").unwrap();
        assert!(m.field_by_number(1).unwrap().is_packed());
        assert!(!m.field_by_number(2).unwrap().is_packed());
        assert!(!m.field_by_number(3).unwrap().is_packed());
    }
}
