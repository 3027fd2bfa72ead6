//! Proto3 JSON mapping over arena storage, built on `serde_json`.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use tracing::trace;

use crate::arena::{Arena, message_ref};
use crate::config::CodecConfig;
use crate::descriptor::{Cardinality, FieldDescriptor, FieldType, MessageDescriptor};
use crate::error::{Error, Result};
use crate::message::{ensure_array, ensure_map, existing_message, store_value};
use crate::storage::{Addr, MapKey, MessageData, Slot, TypedValue};

/// Render the message at `addr` as JSON text.
pub(crate) fn encode(
    arena: &Arena,
    addr: Addr,
    preserve_proto_field_names: bool,
    cfg: &CodecConfig,
) -> Result<String> {
    let encoder = Encoder {
        arena,
        cfg,
        preserve_proto_field_names,
    };
    let value = encoder.message(addr, 0)?;
    let text = if cfg.json_pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|e| Error::SerializationError(e.to_string()))?;
    trace!("[JSON] Encoded {} bytes", text.len());
    Ok(text)
}

/// Merge JSON text into the message at `addr`.
pub(crate) fn merge(
    arena: &Arena,
    addr: Addr,
    text: &str,
    ignore_unknown_fields: bool,
    cfg: &CodecConfig,
) -> Result<()> {
    let value: JsonValue = serde_json::from_str(text)?;
    let decoder = Decoder {
        arena,
        cfg,
        ignore_unknown_fields,
    };
    decoder.message(addr, &value, 0).inspect_err(|e| {
        tracing::debug!("[JSON] Decode failed: {}", e);
    })
}

struct Encoder<'a> {
    arena: &'a Arena,
    cfg: &'a CodecConfig,
    preserve_proto_field_names: bool,
}

impl Encoder<'_> {
    fn message(&self, addr: Addr, depth: u32) -> Result<JsonValue> {
        if depth > self.cfg.recursion_limit {
            return Err(Error::SerializationError(format!(
                "message nesting exceeds recursion limit of {}",
                self.cfg.recursion_limit
            )));
        }
        let block = self.arena.block(addr);
        let guard = block.borrow();
        let data = message_ref(&guard, addr);

        let mut object = JsonMap::new();
        for field in data.desc.fields() {
            let json = match &data.slots[field.index()] {
                Slot::Unset => continue,
                Slot::Value(value) => {
                    if !field.has_presence() && value.is_zero() {
                        continue;
                    }
                    self.value(&field.field_type(), value, depth)?
                }
                Slot::Array(array) => {
                    let element = field.field_type();
                    let items = self.arena.with_array(*array, |a| {
                        a.items
                            .iter()
                            .map(|item| self.value(&element, item, depth))
                            .collect::<Result<Vec<_>>>()
                    })?;
                    if items.is_empty() {
                        continue;
                    }
                    JsonValue::Array(items)
                }
                Slot::Map(map) => {
                    let (_, value_type) = field.map_types();
                    let entries = self.arena.with_map(*map, |m| {
                        m.entries
                            .iter()
                            .map(|(k, v)| -> Result<(String, JsonValue)> {
                                Ok((key_string(k), self.value(&value_type, v, depth)?))
                            })
                            .collect::<Result<JsonMap<_, _>>>()
                    })?;
                    if entries.is_empty() {
                        continue;
                    }
                    JsonValue::Object(entries)
                }
            };
            let name = if self.preserve_proto_field_names {
                field.name()
            } else {
                field.json_name()
            };
            object.insert(name.to_string(), json);
        }
        Ok(JsonValue::Object(object))
    }

    fn value(&self, field_type: &FieldType, value: &TypedValue, depth: u32) -> Result<JsonValue> {
        Ok(match value {
            TypedValue::Bool(v) => JsonValue::Bool(*v),
            TypedValue::I32(v) => JsonValue::from(*v),
            TypedValue::U32(v) => JsonValue::from(*v),
            TypedValue::I64(v) => JsonValue::String(v.to_string()),
            TypedValue::U64(v) => JsonValue::String(v.to_string()),
            // Shortest decimal form of the f32, not of its f64 widening.
            TypedValue::F32(v) => float_json(v.to_string().parse().unwrap_or(f64::from(*v))),
            TypedValue::F64(v) => float_json(*v),
            TypedValue::Enum(number) => match field_type
                .enum_descriptor()
                .and_then(|desc| desc.value_by_number(*number))
            {
                Some(name) => JsonValue::String(name.to_string()),
                None => JsonValue::from(*number),
            },
            TypedValue::String(v) => JsonValue::String(v.clone()),
            TypedValue::Bytes(v) => JsonValue::String(STANDARD.encode(v)),
            TypedValue::Message(child) => self.message(*child, depth + 1)?,
        })
    }
}

fn float_json(v: f64) -> JsonValue {
    if v.is_nan() {
        JsonValue::String("NaN".into())
    } else if v == f64::INFINITY {
        JsonValue::String("Infinity".into())
    } else if v == f64::NEG_INFINITY {
        JsonValue::String("-Infinity".into())
    } else {
        Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number)
    }
}

fn key_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::Int(v) => v.to_string(),
        MapKey::Uint(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
        MapKey::Bytes(v) => STANDARD.encode(v),
    }
}

struct Decoder<'a> {
    arena: &'a Arena,
    cfg: &'a CodecConfig,
    ignore_unknown_fields: bool,
}

impl Decoder<'_> {
    fn message(&self, addr: Addr, json: &JsonValue, depth: u32) -> Result<()> {
        if depth > self.cfg.recursion_limit {
            return Err(Error::ParseError(format!(
                "message nesting exceeds recursion limit of {}",
                self.cfg.recursion_limit
            )));
        }
        let desc = self.arena.with_message(addr, |m| m.desc.clone());
        let JsonValue::Object(object) = json else {
            return Err(Error::ParseError(format!(
                "expected object for {}, found {}",
                desc.full_name(),
                json_kind(json)
            )));
        };

        for (key, value) in object {
            let Some(field) = desc
                .field_by_json_name(key)
                .or_else(|| desc.field_by_name(key))
            else {
                if self.ignore_unknown_fields {
                    trace!("[JSON] Ignoring unknown field '{}'", key);
                    continue;
                }
                return Err(Error::ParseError(format!(
                    "unknown field '{}' in {}",
                    key,
                    desc.full_name()
                )));
            };
            if value.is_null() {
                self.arena.with_message_mut(addr, |m| {
                    m.slots[field.index()] = Slot::Unset;
                });
                continue;
            }
            self.field(addr, &field, value, depth)?;
        }
        Ok(())
    }

    fn field(&self, addr: Addr, field: &FieldDescriptor, json: &JsonValue, depth: u32) -> Result<()> {
        match field.cardinality() {
            Cardinality::Map => {
                let JsonValue::Object(entries) = json else {
                    return Err(expected("object", field, json));
                };
                let (key_type, value_type) = field.map_types();
                let map = ensure_map(self.arena, addr, field);
                for (key, value) in entries {
                    let key = parse_key(key, &key_type)?;
                    if let Some(value) = self.value(&value_type, value, None, depth)? {
                        self.arena.with_map_mut(map, |m| {
                            m.entries.insert(key, value);
                        });
                    }
                }
            }
            Cardinality::Repeated => {
                let JsonValue::Array(items) = json else {
                    return Err(expected("array", field, json));
                };
                let element = field.field_type();
                let array = ensure_array(self.arena, addr, field);
                for item in items {
                    if item.is_null() {
                        return Err(expected("element", field, item));
                    }
                    if let Some(value) = self.value(&element, item, None, depth)? {
                        self.arena
                            .with_array_mut(array, |a| a.items.push(value));
                    }
                }
            }
            Cardinality::Singular => {
                let existing = existing_message(self.arena, addr, field);
                if let Some(value) = self.value(&field.field_type(), json, existing, depth)? {
                    store_value(self.arena, addr, field, value);
                }
            }
        }
        Ok(())
    }

    /// Parse one value. `None` means an unknown enum name that was skipped.
    fn value(
        &self,
        field_type: &FieldType,
        json: &JsonValue,
        existing: Option<Addr>,
        depth: u32,
    ) -> Result<Option<TypedValue>> {
        let target = field_type.to_string();
        Ok(Some(match field_type {
            FieldType::Int32 => TypedValue::I32(parse_int(json, &target, i32::MIN.into(), i32::MAX.into())? as i32),
            FieldType::Int64 => TypedValue::I64(parse_int(json, &target, i64::MIN.into(), i64::MAX.into())? as i64),
            FieldType::Uint32 => TypedValue::U32(parse_int(json, &target, 0, u32::MAX.into())? as u32),
            FieldType::Uint64 => TypedValue::U64(parse_int(json, &target, 0, u64::MAX.into())? as u64),
            FieldType::Float => {
                let v = parse_float(json, &target)?;
                if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                    return Err(Error::ParseError(format!("{v} is out of range for float")));
                }
                TypedValue::F32(v as f32)
            }
            FieldType::Double => TypedValue::F64(parse_float(json, &target)?),
            FieldType::Bool => match json {
                JsonValue::Bool(v) => TypedValue::Bool(*v),
                other => return Err(mismatch(&target, other)),
            },
            FieldType::String => match json {
                JsonValue::String(v) => TypedValue::String(v.clone()),
                other => return Err(mismatch(&target, other)),
            },
            FieldType::Bytes => match json {
                JsonValue::String(v) => TypedValue::Bytes(decode_base64(v)?),
                other => return Err(mismatch(&target, other)),
            },
            FieldType::Enum(desc) => match json {
                JsonValue::String(name) => match desc.value_by_name(name) {
                    Some(number) => TypedValue::Enum(number),
                    None if self.ignore_unknown_fields => return Ok(None),
                    None => {
                        return Err(Error::ParseError(format!(
                            "unknown value '{}' for enum {}",
                            name,
                            desc.full_name()
                        )));
                    }
                },
                other => {
                    let number = parse_int(other, &target, i32::MIN.into(), i32::MAX.into())? as i32;
                    if desc.is_closed() && desc.value_by_number(number).is_none() {
                        return Err(Error::ParseError(format!(
                            "{} is not a value of closed enum {}",
                            number,
                            desc.full_name()
                        )));
                    }
                    TypedValue::Enum(number)
                }
            },
            FieldType::Message(sub) => {
                let child = existing.unwrap_or_else(|| self.alloc(sub));
                self.message(child, json, depth + 1)?;
                TypedValue::Message(child)
            }
        }))
    }

    fn alloc(&self, desc: &MessageDescriptor) -> Addr {
        self.arena.alloc_message(MessageData::new(desc))
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn mismatch(target: &str, json: &JsonValue) -> Error {
    Error::ParseError(format!("expected {}, found {}", target, json_kind(json)))
}

fn expected(what: &str, field: &FieldDescriptor, json: &JsonValue) -> Error {
    Error::ParseError(format!(
        "field '{}' expects {}, found {}",
        field.name(),
        what,
        json_kind(json)
    ))
}

/// Integers arrive as numbers or as decimal strings.
fn parse_int(json: &JsonValue, target: &str, min: i128, max: i128) -> Result<i128> {
    let v = match json {
        JsonValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                i128::from(v)
            } else if let Some(v) = n.as_u64() {
                i128::from(v)
            } else {
                integral_float(n.as_f64().unwrap_or(f64::NAN), target)?
            }
        }
        JsonValue::String(s) => match s.trim().parse::<i128>() {
            Ok(v) => v,
            Err(_) => {
                let f = s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| Error::ParseError(format!("'{s}' is not a valid {target}")))?;
                integral_float(f, target)?
            }
        },
        other => return Err(mismatch(target, other)),
    };
    if v < min || v > max {
        return Err(Error::ParseError(format!("{v} is out of range for {target}")));
    }
    Ok(v)
}

fn integral_float(f: f64, target: &str) -> Result<i128> {
    if !f.is_finite() || f.fract() != 0.0 || f.abs() >= 2f64.powi(65) {
        return Err(Error::ParseError(format!("{f} is not a valid {target}")));
    }
    Ok(f as i128)
}

fn parse_float(json: &JsonValue, target: &str) -> Result<f64> {
    match json {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::ParseError(format!("{n} is not a valid {target}"))),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::ParseError(format!("'{other}' is not a valid {target}"))),
        },
        other => Err(mismatch(target, other)),
    }
}

/// Standard base64, falling back to the URL-safe alphabet; padding optional.
fn decode_base64(text: &str) -> Result<Vec<u8>> {
    [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
        .ok_or_else(|| Error::ParseError(format!("'{text}' is not valid base64")))
}

fn parse_key(text: &str, key_type: &FieldType) -> Result<MapKey> {
    let invalid = || Error::ParseError(format!("'{text}' is not a valid {key_type} map key"));
    Ok(match key_type {
        FieldType::Bool => match text {
            "true" => MapKey::Bool(true),
            "false" => MapKey::Bool(false),
            _ => return Err(invalid()),
        },
        FieldType::Int32 => {
            let v: i32 = text.parse().map_err(|_| invalid())?;
            MapKey::Int(i64::from(v))
        }
        FieldType::Int64 => MapKey::Int(text.parse().map_err(|_| invalid())?),
        FieldType::Uint32 => {
            let v: u32 = text.parse().map_err(|_| invalid())?;
            MapKey::Uint(u64::from(v))
        }
        FieldType::Uint64 => MapKey::Uint(text.parse().map_err(|_| invalid())?),
        FieldType::String => MapKey::String(text.to_string()),
        FieldType::Bytes => MapKey::Bytes(decode_base64(text)?),
        other => return Err(Error::InvalidMapKeyType(other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorPool, DescriptorType, EnumBuilder, FieldSpec, MessageBuilder};
    use crate::message::Message;
    use crate::value::Value;

    fn desc() -> MessageDescriptor {
        DescriptorPool::builder()
            .message(
                MessageBuilder::new("json.Doc")
                    .field(FieldSpec::scalar("big_id", 1, DescriptorType::Int64))
                    .field(FieldSpec::scalar("ratio", 2, DescriptorType::Float))
                    .field(FieldSpec::scalar("blob", 3, DescriptorType::Bytes))
                    .field(FieldSpec::enumeration("mode", 4, "json.Mode"))
                    .field(FieldSpec::map("counts", 5, DescriptorType::Uint32, DescriptorType::Int32))
                    .field(FieldSpec::scalar("score", 6, DescriptorType::Double)),
            )
            .enumeration(EnumBuilder::new("json.Mode").value("OFF", 0).value("ON", 1))
            .build()
            .unwrap()
            .message("json.Doc")
            .unwrap()
    }

    #[test]
    fn test_encode_mapping_rules() {
        let msg = Message::new(&desc());
        msg.set("big_id", &Value::Int(1 << 40)).unwrap();
        msg.set("ratio", &Value::Float(0.1)).unwrap();
        msg.set("blob", &Value::Bytes(vec![0xFF, 0x00])).unwrap();
        msg.set("mode", &Value::Int(1)).unwrap();
        msg.set("score", &Value::Float(f64::NEG_INFINITY)).unwrap();
        let counts = msg.get("counts").unwrap();
        counts
            .as_map_field()
            .unwrap()
            .set(&Value::Int(7), &Value::Int(-1))
            .unwrap();

        let text = msg.to_json_with(false, &CodecConfig::default()).unwrap();
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["bigId"], JsonValue::String("1099511627776".into()));
        assert_eq!(parsed["ratio"], serde_json::json!(0.1));
        assert_eq!(parsed["blob"], JsonValue::String("/wA=".into()));
        assert_eq!(parsed["mode"], JsonValue::String("ON".into()));
        assert_eq!(parsed["counts"]["7"], serde_json::json!(-1));
        assert_eq!(parsed["score"], JsonValue::String("-Infinity".into()));

        let preserved = msg.to_json_with(true, &CodecConfig::default()).unwrap();
        assert!(preserved.contains("\"big_id\""));
    }

    #[test]
    fn test_defaults_omitted() {
        let msg = Message::new(&desc());
        assert_eq!(msg.to_json_with(false, &CodecConfig::default()).unwrap(), "{}");
    }

    #[test]
    fn test_decode_accepts_both_names_and_strings() {
        let msg = Message::new(&desc());
        msg.merge_from_json_with(
            r#"{"big_id": 5, "ratio": "NaN", "mode": "ON", "counts": {"3": "4"}, "blob": "_wA"}"#,
            false,
            &CodecConfig::default(),
        )
        .unwrap();
        assert_eq!(msg.get("big_id").unwrap(), Value::Int(5));
        assert!(msg.get("ratio").unwrap().as_f64().unwrap().is_nan());
        assert_eq!(msg.get("mode").unwrap(), Value::Int(1));
        assert_eq!(msg.get("blob").unwrap(), Value::Bytes(vec![0xFF, 0x00]));
        let counts = msg.get("counts").unwrap();
        assert_eq!(
            counts.as_map_field().unwrap().get(&Value::Int(3)).unwrap(),
            Value::Int(4)
        );
    }

    #[test]
    fn test_decode_null_clears() {
        let msg = Message::new(&desc());
        msg.set("big_id", &Value::Int(9)).unwrap();
        msg.merge_from_json_with(r#"{"bigId": null}"#, false, &CodecConfig::default())
            .unwrap();
        assert!(!msg.has("big_id").unwrap());
    }

    #[test]
    fn test_unknown_fields_and_enum_names() {
        let cfg = CodecConfig::default();
        let msg = Message::new(&desc());
        assert!(matches!(
            msg.merge_from_json_with(r#"{"nope": 1}"#, false, &cfg),
            Err(Error::ParseError(_))
        ));
        msg.merge_from_json_with(r#"{"nope": 1, "mode": "MAYBE"}"#, true, &cfg)
            .unwrap();
        assert_eq!(msg.get("mode").unwrap(), Value::Int(0));
        assert!(matches!(
            msg.merge_from_json_with(r#"{"mode": "MAYBE"}"#, false, &cfg),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn test_decode_type_errors() {
        let cfg = CodecConfig::default();
        let msg = Message::new(&desc());
        for text in [
            r#"{"bigId": true}"#,
            r#"{"bigId": 1.5}"#,
            r#"{"ratio": 1e300}"#,
            r#"{"counts": [1]}"#,
            r#"[1, 2]"#,
            "not json",
        ] {
            assert!(
                matches!(msg.merge_from_json_with(text, false, &cfg), Err(Error::ParseError(_))),
                "{text} should fail"
            );
        }
    }

    #[test]
    fn test_pretty_output() {
        let msg = Message::new(&desc());
        msg.set("mode", &Value::Int(1)).unwrap();
        let pretty = CodecConfig::default().with_json_pretty(true);
        let text = msg.to_json_with(false, &pretty).unwrap();
        assert!(text.contains('\n'));
    }
}
