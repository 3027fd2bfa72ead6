//! Tests for the wire and JSON codecs through the façade.

use super::sample;
use crate::config::CodecConfig;
use crate::error::Error;
use crate::message::Message;
use crate::value::Value;

fn populated() -> Message {
    let desc = sample();
    let kid = Message::with_init(&desc, &Value::map([("name", "kid")])).unwrap();
    let msg = Message::with_init(
        &desc,
        &Value::map([
            ("count", Value::Int(-3)),
            ("name", Value::from("root")),
            ("data", Value::Bytes(vec![1, 2, 255])),
            ("ratio", Value::Float(0.25)),
            ("tags", Value::list(["x", "y"])),
            ("scores", Value::map([("a", 1), ("b", -2)])),
            ("color", Value::Int(2)),
            ("number", Value::Int(1 << 40)),
            ("opt", Value::Int(0)),
            ("level", Value::Int(2)),
            ("big", Value::Uint(u64::MAX)),
        ]),
    )
    .unwrap();
    msg.mutable_message("child")
        .unwrap()
        .set("count", &Value::Int(7))
        .unwrap();
    msg.get("kids")
        .unwrap()
        .as_repeated_field()
        .unwrap()
        .push(&Value::from(&kid))
        .unwrap();
    msg.get("children")
        .unwrap()
        .as_map_field()
        .unwrap()
        .set(&Value::Int(5), &Value::from(&kid))
        .unwrap();
    msg.write_wrapper_value("wrapped", &Value::Int(0)).unwrap();
    msg
}

#[test]
fn test_wire_roundtrip() {
    let cfg = CodecConfig::default();
    let msg = populated();
    let bytes = msg.to_bytes_with(&cfg).unwrap();
    let decoded = Message::decode_with(msg.descriptor(), &bytes, &cfg).unwrap();

    assert!(decoded.fields_eq(&msg));
    assert_eq!(decoded.get("number").unwrap(), Value::Int(1 << 40));
    assert_eq!(decoded.which_oneof("choice").unwrap().as_deref(), Some("number"));
    assert!(decoded.has("opt").unwrap());
    assert_eq!(decoded.read_wrapper_value("wrapped").unwrap(), Value::Int(0));
    assert_eq!(decoded.get("big").unwrap(), Value::Uint(u64::MAX));
    let child = decoded.get("child").unwrap();
    assert_eq!(child.as_message().unwrap().get("count").unwrap(), Value::Int(7));
    assert_eq!(decoded.to_bytes_with(&cfg).unwrap(), bytes);
}

#[test]
fn test_encoding_is_deterministic() {
    let cfg = CodecConfig::default();
    let desc = sample();
    let a = Message::new(&desc);
    a.set("scores", &Value::map([("z", 1), ("a", 2)])).unwrap();
    let b = Message::new(&desc);
    b.set("scores", &Value::map([("a", 2), ("z", 1)])).unwrap();
    assert_eq!(a.to_bytes_with(&cfg).unwrap(), b.to_bytes_with(&cfg).unwrap());
}

#[test]
fn test_empty_message_encodes_to_nothing() {
    let msg = Message::new(&sample());
    msg.set("count", &Value::Int(0)).unwrap();
    msg.get("tags").unwrap();
    assert!(msg.to_bytes_with(&CodecConfig::default()).unwrap().is_empty());
}

#[test]
fn test_merge_from_bytes_layers() {
    let cfg = CodecConfig::default();
    let desc = sample();
    let first = Message::with_init(&desc, &Value::map([("count", 1)])).unwrap();
    let second = Message::with_init(&desc, &Value::map([("name", "n")])).unwrap();

    let target = Message::new(&desc);
    target.merge_from_bytes_with(&first.to_bytes_with(&cfg).unwrap(), &cfg).unwrap();
    target.merge_from_bytes_with(&second.to_bytes_with(&cfg).unwrap(), &cfg).unwrap();
    assert_eq!(target.get("count").unwrap(), Value::Int(1));
    assert_eq!(target.get("name").unwrap(), Value::from("n"));
}

#[test]
fn test_invalid_utf8_on_the_wire() {
    // field 2 (name), length 2, bytes C3 28
    let bytes = [0x12, 0x02, 0xC3, 0x28];
    assert!(matches!(
        Message::decode_with(&sample(), &bytes, &CodecConfig::default()),
        Err(Error::ParseError(_))
    ));
}

#[test]
fn test_truncated_input() {
    let cfg = CodecConfig::default();
    let bytes = populated().to_bytes_with(&cfg).unwrap();
    let cut = &bytes[..bytes.len() - 1];
    assert!(matches!(
        Message::decode_with(&sample(), cut, &cfg),
        Err(Error::ParseError(_))
    ));
}

#[test]
fn test_self_cycle_hits_depth_limit() {
    let cfg = CodecConfig::default().with_recursion_limit(16);
    let msg = Message::new(&sample());
    msg.set("child", &Value::from(&msg)).unwrap();

    let again = msg.get("child").unwrap();
    assert!(Message::same_instance(again.as_message().unwrap(), &msg));
    assert!(matches!(
        msg.to_bytes_with(&cfg),
        Err(Error::SerializationError(_))
    ));
    assert!(matches!(
        msg.to_json_with(false, &cfg),
        Err(Error::SerializationError(_))
    ));
    // Cycle-safe traversal.
    msg.discard_unknown_fields();
}

#[test]
fn test_deep_input_hits_depth_limit() {
    let desc = sample();
    let deep = CodecConfig::default().with_recursion_limit(64);
    let shallow = CodecConfig::default().with_recursion_limit(4);

    let root = Message::new(&desc);
    let mut cursor = root.clone();
    for _ in 0..10 {
        cursor = cursor.mutable_message("child").unwrap();
    }
    let bytes = root.to_bytes_with(&deep).unwrap();
    assert!(Message::decode_with(&desc, &bytes, &deep).is_ok());
    assert!(matches!(
        Message::decode_with(&desc, &bytes, &shallow),
        Err(Error::ParseError(_))
    ));
    assert!(matches!(
        root.to_bytes_with(&shallow),
        Err(Error::SerializationError(_))
    ));
}

#[test]
fn test_unknown_fields_roundtrip() {
    let desc = sample();
    // field 99 varint 1, then field 1 varint 5
    let bytes = [0x98, 0x06, 0x01, 0x08, 0x05];
    let keep = CodecConfig::default();
    let msg = Message::decode_with(&desc, &bytes, &keep).unwrap();
    assert_eq!(msg.get("count").unwrap(), Value::Int(5));
    assert_eq!(msg.unknown_fields(), vec![0x98, 0x06, 0x01]);

    let out = msg.to_bytes_with(&keep).unwrap();
    assert!(out.ends_with(&[0x98, 0x06, 0x01]));

    let drop_unknown = CodecConfig::default().with_preserve_unknown_fields(false);
    assert_eq!(msg.to_bytes_with(&drop_unknown).unwrap(), vec![0x08, 0x05]);

    msg.discard_unknown_fields();
    assert!(msg.unknown_fields().is_empty());
}

#[test]
fn test_json_roundtrip() {
    let cfg = CodecConfig::default();
    let msg = populated();
    let text = msg.to_json_with(false, &cfg).unwrap();
    let decoded = Message::new(msg.descriptor());
    decoded.merge_from_json_with(&text, false, &cfg).unwrap();
    assert!(decoded.fields_eq(&msg));

    let text = msg.to_json_with(true, &cfg).unwrap();
    let decoded = Message::new(msg.descriptor());
    decoded.merge_from_json_with(&text, false, &cfg).unwrap();
    assert!(decoded.fields_eq(&msg));
}

#[test]
fn test_json_field_naming() {
    let cfg = CodecConfig::default();
    let msg = Message::new(&sample());
    msg.mutable_message("child").unwrap();
    msg.set("color", &Value::Int(1)).unwrap();
    msg.set("level", &Value::Int(2)).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&msg.to_json_with(false, &cfg).unwrap()).unwrap();
    assert_eq!(value["child"], serde_json::json!({}));
    assert_eq!(value["color"], serde_json::json!("GREEN"));
    assert_eq!(value["level"], serde_json::json!("HIGH"));
}

#[test]
fn test_json_closed_enum_rejects_unknown_number() {
    let cfg = CodecConfig::default();
    let msg = Message::new(&sample());
    assert!(matches!(
        msg.merge_from_json_with(r#"{"level": 1}"#, false, &cfg),
        Err(Error::ParseError(_))
    ));
    msg.merge_from_json_with(r#"{"color": 9}"#, false, &cfg).unwrap();
    assert_eq!(msg.get("color").unwrap(), Value::Int(9));
}
