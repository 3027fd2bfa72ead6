//! Tests for map and repeated fields reached through a message.

use super::sample;
use crate::collection::{MapField, RepeatedField};
use crate::descriptor::FieldType;
use crate::error::Error;
use crate::message::Message;
use crate::value::Value;

#[test]
fn test_repeated_view_is_live() {
    let msg = Message::new(&sample());
    let tags = msg.get("tags").unwrap();
    let tags = tags.as_repeated_field().unwrap();
    tags.push(&Value::from("a")).unwrap();
    tags.push(&Value::from("b")).unwrap();

    let again = msg.get("tags").unwrap();
    let again = again.as_repeated_field().unwrap();
    assert!(again.same_storage(tags));
    assert_eq!(again.len(), 2);
    assert!(msg.has("tags").unwrap());
}

#[test]
fn test_sequence_bounds() {
    let msg = Message::new(&sample());
    msg.set("tags", &Value::list(["a", "b", "c"])).unwrap();
    let tags = msg.get("tags").unwrap();
    let tags = tags.as_repeated_field().unwrap();

    assert_eq!(tags.get(2).unwrap(), Value::from("c"));
    assert!(tags.contains_index(2));
    assert!(!tags.contains_index(3));
    assert!(matches!(
        tags.get(3),
        Err(Error::IndexOutOfRange { index: 3, len: 3 })
    ));
    assert!(matches!(
        tags.set(3, &Value::from("d")),
        Err(Error::IndexOutOfRange { .. })
    ));
    tags.set(0, &Value::from("z")).unwrap();
    assert_eq!(tags.get(0).unwrap(), Value::from("z"));
    assert_eq!(tags.pop(), Some(Value::from("c")));
    assert_eq!(tags.len(), 2);
}

#[test]
fn test_repeated_literal_assignment_is_atomic() {
    let msg = Message::new(&sample());
    msg.set("tags", &Value::list(["keep"])).unwrap();
    let bad = Value::List(vec![Value::from("x"), Value::Int(1)]);
    assert!(matches!(
        msg.set("tags", &bad),
        Err(Error::TypeMismatch { .. })
    ));
    let tags = msg.get("tags").unwrap();
    assert_eq!(
        tags.as_repeated_field().unwrap().to_vec(),
        vec![Value::from("keep")]
    );
    assert!(matches!(
        msg.set("tags", &Value::Null),
        Err(Error::NullNotAllowed { .. })
    ));
    assert!(matches!(
        msg.set("tags", &Value::from("x")),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_repeated_view_assignment_shares_storage() {
    let desc = sample();
    let a = Message::new(&desc);
    let standalone = RepeatedField::new(FieldType::String);
    standalone.push(&Value::from("s")).unwrap();

    a.set("tags", &Value::RepeatedField(standalone.clone())).unwrap();
    standalone.push(&Value::from("t")).unwrap();
    assert_eq!(a.get("tags").unwrap().as_repeated_field().unwrap().len(), 2);
    assert!(a.arena().is_fused_with(standalone.arena()));

    let ints = RepeatedField::new(FieldType::Int32);
    assert!(matches!(
        a.set("tags", &Value::RepeatedField(ints)),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_repeated_messages_keep_identity() {
    let desc = sample();
    let msg = Message::new(&desc);
    let kid = Message::new(&desc);
    let kids = msg.get("kids").unwrap();
    let kids = kids.as_repeated_field().unwrap();
    kids.push(&Value::from(&kid)).unwrap();

    let first = kids.get(0).unwrap();
    assert!(Message::same_instance(first.as_message().unwrap(), &kid));
    assert!(msg.arena().is_fused_with(kid.arena()));
    assert!(matches!(
        kids.push(&Value::Null),
        Err(Error::NullNotAllowed { .. })
    ));
}

#[test]
fn test_repeated_cursor() {
    let msg = Message::new(&sample());
    msg.set("tags", &Value::list(["a", "b"])).unwrap();
    let tags = msg.get("tags").unwrap();
    let mut it = tags.as_repeated_field().unwrap().iter();

    let mut seen = Vec::new();
    while it.valid() {
        seen.push((it.key(), it.current().unwrap()));
        it.advance();
    }
    assert_eq!(seen, vec![(0, Value::from("a")), (1, Value::from("b"))]);
    assert!(it.current().is_err());
    it.rewind();
    assert_eq!(it.next(), Some(Value::from("a")));
}

#[test]
fn test_map_replace() {
    let msg = Message::new(&sample());
    msg.set("scores", &Value::map([("a", 1), ("b", 2)])).unwrap();
    msg.set("scores", &Value::map([("c", 3)])).unwrap();

    let scores = msg.get("scores").unwrap();
    let scores = scores.as_map_field().unwrap();
    assert_eq!(scores.len(), 1);
    assert!(!scores.contains(&Value::from("a")).unwrap());
    assert_eq!(scores.get(&Value::from("c")).unwrap(), Value::Int(3));
}

#[test]
fn test_map_view_operations() {
    let msg = Message::new(&sample());
    let scores = msg.get("scores").unwrap();
    let scores = scores.as_map_field().unwrap();
    scores.set(&Value::from("k"), &Value::Int(1)).unwrap();
    scores.set(&Value::from("k"), &Value::Int(2)).unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores.get(&Value::from("k")).unwrap(), Value::Int(2));

    assert!(matches!(
        scores.get(&Value::from("missing")),
        Err(Error::KeyNotFound(_))
    ));
    assert!(matches!(
        scores.set(&Value::from("k"), &Value::Int(1 << 40)),
        Err(Error::OutOfRange { .. })
    ));
    assert!(matches!(
        scores.set(&Value::Int(1), &Value::Int(1)),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(scores.remove(&Value::from("k")).unwrap());
    assert!(!msg.has("scores").unwrap());
}

#[test]
fn test_map_literal_assignment_is_atomic() {
    let msg = Message::new(&sample());
    msg.set("scores", &Value::map([("keep", 1)])).unwrap();
    let bad = Value::map([("x", Value::Int(1)), ("y", Value::from("nope"))]);
    assert!(msg.set("scores", &bad).is_err());
    let scores = msg.get("scores").unwrap();
    assert_eq!(
        scores.as_map_field().unwrap().to_vec(),
        vec![(Value::from("keep"), Value::Int(1))]
    );
}

#[test]
fn test_map_view_assignment() {
    let desc = sample();
    let a = Message::new(&desc);
    let b = Message::new(&desc);
    a.set("scores", &Value::map([("x", 1)])).unwrap();
    b.set("scores", &a.get("scores").unwrap()).unwrap();

    let via_a = a.get("scores").unwrap();
    let via_b = b.get("scores").unwrap();
    assert!(via_a.as_map_field().unwrap().same_storage(via_b.as_map_field().unwrap()));
    via_b
        .as_map_field()
        .unwrap()
        .set(&Value::from("y"), &Value::Int(2))
        .unwrap();
    assert_eq!(via_a.as_map_field().unwrap().len(), 2);

    let wrong = MapField::new(FieldType::Int32, FieldType::Int32).unwrap();
    assert!(matches!(
        a.set("scores", &Value::MapField(wrong)),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_map_of_messages() {
    let desc = sample();
    let msg = Message::new(&desc);
    let child = Message::new(&desc);
    child.set("count", &Value::Int(8)).unwrap();

    let children = msg.get("children").unwrap();
    let children = children.as_map_field().unwrap();
    children.set(&Value::Int(1), &Value::from(&child)).unwrap();

    let stored = children.get(&Value::Int(1)).unwrap();
    assert!(Message::same_instance(stored.as_message().unwrap(), &child));
    assert!(msg.arena().is_fused_with(child.arena()));
}

#[test]
fn test_map_cursor_walks_live_map() {
    let msg = Message::new(&sample());
    msg.set("scores", &Value::map([("b", 2), ("a", 1), ("c", 3)])).unwrap();
    let scores = msg.get("scores").unwrap();
    let scores = scores.as_map_field().unwrap();

    let mut it = scores.iter();
    let mut count = 0;
    while it.valid() {
        let key = it.key();
        assert_eq!(scores.get(&key).unwrap(), it.current().unwrap());
        count += 1;
        it.advance();
    }
    assert_eq!(count, 3);
    assert_eq!(it.key(), Value::Null);

    let total: i64 = scores.iter().map(|(_, v)| v.as_i64().unwrap()).sum();
    assert_eq!(total, 6);
}
