//! Sequence view over typed array storage.

use std::fmt;

use crate::arena::Arena;
use crate::convert::{to_dynamic, to_typed};
use crate::descriptor::FieldType;
use crate::error::{Error, Result};
use crate::storage::{Addr, ArrayData, Block, TypedValue};
use crate::value::Value;

/// Host-visible view of a repeated field.
///
/// The view holds its arena, so the storage stays alive for as long as the
/// view does. Cloning the view does not copy the elements.
#[derive(Clone)]
pub struct RepeatedField {
    arena: Arena,
    addr: Addr,
    element: FieldType,
}

impl RepeatedField {
    /// Empty standalone sequence in a fresh arena.
    pub fn new(element: FieldType) -> Self {
        let arena = Arena::new();
        let addr = arena.alloc(Block::Array(ArrayData::default()));
        Self::bind(arena, addr, element)
    }

    pub(crate) fn bind(arena: Arena, addr: Addr, element: FieldType) -> Self {
        Self {
            arena,
            addr,
            element,
        }
    }

    pub fn element_type(&self) -> &FieldType {
        &self.element
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn addr(&self) -> Addr {
        self.addr
    }

    /// Whether both views address the same storage.
    pub fn same_storage(&self, other: &RepeatedField) -> bool {
        self.addr == other.addr
    }

    pub fn len(&self) -> usize {
        self.arena.with_array(self.addr, |array| array.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership test for an index.
    pub fn contains_index(&self, index: usize) -> bool {
        index < self.len()
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        let item = self.arena.with_array(self.addr, |array| {
            array.items.get(index).cloned().ok_or(Error::IndexOutOfRange {
                index,
                len: array.items.len(),
            })
        })?;
        Ok(to_dynamic(&item, &self.element, &self.arena))
    }

    /// Overwrite an existing element. Does not grow the sequence.
    pub fn set(&self, index: usize, value: &Value) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let typed = to_typed(value, &self.element, &self.arena)?;
        self.arena.with_array_mut(self.addr, |array| {
            array.items[index] = typed;
        });
        Ok(())
    }

    /// Append one element.
    pub fn push(&self, value: &Value) -> Result<()> {
        let typed = to_typed(value, &self.element, &self.arena)?;
        self.push_typed(typed);
        Ok(())
    }

    pub(crate) fn push_typed(&self, typed: TypedValue) {
        self.arena
            .with_array_mut(self.addr, |array| array.items.push(typed));
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        let item = self
            .arena
            .with_array_mut(self.addr, |array| array.items.pop())?;
        Some(to_dynamic(&item, &self.element, &self.arena))
    }

    /// Append every value in order, stopping at the first conversion error.
    ///
    /// Elements appended before the failure stay appended.
    pub fn extend_from<'v>(&self, values: impl IntoIterator<Item = &'v Value>) -> Result<()> {
        for value in values {
            self.push(value)?;
        }
        Ok(())
    }

    /// Snapshot of all elements as host values.
    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().collect()
    }

    pub fn iter(&self) -> RepeatedFieldIter {
        RepeatedFieldIter {
            field: self.clone(),
            position: 0,
        }
    }
}

impl fmt::Debug for RepeatedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedField")
            .field("element", &self.element.to_string())
            .field("addr", &self.addr)
            .field("len", &self.len())
            .finish()
    }
}

impl IntoIterator for &RepeatedField {
    type Item = Value;
    type IntoIter = RepeatedFieldIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Restartable cursor over a sequence, in storage order.
pub struct RepeatedFieldIter {
    field: RepeatedField,
    position: usize,
}

impl RepeatedFieldIter {
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn valid(&self) -> bool {
        self.position < self.field.len()
    }

    pub fn key(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Result<Value> {
        self.field.get(self.position)
    }

    pub fn advance(&mut self) {
        self.position += 1;
    }
}

impl Iterator for RepeatedFieldIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let value = self.current().ok()?;
        self.advance();
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bounds() {
        let seq = RepeatedField::new(FieldType::Int32);
        assert!(seq.is_empty());
        assert!(matches!(
            seq.get(0),
            Err(Error::IndexOutOfRange { index: 0, len: 0 })
        ));
        assert!(matches!(
            seq.set(0, &Value::Int(1)),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(seq.pop().is_none());
    }

    #[test]
    fn test_push_get_set() {
        let seq = RepeatedField::new(FieldType::String);
        seq.push(&Value::from("a")).unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.get(0).unwrap(), Value::from("a"));
        seq.set(0, &Value::from("b")).unwrap();
        assert_eq!(seq.get(0).unwrap(), Value::from("b"));
        assert_eq!(seq.len(), 1);
        assert!(seq.contains_index(0));
        assert!(!seq.contains_index(1));
    }

    #[test]
    fn test_null_elements_rejected() {
        let seq = RepeatedField::new(FieldType::Double);
        assert!(matches!(
            seq.push(&Value::Null),
            Err(Error::NullNotAllowed { .. })
        ));
        assert!(seq.is_empty());
    }

    #[test]
    fn test_extend_is_best_effort() {
        let seq = RepeatedField::new(FieldType::Uint32);
        let values = [Value::Int(1), Value::Int(2), Value::Int(-3), Value::Int(4)];
        assert!(matches!(
            seq.extend_from(&values),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(seq.to_vec(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_iterator_protocol() {
        let seq = RepeatedField::new(FieldType::Int64);
        seq.extend_from(&[Value::Int(10), Value::Int(20)]).unwrap();

        let mut it = seq.iter();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push((it.key(), it.current().unwrap()));
            it.advance();
        }
        assert_eq!(seen, vec![(0, Value::Int(10)), (1, Value::Int(20))]);

        it.rewind();
        assert!(it.valid());
        assert_eq!(it.current().unwrap(), Value::Int(10));
        assert_eq!(it.count(), 2);
    }

    #[test]
    fn test_pop_and_clone_share_storage() {
        let seq = RepeatedField::new(FieldType::Bool);
        let alias = seq.clone();
        seq.push(&Value::Bool(true)).unwrap();
        assert_eq!(alias.len(), 1);
        assert!(seq.same_storage(&alias));
        assert_eq!(alias.pop(), Some(Value::Bool(true)));
        assert!(seq.is_empty());
    }
}
