//! Associative view over typed map storage.

use std::fmt;
use std::ops::Bound;

use crate::arena::Arena;
use crate::convert::{map_key_to_dynamic, to_dynamic, to_map_key, to_typed};
use crate::descriptor::FieldType;
use crate::error::{Error, Result};
use crate::storage::{Addr, Block, MapData, MapKey, TypedValue};
use crate::value::Value;

/// Host-visible view of a map field.
#[derive(Clone)]
pub struct MapField {
    arena: Arena,
    addr: Addr,
    key_type: FieldType,
    value_type: FieldType,
}

impl MapField {
    /// Empty standalone map in a fresh arena.
    ///
    /// Fails with `InvalidMapKeyType` unless the key type is an integer,
    /// bool, string or bytes type.
    pub fn new(key_type: FieldType, value_type: FieldType) -> Result<Self> {
        if !key_type.is_valid_map_key() {
            return Err(Error::InvalidMapKeyType(key_type.to_string()));
        }
        let arena = Arena::new();
        let addr = arena.alloc(Block::Map(MapData::default()));
        Ok(Self::bind(arena, addr, key_type, value_type))
    }

    pub(crate) fn bind(arena: Arena, addr: Addr, key_type: FieldType, value_type: FieldType) -> Self {
        Self {
            arena,
            addr,
            key_type,
            value_type,
        }
    }

    pub fn key_type(&self) -> &FieldType {
        &self.key_type
    }

    pub fn value_type(&self) -> &FieldType {
        &self.value_type
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn addr(&self) -> Addr {
        self.addr
    }

    pub fn same_storage(&self, other: &MapField) -> bool {
        self.addr == other.addr
    }

    pub fn len(&self) -> usize {
        self.arena.with_map(self.addr, |map| map.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, key: &Value) -> Result<MapKey> {
        to_map_key(key, &self.key_type, &self.arena)
    }

    /// Membership test. Fails only when `key` cannot be a key of this map.
    pub fn contains(&self, key: &Value) -> Result<bool> {
        let key = self.key(key)?;
        Ok(self
            .arena
            .with_map(self.addr, |map| map.entries.contains_key(&key)))
    }

    /// Value stored under `key`; a missing key is `KeyNotFound`.
    pub fn get(&self, key: &Value) -> Result<Value> {
        let key = self.key(key)?;
        let value = self
            .arena
            .with_map(self.addr, |map| map.entries.get(&key).cloned())
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        Ok(to_dynamic(&value, &self.value_type, &self.arena))
    }

    /// Insert or replace the entry for `key`.
    pub fn set(&self, key: &Value, value: &Value) -> Result<()> {
        let key = self.key(key)?;
        let value = to_typed(value, &self.value_type, &self.arena)?;
        self.insert_typed(key, value);
        Ok(())
    }

    pub(crate) fn insert_typed(&self, key: MapKey, value: TypedValue) {
        self.arena.with_map_mut(self.addr, |map| {
            map.entries.insert(key, value);
        });
    }

    /// Remove the entry for `key`. Removing an absent key is a no-op.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, key: &Value) -> Result<bool> {
        let key = self.key(key)?;
        Ok(self
            .arena
            .with_map_mut(self.addr, |map| map.entries.remove(&key).is_some()))
    }

    /// Insert every pair in order, stopping at the first conversion error.
    ///
    /// Entries inserted before the failure stay inserted.
    pub fn extend_from<'v>(
        &self,
        entries: impl IntoIterator<Item = &'v (Value, Value)>,
    ) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Snapshot of all entries as host values, in key order.
    pub fn to_vec(&self) -> Vec<(Value, Value)> {
        self.iter().collect()
    }

    pub fn iter(&self) -> MapFieldIter {
        let mut iter = MapFieldIter {
            field: self.clone(),
            cursor: None,
        };
        iter.rewind();
        iter
    }

    fn first_key(&self) -> Option<MapKey> {
        self.arena
            .with_map(self.addr, |map| map.entries.keys().next().cloned())
    }

    fn key_after(&self, key: &MapKey) -> Option<MapKey> {
        self.arena.with_map(self.addr, |map| {
            map.entries
                .range((Bound::Excluded(key), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone())
        })
    }
}

impl fmt::Debug for MapField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapField")
            .field("key", &self.key_type.to_string())
            .field("value", &self.value_type.to_string())
            .field("addr", &self.addr)
            .field("len", &self.len())
            .finish()
    }
}

impl IntoIterator for &MapField {
    type Item = (Value, Value);
    type IntoIter = MapFieldIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Restartable cursor over a map.
///
/// The cursor remembers the current key, not a copy of the entries, so it
/// walks the live map. Mutating the map mid-traversal has no defined order.
pub struct MapFieldIter {
    field: MapField,
    cursor: Option<MapKey>,
}

impl MapFieldIter {
    pub fn rewind(&mut self) {
        self.cursor = self.field.first_key();
    }

    pub fn valid(&self) -> bool {
        self.cursor.is_some()
    }

    /// Current key, or `Null` past the end.
    pub fn key(&self) -> Value {
        match &self.cursor {
            Some(key) => map_key_to_dynamic(key, &self.field.key_type, &self.field.arena),
            None => Value::Null,
        }
    }

    pub fn current(&self) -> Result<Value> {
        let Some(key) = &self.cursor else {
            return Err(Error::KeyNotFound("<end>".into()));
        };
        let value = self
            .field
            .arena
            .with_map(self.field.addr, |map| map.entries.get(key).cloned())
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        Ok(to_dynamic(&value, &self.field.value_type, &self.field.arena))
    }

    pub fn advance(&mut self) {
        if let Some(key) = self.cursor.take() {
            self.cursor = self.field.key_after(&key);
        }
    }
}

impl Iterator for MapFieldIter {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.current().ok()?;
        let key = self.key();
        self.advance();
        Some((key, value))
    }
}
