//! Collection adapters for map and repeated fields.
//!
//! Views do not own their elements. Each one holds an arena handle plus the
//! type information needed to convert entries on demand through
//! [`crate::convert`].

mod map;
mod repeated;

pub use map::{MapField, MapFieldIter};
pub use repeated::{RepeatedField, RepeatedFieldIter};
