//! Wire and JSON codecs.
//!
//! Both codecs walk arena storage directly rather than going through host
//! values, so encoding never allocates wrappers.

pub(crate) mod json;
pub(crate) mod wire;
