//! Arena-backed protobuf messages for dynamically typed hosts.
//!
//! Message data lives in typed arena storage. Host code reaches it through
//! thin wrappers that convert between host [`Value`]s and typed storage on
//! every access, so the wrappers never own a second copy of the data.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ DescriptorPool  │────▶│ FieldDescriptor │
//! │  (type info)    │     │  (field info)   │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Message     │────▶│  to_typed /     │
//! │    (façade)     │     │  to_dynamic     │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ Arena + fusion  │◀────│ MapField /      │
//! │ identity cache  │     │ RepeatedField   │
//! └────────┬────────┘     └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  wire / JSON    │
//! │    codecs       │
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use protoz::descriptor::{DescriptorPool, DescriptorType, FieldSpec, MessageBuilder};
//! use protoz::{Message, Value};
//!
//! let pool = DescriptorPool::builder()
//!     .message(
//!         MessageBuilder::new("demo.Point")
//!             .field(FieldSpec::scalar("x", 1, DescriptorType::Int32))
//!             .field(FieldSpec::scalar("y", 2, DescriptorType::Int32)),
//!     )
//!     .build()?;
//! let desc = pool.message("demo.Point").unwrap();
//!
//! let msg = Message::new(&desc);
//! msg.set("x", &Value::from(3))?;
//! let bytes = msg.to_bytes()?;
//!
//! let decoded = Message::decode(&desc, &bytes)?;
//! assert_eq!(decoded.get("x")?, Value::Int(3));
//! assert_eq!(decoded.get("y")?, Value::Int(0));
//! # Ok::<(), protoz::Error>(())
//! ```

pub mod arena;
pub mod collection;
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod registry;
pub mod value;

mod codec;
mod identity;
mod storage;

#[cfg(test)]
mod tests;

pub use arena::Arena;
pub use collection::{MapField, MapFieldIter, RepeatedField, RepeatedFieldIter};
pub use config::CodecConfig;
pub use error::{Error, Result};
pub use message::Message;
pub use registry::{TypeRegistry, find_enum, find_message, register_pool};
pub use storage::{Addr, MapKey, TypedValue};
pub use value::Value;
