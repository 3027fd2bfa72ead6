//! Error types for the message bridge.

use crate::descriptor::DescriptorError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller of a bridge operation.
///
/// None of these are transient; the bridge never retries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Value of the wrong kind for the target type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// String data that is not valid UTF-8
    #[error("invalid UTF-8 in {context}")]
    InvalidEncoding { context: String },

    /// Numeric value that does not fit the declared width
    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: String },

    /// `Null` where the target requires a value
    #[error("null is not allowed for {target}")]
    NullNotAllowed { target: String },

    #[error("key {0} not found in map")]
    KeyNotFound(String),

    #[error("index {index} is out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("field '{field}' not found in message '{message}'")]
    FieldNotFound { message: String, field: String },

    #[error("oneof '{oneof}' not found in message '{message}'")]
    OneofNotFound { message: String, oneof: String },

    /// Map declared with a key type protobuf does not allow
    #[error("invalid map key type: {0}")]
    InvalidMapKeyType(String),

    /// Wire or JSON input could not be decoded
    #[error("parse error: {0}")]
    ParseError(String),

    /// Message could not be encoded
    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

impl Error {
    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn out_of_range(value: impl std::fmt::Display, target: impl Into<String>) -> Self {
        Error::OutOfRange {
            value: value.to_string(),
            target: target.into(),
        }
    }

    pub(crate) fn null_not_allowed(target: impl Into<String>) -> Self {
        Error::NullNotAllowed {
            target: target.into(),
        }
    }
}

impl From<protoz_wire::Error> for Error {
    fn from(e: protoz_wire::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}
