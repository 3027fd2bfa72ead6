//! Error types for wire-format reading

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Decode(#[from] prost::DecodeError),

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("length-delimited field of {0} bytes exceeds remaining input")]
    LengthOverflow(u64),

    #[error("groups are not supported (field {0})")]
    GroupNotSupported(u32),
}
