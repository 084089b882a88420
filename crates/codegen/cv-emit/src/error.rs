//! Emission errors

use crate::tokens::{RefKey, TableKind};
use thiserror::Error;

/// Emission error
#[derive(Debug, Error)]
pub enum EmitError {
    /// A reference reached the encoder without a reserved token
    #[error("no token reserved for {0:?}")]
    MissingToken(RefKey),
    /// A value does not fit the compressed integer encoding
    #[error("value {0:#x} does not fit a compressed integer")]
    CompressedOverflow(u32),
    /// A table grew past the 24-bit row space
    #[error("table {0} is full")]
    TableFull(TableKind),
    /// Serializing the tables image failed
    #[error("failed to encode tables image: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// Deserializing the tables image failed
    #[error("failed to decode tables image: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
