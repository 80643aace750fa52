//! Error types for graph codec operations

use crate::{types::TypeName, value::Handle};
use thiserror::Error;

/// Error type for graph codec operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    #[error("extra data found: {0} bytes")]
    ExtraData(usize),
    #[error("invalid varint")]
    InvalidVarint,
    #[error("invalid bool")]
    InvalidBool,
    #[error("invalid data in {0}: {1}")]
    InvalidData(&'static str, String), // context, message
    #[error("invalid length: {0}")]
    InvalidLength(usize),
    #[error("invalid ref flag: {0}")]
    InvalidRefFlag(i8),
    #[error("unknown ref id: {0}")]
    UnknownRef(u32),
    #[error("invalid type id: {0}")]
    InvalidTypeId(u32),
    #[error("header mismatch: read {read:#04x}, expected {expected:#04x}")]
    HeaderMismatch { read: u8, expected: u8 },
    #[error("struct version mismatch for {ty}: read {read}, expected {expected}")]
    VersionMismatch { ty: TypeName, read: i32, expected: i32 },
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("unknown meta index: {0}")]
    UnknownMeta(u32),
    #[error("unknown variant of {ty}: {variant}")]
    UnknownEnumVariant { ty: String, variant: String },
    #[error("type mismatch in {context}: expected {expected}")]
    TypeMismatch { context: String, expected: String },
    #[error("unexpected null in {0}")]
    UnexpectedNull(String),
    #[error("dangling handle: {0:?}")]
    DanglingHandle(Handle),
    #[error("duplicate type: {0}")]
    DuplicateType(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("engine must be reset after a failed call")]
    Poisoned,
}
