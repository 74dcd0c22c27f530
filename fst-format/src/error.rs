use std::path::PathBuf;

use crate::array::Shape;
use crate::directory::RecordHandle;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store not found. Path: '{}'", .1.display())]
    NotFound(#[source] std::io::Error, PathBuf),

    #[error("Record not found (deleted or stale handle): {0}")]
    RecordNotFound(RecordHandle),

    #[error("Unrecognized store format: {0}")]
    Format(String),

    #[error("Payload shape {actual} does not match declared shape {expected}")]
    Shape { expected: Shape, actual: Shape },

    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("Store was opened read-only")]
    ReadOnly,

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("I/O failure")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for both a missing store path and a stale record handle.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(..) | Error::RecordNotFound(_))
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Error {
        Error::CorruptData(msg.into())
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Error {
        Error::InvalidInput(msg.into())
    }

    /// Truncated reads inside a directory or payload mean the bytes are corrupt,
    /// not that the disk failed.
    pub(crate) fn from_read(err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData => {
                Error::CorruptData(err.to_string())
            }
            _ => Error::Io(err),
        }
    }
}
