//! Error taxonomy.
//!
//! - [`DecodeError`] — anything a reader can find wrong with package bytes.
//!   Never recovered from silently: a device must not apply a package that
//!   fails to decode.
//! - [`RecordError`] — encode-side failures while appending a record.
//! - [`PackError`] — top-level failures of the builder and the CLI tools.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid magic: found {}", hex::encode(.found))]
    InvalidMagic { found: Vec<u8> },
    #[error("Header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("Invalid record operation: {0:#04x}")]
    InvalidOperation(u8),
    #[error("Stream ended before the end of the structure")]
    TruncatedStream,
    #[error("Record path is not NUL-terminated")]
    UnterminatedPath,
    #[error("Record path exceeds {} bytes", crate::record::MAX_PATH_LEN)]
    PathTooLong,
    #[error("Record path is not valid UTF-8")]
    InvalidUtf8Path,
    #[error("IO error: {0}")]
    Io(io::Error),
}

/// An early EOF while decoding is a truncated package, not an I/O failure.
impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::TruncatedStream
        } else {
            DecodeError::Io(e)
        }
    }
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid record path {0:?}")]
    InvalidPath(String),
    #[error("Payload of {0} bytes exceeds the 4 GiB record limit")]
    PayloadTooLarge(u64),
    #[error("Payload source ended after {copied} of {expected} bytes")]
    TruncatedStream { expected: u64, copied: u64 },
    #[error("Package already holds the maximum number of records")]
    TooManyRecords,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Firmware image not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),
    #[error("Resource directory not found: {}", .0.display())]
    ResourceDirNotFound(PathBuf),
    #[error("Path is outside the resource directory: {}", .0.display())]
    Outside(PathBuf),
    #[error("Invalid path {0:?}")]
    InvalidPath(String),
    #[error("Two inputs map to the same package path {0:?}")]
    DuplicatePath(String),
    #[error("Refusing to unpack {0:?} outside the destination directory")]
    UnsafePath(String),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Could not move package into place: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
