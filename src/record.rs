//! File records — one per packaged file, written back to back after the header.
//!
//! ```text
//! [0xAA] [operation u8] [path UTF-8 ...] [0x00] [size u32 LE] [payload: size bytes]
//! ```
//!
//! There is no padding and no per-record checksum. A reader finds the next
//! record purely by trusting `size`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};

use crate::error::{DecodeError, RecordError};

pub const RECORD_MAGIC: u8 = 0xAA;
/// Fixed bytes in a record header: magic, operation, path NUL, size.
pub const RECORD_OVERHEAD: u64 = 7;
/// Longest path a record may carry, in bytes, NUL excluded. Enforced on
/// both encode and decode.
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Operation {
    Add    = 0,
    Delete = 1,
    Modify = 2,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Add    => "ADD",
            Operation::Delete => "DEL",
            Operation::Modify => "MOD",
        }
    }

    /// Whether the device applier expects payload bytes for this operation.
    pub fn carries_payload(self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

impl TryFrom<u8> for Operation {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Operation::Add),
            1 => Ok(Operation::Delete),
            2 => Ok(Operation::Modify),
            other => Err(DecodeError::InvalidOperation(other)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything in a record except the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub operation: Operation,
    pub path:      String,
    pub size:      u32,
}

impl RecordHeader {
    /// Validate and build a record header. The path may not contain NUL or
    /// exceed [`MAX_PATH_LEN`] bytes, and the payload must fit the 32-bit
    /// size field.
    pub fn new(operation: Operation, path: &str, size: u64) -> Result<Self, RecordError> {
        if path.len() > MAX_PATH_LEN || path.as_bytes().contains(&0) {
            return Err(RecordError::InvalidPath(path.to_owned()));
        }
        let size = u32::try_from(size).map_err(|_| RecordError::PayloadTooLarge(size))?;
        Ok(Self { operation, path: path.to_owned(), size })
    }

    /// Length of the serialized header, payload excluded.
    pub fn encoded_len(&self) -> u64 {
        RECORD_OVERHEAD + self.path.len() as u64
    }

    /// Length of the whole record on disk.
    pub fn record_len(&self) -> u64 {
        self.encoded_len() + self.size as u64
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len() as usize);
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut out);
        out
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(RECORD_MAGIC)?;
        writer.write_u8(self.operation as u8)?;
        writer.write_all(self.path.as_bytes())?;
        writer.write_u8(0)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    /// Read a record header, leaving the stream positioned at the payload.
    ///
    /// Reads the path byte by byte; wrap unbuffered sources in a `BufReader`.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, DecodeError> {
        let magic = reader.read_u8()?;
        if magic != RECORD_MAGIC {
            return Err(DecodeError::InvalidMagic { found: vec![magic] });
        }
        let operation = Operation::try_from(reader.read_u8()?)?;

        let mut path = Vec::new();
        loop {
            let b = match reader.read_u8() {
                Ok(b) => b,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(DecodeError::UnterminatedPath);
                }
                Err(e) => return Err(DecodeError::Io(e)),
            };
            if b == 0 {
                break;
            }
            if path.len() == MAX_PATH_LEN {
                return Err(DecodeError::PathTooLong);
            }
            path.push(b);
        }
        let path = String::from_utf8(path).map_err(|_| DecodeError::InvalidUtf8Path)?;

        let size = reader.read_u32::<LittleEndian>()?;
        Ok(Self { operation, path, size })
    }
}

/// Encode the header of one record.
pub fn encode_header(operation: Operation, path: &str, payload_size: u64) -> Result<Vec<u8>, RecordError> {
    Ok(RecordHeader::new(operation, path, payload_size)?.encode())
}

/// Decode the header of the next record in `reader`.
pub fn decode_header<R: Read>(reader: R) -> Result<RecordHeader, DecodeError> {
    RecordHeader::read(reader)
}

/// Copy exactly `size` bytes from `src` to `dst` through a fixed-size buffer.
///
/// A source that runs dry early is an error: the size field has already been
/// written and the package would be misframed.
pub fn copy_payload<R: Read, W: Write>(src: R, dst: &mut W, size: u64) -> Result<u64, RecordError> {
    let copied = io::copy(&mut src.take(size), dst)?;
    if copied != size {
        return Err(RecordError::TruncatedStream { expected: size, copied });
    }
    Ok(copied)
}

/// Consume `size` payload bytes without keeping them.
pub fn skip_payload<R: Read>(src: R, size: u64) -> Result<(), DecodeError> {
    let skipped = io::copy(&mut src.take(size), &mut io::sink())?;
    if skipped != size {
        return Err(DecodeError::TruncatedStream);
    }
    Ok(())
}
