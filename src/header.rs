//! Package header — the fixed 16 bytes at offset 0.
//!
//! ```text
//! offset  size  field
//!  0       4    magic        b"UPKG"
//!  4       4    version      u32 LE
//!  8       4    file_count   u32 LE
//! 12       4    crc32        u32 LE, CRC-32/ISO-HDLC over bytes 0..12
//! ```
//!
//! The builder writes [`HEADER_SIZE`] zero bytes first and patches the real
//! header in place once the record count is known.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher;
use std::io::{self, Read, Write};

use crate::error::DecodeError;

pub const MAGIC: &[u8; 4] = b"UPKG";
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 16;
/// Bytes covered by the checksum: magic, version, file_count.
const CRC_SPAN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageHeader {
    pub version:    u32,
    pub file_count: u32,
}

impl PackageHeader {
    pub fn new(version: u32, file_count: u32) -> Self {
        Self { version, file_count }
    }

    /// Serialize with a freshly computed checksum.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..4].copy_from_slice(MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.version);
        LittleEndian::write_u32(&mut buf[8..12], self.file_count);
        let crc = header_crc(&buf[..CRC_SPAN]);
        LittleEndian::write_u32(&mut buf[CRC_SPAN..], crc);
        buf
    }

    /// Parse and validate a header. Magic is checked before the checksum.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, DecodeError> {
        if &buf[..4] != MAGIC {
            return Err(DecodeError::InvalidMagic { found: buf[..4].to_vec() });
        }
        let stored   = LittleEndian::read_u32(&buf[CRC_SPAN..]);
        let computed = header_crc(&buf[..CRC_SPAN]);
        if stored != computed {
            return Err(DecodeError::ChecksumMismatch { stored, computed });
        }
        Ok(Self {
            version:    LittleEndian::read_u32(&buf[4..8]),
            file_count: LittleEndian::read_u32(&buf[8..12]),
        })
    }

    /// The checksum this header serializes with.
    pub fn crc32(&self) -> u32 {
        LittleEndian::read_u32(&self.encode()[CRC_SPAN..])
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, DecodeError> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }
}

/// Encode a header for `version` and `file_count`.
pub fn encode(version: u32, file_count: u32) -> [u8; HEADER_SIZE] {
    PackageHeader::new(version, file_count).encode()
}

/// Decode and validate a 16-byte header.
pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<PackageHeader, DecodeError> {
    PackageHeader::decode(buf)
}

fn header_crc(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}
