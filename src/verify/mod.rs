//! End-to-end package verification.
//!
//! [`scan`] reads a package front to back the way the device does: header
//! first (magic + CRC32), then exactly `file_count` records, trusting each
//! `size` field. It reports what it found instead of stopping at the first
//! short read, so a half-written package can still be described.
//!
//! ## Completeness
//!
//! | Verdict | Meaning |
//! |---------|---------|
//! | `Complete` | every declared record present, nothing after the last one |
//! | `Truncated` | the stream ends before `file_count` records are complete |
//! | `TrailingData` | all records present, followed by extra bytes |
//!
//! A bad header, a bad record magic, an unknown operation or an overlong path
//! is not a verdict: those return `Err`, because nothing after them can be
//! located.

use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{DecodeError, PackResult};
use crate::header::PackageHeader;
use crate::io_stream::PackageReader;
use crate::record::Operation;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Completeness {
    Complete,
    /// `found` counts only records whose payload is fully present.
    Truncated { declared: u32, found: u32 },
    TrailingData { bytes: u64 },
}

/// One record located by the scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedRecord {
    pub offset:    u64,
    pub operation: Operation,
    pub path:      String,
    pub size:      u32,
    /// BLAKE3 of the payload, hex; only with [`ScanOptions::hashes`].
    pub digest:    Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub hashes: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub version:       u32,
    pub declared:      u32,
    pub crc32:         u32,
    pub records:       Vec<ScannedRecord>,
    pub bytes_scanned: u64,
    pub completeness:  Completeness,
}

impl VerifyReport {
    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }

    /// Summary line for display.
    pub fn summary(&self) -> String {
        match &self.completeness {
            Completeness::Complete => format!(
                "ok: {} record(s), {} bytes, version {}",
                self.records.len(), self.bytes_scanned, self.version,
            ),
            Completeness::Truncated { declared, found } => format!(
                "truncated: header declares {declared} record(s), {found} complete in {} bytes",
                self.bytes_scanned,
            ),
            Completeness::TrailingData { bytes } => format!(
                "trailing data: {} record(s) followed by {bytes} unexpected byte(s)",
                self.records.len(),
            ),
        }
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

pub fn scan<R: Read>(reader: R, opts: ScanOptions) -> Result<VerifyReport, DecodeError> {
    let mut pkg = PackageReader::new(reader)?;
    let header: PackageHeader = pkg.header;
    let mut records = Vec::with_capacity(header.file_count.min(1024) as usize);

    let truncated = loop {
        let entry = match pkg.next_record() {
            Ok(Some(e)) => e,
            Ok(None) => break false,
            Err(DecodeError::TruncatedStream | DecodeError::UnterminatedPath) => break true,
            Err(e) => return Err(e),
        };

        let digest = if opts.hashes {
            let mut hasher = blake3::Hasher::new();
            match pkg.read_payload(&mut hasher) {
                Ok(_) => Some(hex::encode(hasher.finalize().as_bytes())),
                Err(DecodeError::TruncatedStream) => break true,
                Err(e) => return Err(e),
            }
        } else {
            match pkg.read_payload(&mut io::sink()) {
                Ok(_) => None,
                Err(DecodeError::TruncatedStream) => break true,
                Err(e) => return Err(e),
            }
        };

        records.push(ScannedRecord {
            offset:    entry.offset,
            operation: entry.header.operation,
            path:      entry.header.path,
            size:      entry.header.size,
            digest,
        });
    };

    let completeness = if truncated {
        Completeness::Truncated { declared: header.file_count, found: records.len() as u32 }
    } else {
        match pkg.trailing_bytes()? {
            0 => Completeness::Complete,
            bytes => Completeness::TrailingData { bytes },
        }
    };

    Ok(VerifyReport {
        version:       header.version,
        declared:      header.file_count,
        crc32:         header.crc32(),
        records,
        bytes_scanned: pkg.position(),
        completeness,
    })
}

/// Convenience: scan a package file.
pub fn scan_file(path: &Path, opts: ScanOptions) -> PackResult<VerifyReport> {
    let f = BufReader::new(File::open(path)?);
    Ok(scan(f, opts)?)
}
