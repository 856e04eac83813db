//! Unpack a package into a directory tree.
//!
//! `ADD` and `MOD` payloads are written under the destination using their
//! logical path; `DEL` records have nothing to write and are only counted.
//! Output is streamed record by record, so memory stays flat for large images.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::error::PackResult;
use crate::io_stream::PackageReader;
use crate::path::unpack_target;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    pub written: u32,
    pub deleted: u32,
    pub bytes:   u64,
}

/// Extract every payload-carrying record from `reader` into `dest`.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> PackResult<UnpackSummary> {
    let mut pkg = PackageReader::new(reader)?;
    fs::create_dir_all(dest)?;

    let mut summary = UnpackSummary::default();
    while let Some(entry) = pkg.next_record()? {
        let op = entry.header.operation;
        if !op.carries_payload() {
            warn!("Skipping {op} {}: nothing to unpack", entry.header.path);
            summary.deleted += 1;
            continue;
        }

        let target = unpack_target(dest, &entry.header.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&target)?);
        summary.bytes += pkg.read_payload(&mut out)?;
        out.flush()?;
        summary.written += 1;
        info!("{op} {} -> {}", entry.header.path, target.display());
    }
    Ok(summary)
}

/// Convenience: unpack a package file.
pub fn unpack_file(package: &Path, dest: &Path) -> PackResult<UnpackSummary> {
    unpack(BufReader::new(File::open(package)?), dest)
}
