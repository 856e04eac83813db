//! Streaming package engine — writer and reader.
//!
//! # Writer
//! [`PackageWriter`] reserves [`HEADER_SIZE`] zero bytes at offset 0, then
//! appends one record per call, streaming each payload through a bounded
//! buffer. `finalize()` seeks back to offset 0 and patches the real header
//! with the final record count. That is the only backward seek.
//!
//! # Reader
//! [`PackageReader`] validates the header, then yields records strictly in
//! order. The payload of the current record can be copied out with
//! `read_payload()`; otherwise it is skipped on the next `next_record()`.
//! No seeking is needed, so any `Read` works.
//!
//! # Endianness
//! All multi-byte fields are little-endian; see `header.rs` and `record.rs`.

use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::debug;

use crate::error::{DecodeError, RecordError};
use crate::header::{PackageHeader, HEADER_SIZE};
use crate::record::{copy_payload, skip_payload, Operation, RecordHeader};

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct PackageWriter<W: Write + Seek> {
    writer:     W,
    file_count: u32,
    /// Bytes written so far, reserved header included.
    position:   u64,
}

impl<W: Write + Seek> PackageWriter<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&[0u8; HEADER_SIZE])?; // reserved; overwritten on finalize
        Ok(Self {
            writer,
            file_count: 0,
            position:   HEADER_SIZE as u64,
        })
    }

    pub fn file_count(&self) -> u32 { self.file_count }

    pub fn position(&self) -> u64 { self.position }

    // ── Record ingestion ─────────────────────────────────────────────────────

    /// Append one record whose payload is streamed from `src`.
    ///
    /// `size` is written into the record before any payload byte, so `src`
    /// must yield at least that many bytes. Returns the record's offset.
    pub fn add_reader<R: Read>(
        &mut self,
        operation: Operation,
        path:      &str,
        size:      u64,
        src:       R,
    ) -> Result<u64, RecordError> {
        let header = RecordHeader::new(operation, path, size)?;
        let next_count = self.file_count
            .checked_add(1)
            .ok_or(RecordError::TooManyRecords)?;

        let offset = self.position;
        header.write(&mut self.writer)?;
        copy_payload(src, &mut self.writer, size)?;

        self.position  += header.record_len();
        self.file_count = next_count;
        Ok(offset)
    }

    /// Append one record with an in-memory payload.
    pub fn add_file(&mut self, operation: Operation, path: &str, data: &[u8]) -> Result<u64, RecordError> {
        self.add_reader(operation, path, data.len() as u64, data)
    }

    /// Append a `DEL` record. It carries no payload.
    pub fn add_delete(&mut self, path: &str) -> Result<u64, RecordError> {
        self.add_reader(Operation::Delete, path, 0, io::empty())
    }

    // ── Finalization ─────────────────────────────────────────────────────────

    /// Patch the header at offset 0 and hand back the underlying writer.
    ///
    /// If this fails the stream still holds the zero placeholder, which no
    /// reader accepts; the output must be discarded.
    pub fn finalize(mut self, version: u32) -> io::Result<(PackageHeader, W)> {
        let header = PackageHeader::new(version, self.file_count);
        self.writer.seek(SeekFrom::Start(0))?;
        header.write(&mut self.writer)?;
        self.writer.flush()?;
        debug!(
            version,
            file_count = self.file_count,
            crc32 = header.crc32(),
            "Patched package header"
        );
        Ok((header, self.writer))
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// One record as seen by [`PackageReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub header:  RecordHeader,
    /// Absolute offset of the record's magic byte.
    pub offset:  u64,
    /// Zero-based position in the package.
    pub index:   u32,
}

impl RecordEntry {
    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header.encoded_len()
    }
}

pub struct PackageReader<R: Read> {
    reader:         R,
    pub header:     PackageHeader,
    records_read:   u32,
    /// Unconsumed payload bytes of the current record.
    pending:        u64,
    position:       u64,
}

impl<R: Read> PackageReader<R> {
    pub fn new(mut reader: R) -> Result<Self, DecodeError> {
        let header = PackageHeader::read(&mut reader)?;
        Ok(Self {
            reader,
            header,
            records_read: 0,
            pending:      0,
            position:     HEADER_SIZE as u64,
        })
    }

    pub fn records_read(&self) -> u32 { self.records_read }

    /// Offset of the next unread byte.
    pub fn position(&self) -> u64 { self.position }

    /// Advance to the next record. Returns `None` once `file_count` records
    /// have been read; anything after that is not part of the package.
    pub fn next_record(&mut self) -> Result<Option<RecordEntry>, DecodeError> {
        self.skip_pending()?;
        if self.records_read == self.header.file_count {
            return Ok(None);
        }

        let offset = self.position;
        let header = RecordHeader::read(&mut self.reader)?;
        self.position += header.encoded_len();
        self.pending   = header.size as u64;

        let entry = RecordEntry { header, offset, index: self.records_read };
        self.records_read += 1;
        Ok(Some(entry))
    }

    /// Copy the current record's remaining payload into `out`.
    pub fn read_payload<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64, DecodeError> {
        let want   = self.pending;
        let copied = io::copy(&mut (&mut self.reader).take(want), out)?;
        self.position += copied;
        self.pending  -= copied;
        if copied != want {
            return Err(DecodeError::TruncatedStream);
        }
        Ok(copied)
    }

    /// Count bytes left in the stream after the last record.
    pub fn trailing_bytes(&mut self) -> Result<u64, DecodeError> {
        self.skip_pending()?;
        Ok(io::copy(&mut self.reader, &mut io::sink())?)
    }

    pub fn into_inner(self) -> R { self.reader }

    fn skip_pending(&mut self) -> Result<(), DecodeError> {
        if self.pending > 0 {
            skip_payload(&mut self.reader, self.pending)?;
            self.position += self.pending;
            self.pending   = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        let mut w = PackageWriter::new(Cursor::new(Vec::new())).unwrap();
        w.add_file(Operation::Add, "/RGBLight.bin", &[7u8; 32]).unwrap();
        w.add_delete("/old.bin").unwrap();
        w.add_file(Operation::Modify, "/cfg.json", b"{}").unwrap();
        let (header, cursor) = w.finalize(1).unwrap();
        assert_eq!(header.file_count, 3);
        cursor.into_inner()
    }

    #[test]
    fn writer_backpatches_header() {
        let bytes = sample();
        let header = PackageHeader::read(&bytes[..]).unwrap();
        assert_eq!(header, PackageHeader::new(1, 3));
    }

    #[test]
    fn writer_tracks_position() {
        let mut w = PackageWriter::new(Cursor::new(Vec::new())).unwrap();
        let first = w.add_file(Operation::Add, "/a", b"xyz").unwrap();
        assert_eq!(first, HEADER_SIZE as u64);
        assert_eq!(w.position(), HEADER_SIZE as u64 + 7 + 2 + 3);
        let (_, cursor) = w.finalize(1).unwrap();
        assert_eq!(cursor.into_inner().len() as u64, HEADER_SIZE as u64 + 12);
    }

    #[test]
    fn unfinalized_output_is_rejected() {
        let mut w = PackageWriter::new(Cursor::new(Vec::new())).unwrap();
        w.add_file(Operation::Add, "/a", b"xyz").unwrap();
        // Dropped without finalize: the placeholder stays zeroed.
        let bytes = w.writer.into_inner();
        assert!(matches!(PackageReader::new(&bytes[..]), Err(DecodeError::InvalidMagic { .. })));
    }

    #[test]
    fn reader_walks_all_records() {
        let bytes = sample();
        let mut r = PackageReader::new(&bytes[..]).unwrap();

        let first = r.next_record().unwrap().unwrap();
        assert_eq!(first.header.path, "/RGBLight.bin");
        assert_eq!(first.offset, HEADER_SIZE as u64);
        let mut payload = Vec::new();
        r.read_payload(&mut payload).unwrap();
        assert_eq!(payload, vec![7u8; 32]);

        let second = r.next_record().unwrap().unwrap();
        assert_eq!(second.header.operation, Operation::Delete);
        assert_eq!(second.header.size, 0);

        // Third payload is skipped implicitly.
        let third = r.next_record().unwrap().unwrap();
        assert_eq!(third.header.operation, Operation::Modify);
        assert_eq!(third.index, 2);

        assert!(r.next_record().unwrap().is_none());
        assert_eq!(r.trailing_bytes().unwrap(), 0);
        assert_eq!(r.position(), bytes.len() as u64);
    }

    #[test]
    fn reader_reports_truncation() {
        let bytes = sample();
        let cut = &bytes[..bytes.len() - 1];
        let mut r = PackageReader::new(cut).unwrap();
        r.next_record().unwrap();
        r.next_record().unwrap();
        r.next_record().unwrap();
        let mut sink = Vec::new();
        assert!(matches!(r.read_payload(&mut sink), Err(DecodeError::TruncatedStream)));
    }
}
