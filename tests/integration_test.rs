use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use upkg::builder::PackageBuilder;
use upkg::config::BuildConfig;
use upkg::extract::unpack_file;
use upkg::io_stream::{PackageReader, PackageWriter};
use upkg::verify::{scan, scan_file, Completeness, ScanOptions};
use upkg::{DecodeError, Operation, PackError, PackageHeader, HEADER_SIZE};

struct Project {
    root: TempDir,
    cfg:  BuildConfig,
}

impl Project {
    fn new(firmware_len: usize) -> Self {
        let root = TempDir::new().unwrap();
        let firmware = root.path().join("build").join("RGBLight.ino.bin");
        fs::create_dir_all(firmware.parent().unwrap()).unwrap();
        fs::write(&firmware, (0..firmware_len).map(|i| i as u8).collect::<Vec<u8>>()).unwrap();
        let data = root.path().join("data");
        fs::create_dir_all(&data).unwrap();
        let cfg = BuildConfig {
            firmware_path: firmware,
            data_dir: data,
            output_dir: root.path().join("build"),
            ..BuildConfig::default()
        };
        Self { root, cfg }
    }

    fn add(&self, rel: &str, data: &[u8]) -> &Self {
        let p = self.cfg.data_dir.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, data).unwrap();
        self
    }

    fn output(&self) -> PathBuf {
        self.cfg.output_path()
    }
}

fn read_records(path: &Path) -> Vec<(Operation, String, Vec<u8>)> {
    let mut reader = PackageReader::new(BufReader::new(File::open(path).unwrap())).unwrap();
    let mut out = Vec::new();
    while let Some(entry) = reader.next_record().unwrap() {
        let mut payload = Vec::new();
        reader.read_payload(&mut payload).unwrap();
        out.push((entry.header.operation, entry.header.path, payload));
    }
    assert_eq!(reader.trailing_bytes().unwrap(), 0);
    out
}

#[test]
fn test_concrete_firmware_plus_one_icon() {
    let p = Project::new(1024);
    p.add("icons/a.bin", &[9u8; 10]);

    let report = PackageBuilder::new(p.cfg.clone()).build().unwrap();
    assert_eq!(report.file_count, 2);

    let bytes = fs::read(p.output()).unwrap();
    // 16 + (7 + 13 + 1024) + (7 + 12 + 10)
    assert_eq!(bytes.len(), 1089);

    let header = PackageHeader::read(&bytes[..]).unwrap();
    assert_eq!(header.version, 1);
    assert_eq!(header.file_count, 2);

    // First record starts right after the header.
    assert_eq!(&bytes[16..18], &[0xAA, 0x00]);
    assert_eq!(&bytes[18..31], b"/RGBLight.bin");
    assert_eq!(bytes[31], 0x00);
    assert_eq!(&bytes[32..36], &1024u32.to_le_bytes());
}

#[test]
fn test_payloads_are_verbatim() {
    let p = Project::new(300);
    p.add("index.html", b"<html></html>").add("cfg/empty.json", b"");

    PackageBuilder::new(p.cfg.clone()).build().unwrap();
    let records = read_records(&p.output());

    let firmware = fs::read(&p.cfg.firmware_path).unwrap();
    assert_eq!(records[0], (Operation::Add, "/RGBLight.bin".to_string(), firmware));
    assert_eq!(records[1], (Operation::Add, "/cfg/empty.json".to_string(), Vec::new()));
    assert_eq!(records[2], (Operation::Add, "/index.html".to_string(), b"<html></html>".to_vec()));
}

#[test]
fn test_count_invariant_any_depth() {
    let p = Project::new(64);
    let names = ["a.bin", "x/b.bin", "x/y/c.bin", "x/y/z/d.bin", "w/e.bin"];
    for (i, n) in names.iter().enumerate() {
        p.add(n, &vec![i as u8; i * 3]);
    }
    fs::create_dir_all(p.cfg.data_dir.join("empty/dir")).unwrap();

    let report = PackageBuilder::new(p.cfg.clone()).build().unwrap();
    assert_eq!(report.file_count as usize, names.len() + 1);

    let verify = scan_file(&p.output(), ScanOptions::default()).unwrap();
    assert_eq!(verify.completeness, Completeness::Complete);
    assert_eq!(verify.records.len(), names.len() + 1);
}

#[test]
fn test_size_is_determined_by_records() {
    let p = Project::new(777);
    p.add("fonts/ünïcode.bin", &[1u8; 33]).add("b", &[2u8; 1]);

    let report = PackageBuilder::new(p.cfg.clone()).build().unwrap();
    let expected: u64 = HEADER_SIZE as u64
        + report.files.iter().map(|f| 7 + f.logical.len() as u64 + f.size).sum::<u64>();
    assert_eq!(report.total_bytes, expected);
    assert_eq!(fs::metadata(p.output()).unwrap().len(), expected);
}

#[test]
fn test_output_is_reproducible() {
    let p = Project::new(128);
    for n in ["zeta.bin", "alpha.bin", "mid/beta.bin", "Beta/gamma.bin"] {
        p.add(n, n.as_bytes());
    }
    let first = PackageBuilder::new(p.cfg.clone()).build().unwrap();
    let bytes_a = fs::read(p.output()).unwrap();
    let second = PackageBuilder::new(p.cfg.clone()).build().unwrap();
    let bytes_b = fs::read(p.output()).unwrap();

    assert_eq!(bytes_a, bytes_b);
    assert_eq!(first.digest, second.digest);

    let order: Vec<String> = read_records(&p.output()).into_iter().map(|r| r.1).collect();
    assert_eq!(
        order,
        ["/RGBLight.bin", "/Beta/gamma.bin", "/alpha.bin", "/mid/beta.bin", "/zeta.bin"]
    );
}

#[test]
fn test_missing_firmware_leaves_no_output() {
    let p = Project::new(16);
    fs::remove_file(&p.cfg.firmware_path).unwrap();

    let err = PackageBuilder::new(p.cfg.clone()).build().unwrap_err();
    assert!(matches!(err, PackError::FirmwareNotFound(_)));
    assert!(!p.output().exists());
    // Nothing staged in the output directory either.
    assert_eq!(fs::read_dir(p.root.path().join("build")).unwrap().count(), 0);
}

#[test]
fn test_truncated_package_is_flagged() {
    let p = Project::new(512);
    p.add("a.bin", &[3u8; 50]);
    PackageBuilder::new(p.cfg.clone()).build().unwrap();

    let bytes = fs::read(p.output()).unwrap();
    let report = scan(&bytes[..bytes.len() - 20], ScanOptions::default()).unwrap();
    assert_eq!(report.completeness, Completeness::Truncated { declared: 2, found: 1 });
}

#[test]
fn test_header_corruption_is_fatal() {
    let p = Project::new(32);
    PackageBuilder::new(p.cfg.clone()).build().unwrap();

    let mut bytes = fs::read(p.output()).unwrap();
    bytes[9] ^= 0x01;
    assert!(matches!(
        scan(&bytes[..], ScanOptions::default()),
        Err(DecodeError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_unpack_roundtrip() {
    let p = Project::new(200);
    p.add("icons/a.bin", b"icon").add("index.html", b"page");
    PackageBuilder::new(p.cfg.clone()).build().unwrap();

    let dest = p.root.path().join("unpacked");
    let summary = unpack_file(&p.output(), &dest).unwrap();
    assert_eq!(summary.written, 3);
    assert_eq!(fs::read(dest.join("RGBLight.bin")).unwrap(), fs::read(&p.cfg.firmware_path).unwrap());
    assert_eq!(fs::read(dest.join("icons").join("a.bin")).unwrap(), b"icon");
    assert_eq!(fs::read(dest.join("index.html")).unwrap(), b"page");
}

#[test]
fn test_writer_supports_all_operations() {
    let mut w = PackageWriter::new(Cursor::new(Vec::new())).unwrap();
    w.add_file(Operation::Add, "/new.bin", b"new").unwrap();
    w.add_file(Operation::Modify, "/cfg.json", b"{\"a\":1}").unwrap();
    w.add_delete("/old.bin").unwrap();
    let (header, cursor) = w.finalize(2).unwrap();
    assert_eq!(header, PackageHeader::new(2, 3));

    let bytes = cursor.into_inner();
    let report = scan(&bytes[..], ScanOptions { hashes: true }).unwrap();
    let ops: Vec<Operation> = report.records.iter().map(|r| r.operation).collect();
    assert_eq!(ops, [Operation::Add, Operation::Modify, Operation::Delete]);
    assert_eq!(report.version, 2);
    assert!(report.is_complete());
}
