//! High-level [`PackageBuilder`] — firmware image + resource directory → package.
//!
//! ```no_run
//! use upkg::builder::PackageBuilder;
//! use upkg::config::BuildConfig;
//!
//! let report = PackageBuilder::new(BuildConfig::default()).build()?;
//! println!("packed {} files", report.file_count);
//! # Ok::<(), upkg::PackError>(())
//! ```
//!
//! # Pipeline
//! 1. Plan: the firmware image must exist and every resource file is
//!    collected, stat'ed and sorted by logical path. Nothing is written yet,
//!    so a missing input never leaves output behind.
//! 2. Stream every record into a temporary file inside the output directory.
//! 3. Patch the header, sync, and atomically rename over the final path.
//!
//! Any error before the rename drops the temporary file.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::error::{PackError, PackResult, RecordError};
use crate::header::HEADER_SIZE;
use crate::io_stream::PackageWriter;
use crate::path::{logical_path, normalize_logical};
use crate::record::{Operation, RecordHeader, RECORD_OVERHEAD};

/// Output buffer size. Payloads are copied in 8 KiB steps regardless.
const WRITE_BUFFER: usize = 64 * 1024;

// ── Plan ──────────────────────────────────────────────────────────────────────

/// One file scheduled for packing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub source:  PathBuf,
    pub logical: String,
    pub size:    u64,
}

impl InputFile {
    /// Bytes this file occupies in the package, record header included.
    pub fn record_len(&self) -> u64 {
        RECORD_OVERHEAD + self.logical.len() as u64 + self.size
    }
}

/// Everything that will go into the package, in write order.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub firmware:  InputFile,
    pub resources: Vec<InputFile>,
}

impl BuildPlan {
    pub fn inputs(&self) -> impl Iterator<Item = &InputFile> {
        std::iter::once(&self.firmware).chain(self.resources.iter())
    }

    pub fn file_count(&self) -> usize {
        1 + self.resources.len()
    }

    /// Exact size of the package this plan produces.
    pub fn package_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.inputs().map(InputFile::record_len).sum::<u64>()
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

/// Summary of a finished build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub package:     PathBuf,
    pub version:     u32,
    pub file_count:  u32,
    pub total_bytes: u64,
    pub crc32:       u32,
    /// BLAKE3 of the complete package, hex.
    pub digest:      String,
    /// Unix seconds.
    pub built_at:    i64,
    pub files:       Vec<InputFile>,
}

impl BuildReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> PackResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct PackageBuilder {
    config: BuildConfig,
}

impl PackageBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig { &self.config }

    /// Validate inputs and decide the record order without writing anything.
    pub fn plan(&self) -> PackResult<BuildPlan> {
        let firmware = self.firmware_input()?;
        let resources = self.scan_resources()?;

        let mut seen = std::collections::HashSet::new();
        seen.insert(firmware.logical.as_str());
        for r in &resources {
            if !seen.insert(r.logical.as_str()) {
                return Err(PackError::DuplicatePath(r.logical.clone()));
            }
        }
        if u32::try_from(1 + resources.len()).is_err() {
            return Err(RecordError::TooManyRecords.into());
        }

        Ok(BuildPlan { firmware, resources })
    }

    /// Run the whole pipeline and move the package into place.
    pub fn build(&self) -> PackResult<BuildReport> {
        let plan = self.plan()?;
        let output = self.config.output_path();

        fs::create_dir_all(&self.config.output_dir)?;
        let tmp = staging_file(&self.config.output_dir)?;
        debug!("Staging package in {}", tmp.path().display());

        let mut writer = PackageWriter::new(BufWriter::with_capacity(WRITE_BUFFER, tmp))?;
        for input in plan.inputs() {
            let src = File::open(&input.source)?;
            writer.add_reader(Operation::Add, &input.logical, input.size, src)?;
            info!(size = input.size, "Add {} -> {}", input.source.display(), input.logical);
        }

        let (header, buffered) = writer.finalize(self.config.version)?;
        let tmp = buffered.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        let file = tmp.persist(&output)?;

        let total_bytes = file.metadata()?.len();
        debug_assert_eq!(total_bytes, plan.package_len());
        drop(file);
        let digest = digest_file(&output)?;

        info!(
            file_count = header.file_count,
            total_bytes,
            "Upgrade package {} written",
            output.display()
        );

        let BuildPlan { firmware, resources } = plan;
        let mut files = Vec::with_capacity(resources.len() + 1);
        files.push(firmware);
        files.extend(resources);

        Ok(BuildReport {
            package: output,
            version: header.version,
            file_count: header.file_count,
            total_bytes,
            crc32: header.crc32(),
            digest,
            built_at: Utc::now().timestamp(),
            files,
        })
    }

    fn firmware_input(&self) -> PackResult<InputFile> {
        let path = &self.config.firmware_path;
        let meta = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(PackError::FirmwareNotFound(path.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PackError::FirmwareNotFound(path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        checked_input(path.clone(), normalize_logical(&self.config.firmware_name), meta.len())
    }

    fn scan_resources(&self) -> PackResult<Vec<InputFile>> {
        let dir = &self.config.data_dir;
        if !dir.is_dir() {
            if self.config.require_data_dir {
                return Err(PackError::ResourceDirNotFound(dir.clone()));
            }
            warn!("Resource directory {} not found, packing firmware only", dir.display());
            return Ok(Vec::new());
        }

        let mut found: Vec<(String, PathBuf)> = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let logical = logical_path(dir, entry.path(), self.config.path_policy)?;
            found.push((logical, entry.into_path()));
        }
        debug!("Found {} resource file(s) under {}", found.len(), dir.display());

        // Directory listing order is platform dependent; sort for reproducible output.
        found.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        stat_inputs(found)
    }
}

/// Reject anything the record encoder would refuse, before output exists.
fn checked_input(source: PathBuf, logical: String, size: u64) -> PackResult<InputFile> {
    RecordHeader::new(Operation::Add, &logical, size)?;
    Ok(InputFile { source, logical, size })
}

/// Temporary file next to the final package. On unix it is opened with mode
/// 0666 so the umask decides the package's permissions, as for a plain
/// `File::create`.
fn staging_file(dir: &Path) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".upkg");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

fn stat_one((logical, source): (String, PathBuf)) -> PackResult<InputFile> {
    let size = fs::metadata(&source)?.len();
    checked_input(source, logical, size)
}

fn stat_inputs(found: Vec<(String, PathBuf)>) -> PackResult<Vec<InputFile>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        // Indexed collect keeps the sorted order.
        found.into_par_iter().map(stat_one).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        found.into_iter().map(stat_one).collect()
    }
}

/// BLAKE3 of a whole file, hex.
pub fn digest_file(path: &Path) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut BufReader::new(File::open(path)?), &mut hasher)?;
    Ok(hex::encode(hasher.finalize().as_bytes()))
}
