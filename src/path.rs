//! Host path → logical device path.
//!
//! Logical paths are absolute and use `/` regardless of host separators:
//! `data/icons/a.bin` under resource dir `data` becomes `/icons/a.bin`.

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::error::{PackError, PackResult};

/// What to do with file names that are not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathPolicy {
    /// Drop the offending byte sequences and keep going.
    #[default]
    Lossy,
    /// Fail the build with [`PackError::InvalidPath`].
    Strict,
}

/// Derive the logical path of `file` relative to `root`.
pub fn logical_path(root: &Path, file: &Path, policy: PathPolicy) -> PackResult<String> {
    let rel = file
        .strip_prefix(root)
        .map_err(|_| PackError::Outside(file.to_path_buf()))?;

    let mut out = String::new();
    for comp in rel.components() {
        let Component::Normal(name) = comp else { continue };
        let name = component_str(name, policy, file)?;
        out.push('/');
        out.push_str(&name.replace('\\', "/"));
    }

    if out.is_empty() {
        return Err(PackError::InvalidPath(file.to_string_lossy().into_owned()));
    }
    Ok(out)
}

/// Normalize a configured logical name: forward slashes, one leading `/`.
pub fn normalize_logical(name: &str) -> String {
    let name = name.replace('\\', "/");
    format!("/{}", name.trim_start_matches('/'))
}

/// Resolve where a logical path lands under `dest` when unpacking.
///
/// Rejects anything that could escape `dest` (`..`, empty names, `.`).
pub fn unpack_target(dest: &Path, logical: &str) -> PackResult<PathBuf> {
    let mut out = dest.to_path_buf();
    let mut parts = 0;
    for part in logical.trim_start_matches('/').split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains(':') {
            return Err(PackError::UnsafePath(logical.to_owned()));
        }
        out.push(part);
        parts += 1;
    }
    if parts == 0 {
        return Err(PackError::UnsafePath(logical.to_owned()));
    }
    Ok(out)
}

fn component_str(name: &OsStr, policy: PathPolicy, file: &Path) -> PackResult<String> {
    if let Some(s) = name.to_str() {
        return Ok(s.to_owned());
    }
    match policy {
        PathPolicy::Strict => Err(PackError::InvalidPath(file.to_string_lossy().into_owned())),
        PathPolicy::Lossy => {
            let mut kept = String::new();
            for chunk in name.as_encoded_bytes().utf8_chunks() {
                kept.push_str(chunk.valid());
            }
            if kept.is_empty() {
                return Err(PackError::InvalidPath(file.to_string_lossy().into_owned()));
            }
            warn!("Dropped non-UTF-8 bytes from {} -> {kept}", file.display());
            Ok(kept)
        }
    }
}
