//! Build configuration.
//!
//! Every field has a default matching the firmware project layout the packer
//! was written for, so an empty JSON object (or no config file at all) packs
//! `./build/RGBLight.ino.bin` and `./data/` into `./build/upgrade.bin`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PackResult;
use crate::header::VERSION;
use crate::path::PathPolicy;

pub const DEFAULT_FIRMWARE_PATH: &str = "./build/RGBLight.ino.bin";
pub const DEFAULT_FIRMWARE_NAME: &str = "/RGBLight.bin";
pub const DEFAULT_DATA_DIR:      &str = "./data";
pub const DEFAULT_OUTPUT_DIR:    &str = "./build";
pub const DEFAULT_PACKAGE_NAME:  &str = "upgrade.bin";

/// Configuration for [`PackageBuilder`](crate::builder::PackageBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Compiled firmware image. Must exist.
    pub firmware_path: PathBuf,
    /// Device path the firmware record is written under.
    pub firmware_name: String,
    /// Resource directory; every regular file below it is packed.
    pub data_dir:      PathBuf,
    /// Fail instead of packing firmware only when `data_dir` is missing.
    pub require_data_dir: bool,
    pub output_dir:    PathBuf,
    pub package_name:  String,
    /// Written into the package header.
    pub version:       u32,
    pub path_policy:   PathPolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            firmware_path:    PathBuf::from(DEFAULT_FIRMWARE_PATH),
            firmware_name:    DEFAULT_FIRMWARE_NAME.to_owned(),
            data_dir:         PathBuf::from(DEFAULT_DATA_DIR),
            require_data_dir: false,
            output_dir:       PathBuf::from(DEFAULT_OUTPUT_DIR),
            package_name:     DEFAULT_PACKAGE_NAME.to_owned(),
            version:          VERSION,
            path_policy:      PathPolicy::default(),
        }
    }
}

impl BuildConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> PackResult<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.package_name)
    }
}
