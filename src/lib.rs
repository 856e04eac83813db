pub mod error;
pub mod header;
pub mod record;
pub mod path;
pub mod config;
pub mod io_stream;
pub mod builder;
pub mod verify;
pub mod extract;

pub use error::{DecodeError, PackError, PackResult, RecordError};
pub use header::{PackageHeader, HEADER_SIZE, MAGIC, VERSION};
pub use record::{Operation, RecordHeader, RECORD_MAGIC};
pub use config::BuildConfig;
pub use path::PathPolicy;
pub use io_stream::{PackageReader, PackageWriter, RecordEntry};
pub use builder::{BuildReport, PackageBuilder};
pub use verify::{scan_file, Completeness, ScanOptions, VerifyReport};
