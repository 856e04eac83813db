use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use upkg::builder::PackageBuilder;
use upkg::config::BuildConfig;
use upkg::extract::unpack_file;
use upkg::io_stream::PackageReader;
use upkg::verify::{scan_file, ScanOptions};
use upkg::{PackError, PathPolicy};

#[derive(Parser)]
#[command(name = "upkg", version, about = "Build and inspect UPKG over-the-air upgrade packages")]
struct Cli {
    /// Log debug detail (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack the firmware image and resource directory into an upgrade package
    Build {
        /// Compiled firmware image (post-build hooks pass the artifact here)
        firmware: Option<PathBuf>,
        /// JSON config file; flags below override its fields
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Package file name inside the output directory
        #[arg(short, long)]
        name: Option<String>,
        /// Device path for the firmware record
        #[arg(long)]
        firmware_name: Option<String>,
        /// Header version field
        #[arg(long)]
        format_version: Option<u32>,
        /// Fail on file names that are not valid UTF-8 instead of dropping bytes
        #[arg(long)]
        strict_paths: bool,
        /// Also write a JSON build report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List records in a package
    List {
        input: PathBuf,
        /// Show a BLAKE3 digest of every payload
        #[arg(long)]
        hashes: bool,
    },
    /// Check header checksum and record framing end to end
    Verify {
        input: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write ADD/MOD payloads into a directory
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Show the package header
    Info {
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(PackError::FirmwareNotFound(_)) = e.downcast_ref::<PackError>() {
                eprintln!("Build the firmware first, or pass the compiled image path: upkg build <FIRMWARE>");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns `Ok(false)` when the command ran but the package failed a check.
fn run(command: Commands) -> Result<bool, Box<dyn std::error::Error>> {
    match command {

        // ── Build ────────────────────────────────────────────────────────────
        Commands::Build {
            firmware, config, data_dir, output_dir, name,
            firmware_name, format_version, strict_paths, report,
        } => {
            let mut cfg = match config {
                Some(path) => BuildConfig::load(path)?,
                None       => BuildConfig::default(),
            };
            if let Some(v) = firmware       { cfg.firmware_path = v; }
            if let Some(v) = data_dir       { cfg.data_dir = v; }
            if let Some(v) = output_dir     { cfg.output_dir = v; }
            if let Some(v) = name           { cfg.package_name = v; }
            if let Some(v) = firmware_name  { cfg.firmware_name = v; }
            if let Some(v) = format_version { cfg.version = v; }
            if strict_paths                 { cfg.path_policy = PathPolicy::Strict; }

            let result = PackageBuilder::new(cfg).build()?;
            if let Some(path) = report {
                result.write_json(&path)?;
            }
            println!(
                "Upgrade package {} done, file count: {}",
                result.package.display(), result.file_count
            );
            Ok(true)
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, hashes } => {
            let report = scan_file(&input, ScanOptions { hashes })?;
            println!("Package: {}", input.display());
            println!("{:<4} {:>10} {:>12}  Path", "Op", "Offset", "Size");
            for r in &report.records {
                print!("{:<4} {:>10} {:>12}  {}", r.operation.name(), r.offset, r.size, r.path);
                match &r.digest {
                    Some(d) => println!("  {}", &d[..16]),
                    None    => println!(),
                }
            }
            if !report.is_complete() {
                eprintln!("{}", report.summary());
            }
            Ok(report.is_complete())
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input, json } => {
            let report = scan_file(&input, ScanOptions::default())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
            Ok(report.is_complete())
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir } => {
            let summary = unpack_file(&input, &output_dir)?;
            println!(
                "Unpacked {} file(s), {} bytes to {} ({} delete record(s) skipped)",
                summary.written, summary.bytes, output_dir.display(), summary.deleted
            );
            Ok(true)
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let f   = File::open(&input)?;
            let len = f.metadata()?.len();
            let hdr = PackageReader::new(BufReader::new(f))?.header;

            println!("── UPKG Package ─────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Size           {} B", len);
            println!("  Format version {}", hdr.version);
            println!("  Files          {}", hdr.file_count);
            println!("  Header CRC32   {:#010x}", hdr.crc32());
            println!("  Header bytes   {}", hex::encode(hdr.encode()));
            Ok(true)
        }
    }
}
