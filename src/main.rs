use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use discon_wrapper::error::STATUS_OK;
use discon_wrapper::{logging, DebugLevel, LoadOptions, Registry, RegistryConfig};

/// Check that a DISCON controller library loads and exports its entry point
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the controller shared library
    library: PathBuf,

    /// Name of the exported entry point
    #[arg(short, long = "proc", default_value = "DISCON")]
    proc_name: String,

    /// Connection id to load into
    #[arg(long, default_value_t = 0)]
    conn: i32,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug level: 0=warnings, 1=basic info, 2=verbose
    #[arg(short, long)]
    debug: Option<u8>,

    /// Open the library file directly instead of a private copy
    #[arg(long)]
    no_isolate: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        RegistryConfig::load_from_file(config_path)?
    } else {
        RegistryConfig::load_default()?
    };

    if let Some(level) = args.debug {
        config.debug_level = DebugLevel::try_from(level).map_err(anyhow::Error::msg)?;
    }
    logging::init(config.debug_level)?;

    let registry = Registry::native(&config);
    let options = LoadOptions {
        isolate: config.isolate_instances && !args.no_isolate,
    };

    let status = match registry.load_with(args.conn, &args.library, &args.proc_name, options) {
        Ok(()) => {
            let info = registry.describe(args.conn);
            println!(
                "{}: {} resolved on connection {}",
                args.library.display(),
                args.proc_name,
                args.conn
            );
            if let Some(copy) = info.and_then(|info| info.loaded_from) {
                println!("loaded from private copy {}", copy.display());
            }
            registry.unload(args.conn)?;
            STATUS_OK
        }
        Err(e) => {
            eprintln!("Error: {e}");
            e.status_code()
        }
    };

    Ok(ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX)))
}
