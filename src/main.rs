//! shelf-tally - Point-of-scan inventory tally
//!
//! Reads barcodes from a fixed guide region of a camera feed, asks the
//! operator for a quantity, and keeps a persistent per-code tally that can
//! be exported as CSV.

mod app;
mod capture;
mod config;
mod prompt;
mod scan;
mod shared;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::num::NonZeroU32;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::{AppPaths, ShelfTallyApp};
use crate::config::{AppConfig, PipelineProfile};

/// shelf-tally - barcode inventory counting
#[derive(Parser, Debug)]
#[command(name = "shelf-tally")]
#[command(about = "Scan barcodes, confirm quantities, export a CSV tally")]
struct Args {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tally database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Directory of images replayed as the camera feed
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Camera pipeline profile
    #[arg(long, value_enum)]
    profile: Option<PipelineProfile>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive scanning console (default)
    Scan,
    /// Print the tally
    List,
    /// Add a quantity to a code
    Add { code: String, quantity: NonZeroU32 },
    /// Remove every entry
    Clear {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Write the tally as CSV
    Export {
        /// Output directory (overrides the configured export directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Merge a legacy `{ "code": qty }` JSON file into the tally
    ImportJson { file: PathBuf },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout belongs to the console
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(Command::InitConfig { force }) = args.command {
        return init_config(args.config, force);
    }

    let mut config = load_config(args.config.as_ref())?;
    if let Some(profile) = args.profile {
        config.capture.profile = profile;
    }
    let paths = resolve_paths(&config, &args)?;

    match args.command.unwrap_or(Command::Scan) {
        Command::Scan => {
            info!("shelf-tally starting...");
            let app = ShelfTallyApp::new(&config, &paths)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to build async runtime")?;
            runtime.block_on(app.run_console())?;
            info!("shelf-tally shutdown complete");
        }
        Command::List => app::print_tally(&app::open_tally(&paths.database)?)?,
        Command::Add { code, quantity } => {
            let code = code.trim();
            if code.is_empty() {
                anyhow::bail!("Barcode must not be empty");
            }
            let total = app::open_tally(&paths.database)?.add(code, quantity)?;
            println!("{code}: {total}");
        }
        Command::Clear { yes } => {
            if !yes && !confirm("Clear all entries? [y/N]")? {
                println!("Clear aborted");
                return Ok(());
            }
            let removed = app::open_tally(&paths.database)?.clear()?;
            println!("Cleared {removed} entries");
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or(paths.export_dir);
            let tally = app::open_tally(&paths.database)?;
            app::report_export(storage::export_to_dir(&tally, &dir)?);
        }
        Command::ImportJson { file } => {
            let tally = app::open_tally(&paths.database)?;
            let merged = storage::import_legacy_json(&tally, &file)?;
            println!("Imported {merged} entries from {}", file.display());
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

/// Load configuration from the given file or the platform default location
fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let path = storage::get_config_dir()?.join("config.toml");
            let config = config::load_or_default(&path)?;
            info!("Using configuration {:?}", path);
            Ok(config)
        }
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => storage::get_config_dir()?.join("config.toml"),
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
    }
    config::save_config(&AppConfig::default(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// CLI flags win over the config file; unset paths use the data directory
fn resolve_paths(config: &AppConfig, args: &Args) -> Result<AppPaths> {
    let database = match args.db.clone().or_else(|| config.storage.database.clone()) {
        Some(path) => path,
        None => storage::default_database_path()?,
    };
    let export_dir = match config.storage.export_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let frames_dir = match args.frames.clone().or_else(|| config.capture.frames_dir.clone()) {
        Some(dir) => dir,
        None => storage::get_data_dir()?.join("frames"),
    };

    Ok(AppPaths {
        database,
        export_dir,
        frames_dir,
    })
}

fn confirm(question: &str) -> Result<bool> {
    println!("{question}");
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
