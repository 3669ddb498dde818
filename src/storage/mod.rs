//! Storage Layer
//!
//! Persists the tally in SQLite and exports it as CSV.

pub mod export;
pub mod tally;

pub use export::{export_to_dir, import_legacy_json, ExportOutcome};
pub use tally::{StorageError, TallyStore};

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "shelftally", "ShelfTally")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of the tally database
pub fn default_database_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("tally.db"))
}
