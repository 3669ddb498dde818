//! CSV export and legacy JSON import

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::tally::TallyStore;

pub const CSV_HEADER: &str = "barcode,qty";

/// Result of an export request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Nothing to export; no file written
    Empty,
    Written { path: PathBuf, entries: usize },
}

/// Quote a field containing a comma, quote or line break
pub fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the tally as CSV, ordered by code
pub fn to_csv(entries: &BTreeMap<String, u64>) -> String {
    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for (code, quantity) in entries {
        lines.push(format!("{},{}", csv_escape(code), quantity));
    }
    lines.join("\n")
}

/// File name for an export taken at `at`
pub fn export_file_name(at: DateTime<Utc>) -> String {
    format!("inventory_{}.csv", at.format("%Y-%m-%dT%H%M%S%3fZ"))
}

/// Write the current tally into `dir`
pub fn export_to_dir(store: &TallyStore, dir: &Path) -> Result<ExportOutcome> {
    let entries = store.get().context("Failed to read tally")?;
    if entries.is_empty() {
        info!("Export skipped, tally is empty");
        return Ok(ExportOutcome::Empty);
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
    let path = dir.join(export_file_name(Utc::now()));
    std::fs::write(&path, to_csv(&entries))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Exported {} entries to {:?}", entries.len(), path);
    Ok(ExportOutcome::Written {
        path,
        entries: entries.len(),
    })
}

/// Merge a JSON object of `{ "code": quantity }` into the store.
///
/// Entries with an empty code or a quantity that is not a positive integer
/// are skipped. Returns the number of entries merged.
pub fn import_legacy_json(store: &TallyStore, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON object", path.display()))?;

    let mut accepted = Vec::new();
    for (code, value) in &parsed {
        let code = code.trim();
        let quantity = value
            .as_u64()
            .and_then(|q| u32::try_from(q).ok())
            .and_then(NonZeroU32::new);
        match quantity {
            Some(quantity) if !code.is_empty() => accepted.push((code, quantity)),
            _ => warn!("Skipping legacy entry {:?} = {}", code, value),
        }
    }

    let merged = store
        .merge(accepted.iter().map(|(code, q)| (*code, *q)))
        .context("Failed to merge legacy tally")?;
    info!("Imported {} of {} legacy entries", merged, parsed.len());
    Ok(merged)
}
