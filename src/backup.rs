//! Program backups as JSON files
//!
//! A backup holds the programs of all slots:
//!
//! ```json
//! { "programs": { "1": { "channel": 1, "pads": [...], "knobs": [...] }, ... } }
//! ```
//!
//! Single programs are stored as the bare program object.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::program::Program;

/// Programs of all device slots, keyed by slot number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub programs: BTreeMap<u8, Program>,
}

impl Backup {
    /// Save backup to JSON file
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self).await
    }

    /// Load backup from JSON file
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let backup: Backup = read_json(path).await?;
        debug!(
            "Backup loaded from {} ({} programs)",
            path.display(),
            backup.programs.len()
        );
        Ok(backup)
    }
}

/// Load a single program from JSON file.
///
/// The program is not validated here.
pub async fn load_program(path: impl AsRef<Path>) -> Result<Program> {
    read_json(path.as_ref()).await
}

/// Render a program as pretty-printed JSON
pub fn program_to_json(program: &Program) -> Result<String> {
    serde_json::to_string_pretty(program).context("Failed to serialize program")
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize backup")?;
    fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
