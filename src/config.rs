// src/config.rs

use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::error::{TableError, TableResult};

/// What to do when the backup for this second already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupCollision {
    /// Refuse the update with `TableError::FileConflict`.
    #[default]
    Fail,
    /// Truncate the earlier backup and write a fresh snapshot.
    Overwrite,
    /// Append the new snapshot after the existing backup content.
    Append,
}

/// On-disk layout and behavior knobs.
///
/// Backups land in `<data dir>/<backup_dir>/<timestamp>/<file>` and staging
/// files in `<data dir>/<staging_dir>/<file>`, where `<data dir>` is the
/// directory holding the table file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup_dir: String,
    pub staging_dir: String,
    pub on_backup_collision: BackupCollision,
    pub strict_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_dir: "bc".to_string(),
            staging_dir: "tmp".to_string(),
            on_backup_collision: BackupCollision::Fail,
            strict_headers: false,
        }
    }
}

impl Config {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TableResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(TableError::io("opening config", path))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| TableError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the file named by `ROWKEEPER_CONFIG`, or fall back to defaults.
    pub fn from_env() -> TableResult<Self> {
        match std::env::var_os("ROWKEEPER_CONFIG") {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
