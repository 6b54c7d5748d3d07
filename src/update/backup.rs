// src/update/backup.rs

use chrono::{DateTime, NaiveDateTime, Utc};
use glob::{glob, Pattern};
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use super::split_path;
use crate::config::{BackupCollision, Config};
use crate::error::{TableError, TableResult};

/// Backup directory names: UTC, one-second resolution, no colons.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// One snapshot of a table file taken before an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub taken_at: DateTime<Utc>,
    pub path: PathBuf,
}

/// Directory name for a backup taken at `at`, e.g. `2024-05-01T12-34-56`.
pub fn stamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Inverse of [`stamp`].
pub fn parse_stamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// `<data dir>/<backup_dir>/<stamp>/<file name>`
pub(crate) fn backup_path(
    data_dir: &Path,
    file_name: &std::ffi::OsStr,
    config: &Config,
    at: DateTime<Utc>,
) -> PathBuf {
    data_dir
        .join(&config.backup_dir)
        .join(stamp(at))
        .join(file_name)
}

/// A snapshot being written next to its final name.
///
/// Content goes to `<file>.partial` in the timestamp directory; [`publish`]
/// moves it into place under the collision policy. Dropped unpublished (an
/// update that failed part way), the partial file is deleted, so
/// [`list_backups`] never offers a truncated snapshot.
///
/// [`publish`]: PendingBackup::publish
pub(crate) struct PendingBackup {
    path: PathBuf,
    partial: PathBuf,
    policy: BackupCollision,
    published: bool,
}

impl PendingBackup {
    /// Check the policy up front and create the partial file.
    pub fn begin(path: PathBuf, policy: BackupCollision) -> TableResult<(Self, File)> {
        if policy == BackupCollision::Fail && path.exists() {
            return Err(TableError::FileConflict { path });
        }
        let mut partial_name = path.file_name().unwrap_or_default().to_os_string();
        partial_name.push(".partial");
        let partial = path.with_file_name(partial_name);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial)
            .map_err(TableError::io("creating backup", &partial))?;
        Ok((
            Self {
                path,
                partial,
                policy,
                published: false,
            },
            file,
        ))
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    /// Move the finished snapshot to its final name. The partial file must
    /// already be synced.
    pub fn publish(mut self) -> TableResult<PathBuf> {
        match self.policy {
            BackupCollision::Fail => {
                // Checked again: only this process writes here, but time has
                // passed since `begin`.
                if self.path.exists() {
                    return Err(TableError::FileConflict {
                        path: self.path.clone(),
                    });
                }
                fs::rename(&self.partial, &self.path)
                    .map_err(TableError::io("publishing backup", &self.path))?;
            }
            BackupCollision::Overwrite => {
                fs::rename(&self.partial, &self.path)
                    .map_err(TableError::io("publishing backup", &self.path))?;
            }
            BackupCollision::Append => {
                let mut src = File::open(&self.partial)
                    .map_err(TableError::io("opening", &self.partial))?;
                let mut dst = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&self.path)
                    .map_err(TableError::io("opening backup", &self.path))?;
                io::copy(&mut src, &mut dst)
                    .and_then(|_| dst.sync_all())
                    .map_err(TableError::io("appending backup", &self.path))?;
                fs::remove_file(&self.partial)
                    .map_err(TableError::io("removing", &self.partial))?;
            }
        }
        self.published = true;
        Ok(self.path.clone())
    }
}

impl Drop for PendingBackup {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        if let Err(e) = fs::remove_file(&self.partial) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.partial.display(), "cannot remove partial backup: {}", e);
            }
        }
    }
}

/// Every backup of `path` under the configured backup directory, oldest first.
///
/// Timestamp directories whose names don't parse are skipped.
pub fn list_backups<P: AsRef<Path>>(path: P, config: &Config) -> TableResult<Vec<Backup>> {
    let (data_dir, file_name) = split_path(path.as_ref())?;
    let root = data_dir.join(&config.backup_dir);
    let pattern = format!(
        "{}/*/{}",
        Pattern::escape(&root.to_string_lossy()),
        Pattern::escape(&file_name.to_string_lossy())
    );

    let mut backups = Vec::new();
    for entry in glob(&pattern)? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!("cannot read backup entry: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let taken_at = match path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .and_then(parse_stamp)
        {
            Some(t) => t,
            None => continue,
        };
        backups.push(Backup { taken_at, path });
    }
    backups.sort_by_key(|b| b.taken_at);
    debug!(count = backups.len(), root = %root.display(), "listed backups");
    Ok(backups)
}

/// Find the backup whose directory name is exactly `stamp`.
pub fn find_backup<P: AsRef<Path>>(
    path: P,
    config: &Config,
    stamp: &str,
) -> TableResult<Option<Backup>> {
    let wanted = match parse_stamp(stamp) {
        Some(t) => t,
        None => return Ok(None),
    };
    Ok(list_backups(path, config)?
        .into_iter()
        .find(|b| b.taken_at == wanted))
}

pub(crate) fn ensure_dir(dir: &Path) -> TableResult<()> {
    fs::create_dir_all(dir).map_err(TableError::io("creating directory", dir))
}
