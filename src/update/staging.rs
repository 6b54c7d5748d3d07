// src/update/staging.rs

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::error::{TableError, TableResult};

/// Line terminator for everything we write.
pub const LINE_END: &str = "\r\n";

/// Buffered writer that terminates every line with CRLF and syncs on finish.
pub(crate) struct LineWriter {
    path: PathBuf,
    inner: BufWriter<File>,
}

impl LineWriter {
    pub fn new(path: impl Into<PathBuf>, file: File) -> Self {
        Self {
            path: path.into(),
            inner: BufWriter::new(file),
        }
    }

    /// Create the staging file at `path`, discarding any leftover from an
    /// interrupted run first.
    pub fn fresh(path: impl Into<PathBuf>) -> TableResult<Self> {
        let path = path.into();
        remove_stale(&path)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(TableError::io("creating staging file", &path))?;
        Ok(Self::new(path, file))
    }

    /// Write `line` verbatim followed by CRLF.
    pub fn push_line(&mut self, line: &[u8]) -> TableResult<()> {
        self.inner
            .write_all(line)
            .and_then(|_| self.inner.write_all(LINE_END.as_bytes()))
            .map_err(TableError::io("writing", &self.path))
    }

    /// Flush and fsync; nothing is renamed until this has succeeded.
    pub fn finish(self) -> TableResult<PathBuf> {
        let Self { path, inner } = self;
        let file = inner
            .into_inner()
            .map_err(|e| TableError::io("flushing", &path)(e.into_error()))?;
        file.sync_all().map_err(TableError::io("syncing", &path))?;
        Ok(path)
    }
}

/// Delete a staging file left behind by a previous failed run.
pub(crate) fn remove_stale(path: &Path) -> TableResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale staging file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TableError::io("removing stale staging file", path)(e)),
    }
}

/// Rename `staged` over `dest`. Readers of `dest` see the old or the new
/// content, never a mix.
pub(crate) fn replace(staged: &Path, dest: &Path) -> TableResult<()> {
    fs::rename(staged, dest).map_err(TableError::io("renaming staged file over", dest))?;
    // Best-effort: persist the directory entry; the file is already in place.
    if let Some(dir) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            debug!(dir = %dir.display(), "directory sync skipped: {}", e);
        }
    }
    Ok(())
}
