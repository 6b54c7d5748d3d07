// src/update/mod.rs

pub mod backup;
mod clock;
mod staging;

pub use backup::{find_backup, list_backups, Backup, TIMESTAMP_FORMAT};
pub use clock::{Clock, SystemClock};
pub use staging::LINE_END;

use std::{
    ffi::OsStr,
    fs::{self, File},
    io::{self, BufReader},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{TableError, TableResult};
use crate::lines::RawLines;
use backup::PendingBackup;
use staging::LineWriter;

/// What an update or restore did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Snapshot of the file as it was before this call.
    pub backup: PathBuf,
    /// Lines read from the original file.
    pub lines_read: usize,
    /// The new line went past the end instead of replacing one.
    pub appended: bool,
}

/// Rewrites table files in place, keeping a timestamped backup of each prior
/// state.
///
/// Not safe to run against the same file from two callers at once.
#[derive(Debug, Clone)]
pub struct Updater<C = SystemClock> {
    config: Config,
    clock: C,
}

impl Updater<SystemClock> {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for Updater<SystemClock> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<C: Clock> Updater<C> {
    pub fn with_clock(config: Config, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace line `row_index` of `path` with `new_row_text`.
    ///
    /// `row_index` counts file lines from 0, so 0 is the header line and is
    /// replaced like any other. If `row_index` is at or past the number of
    /// lines in the file, `new_row_text` is appended as a new last line
    /// instead; this one path covers both "add a row" and "index past the end".
    ///
    /// Steps:
    /// 1. create the backup and staging directories if needed
    /// 2. discard any stale staging file from an interrupted run
    /// 3. stream the original once, copying each line verbatim to the backup
    ///    and the (possibly substituted) line to the staging file
    /// 4. append `new_row_text` if no line was substituted
    /// 5. sync both files, then rename the staging file over `path`
    ///
    /// Lines may end in `\r\n`, `\n` or a bare `\r`; their bytes are copied
    /// as-is, whatever the encoding. Every line is written with a CRLF
    /// terminator. The backup only appears under its final name once it is
    /// complete. The rename is the only mutation of `path`, so a failure
    /// anywhere before it leaves the original untouched.
    #[instrument(level = "info", skip(self, path, new_row_text), fields(path = %path.as_ref().display()))]
    pub fn update<P: AsRef<Path>>(
        &self,
        path: P,
        row_index: usize,
        new_row_text: &str,
    ) -> TableResult<UpdateOutcome> {
        if new_row_text.contains(['\r', '\n']) {
            return Err(TableError::InvalidRow);
        }
        let path = path.as_ref();
        let source = open_source(path)?;
        let plan = self.plan(path)?;
        let mut session = plan.begin(&self.config)?;

        let mut lines_read = 0;
        for line in source {
            let line = line.map_err(TableError::io("reading", path))?;
            session.backup.push_line(&line)?;
            if lines_read == row_index {
                session.staging.push_line(new_row_text.as_bytes())?;
            } else {
                session.staging.push_line(&line)?;
            }
            lines_read += 1;
        }

        let appended = row_index >= lines_read;
        if appended {
            session.staging.push_line(new_row_text.as_bytes())?;
        }

        let backup = session.commit(path)?;
        info!(
            row_index,
            lines_read,
            appended,
            backup = %backup.display(),
            "row written"
        );
        Ok(UpdateOutcome {
            backup,
            lines_read,
            appended,
        })
    }

    /// Put the content of `from` back in place of `path`.
    ///
    /// The current file is snapshotted first, exactly as [`Updater::update`]
    /// does, so a restore can itself be undone.
    #[instrument(level = "info", skip(self, path, from), fields(path = %path.as_ref().display()))]
    pub fn restore<P: AsRef<Path>>(&self, path: P, from: &Backup) -> TableResult<UpdateOutcome> {
        let path = path.as_ref();
        let source = open_source(path)?;
        let snapshot = open_source(&from.path)?;
        let plan = self.plan(path)?;
        // This second's snapshot would land on the one we're restoring.
        if same_location(&plan.backup_path, &from.path) {
            return Err(TableError::FileConflict {
                path: plan.backup_path,
            });
        }
        let mut session = plan.begin(&self.config)?;

        let mut lines_read = 0;
        for line in source {
            let line = line.map_err(TableError::io("reading", path))?;
            session.backup.push_line(&line)?;
            lines_read += 1;
        }
        for line in snapshot {
            let line = line.map_err(TableError::io("reading", &from.path))?;
            session.staging.push_line(&line)?;
        }

        let backup = session.commit(path)?;
        info!(
            restored_from = %from.path.display(),
            backup = %backup.display(),
            "backup restored"
        );
        Ok(UpdateOutcome {
            backup,
            lines_read,
            appended: false,
        })
    }

    fn plan(&self, path: &Path) -> TableResult<Plan> {
        let (data_dir, file_name) = split_path(path)?;
        let backup_path =
            backup::backup_path(data_dir, file_name, &self.config, self.clock.now());
        let staging_path = data_dir.join(&self.config.staging_dir).join(file_name);
        Ok(Plan {
            backup_path,
            staging_path,
        })
    }
}

/// Where this call will write, before anything touches the disk.
struct Plan {
    backup_path: PathBuf,
    staging_path: PathBuf,
}

impl Plan {
    fn begin(self, config: &Config) -> TableResult<Session> {
        if let Some(dir) = self.backup_path.parent() {
            backup::ensure_dir(dir)?;
        }
        if let Some(dir) = self.staging_path.parent() {
            backup::ensure_dir(dir)?;
        }
        staging::remove_stale(&self.staging_path)?;

        let (pending, backup_file) =
            PendingBackup::begin(self.backup_path, config.on_backup_collision)?;
        let backup = LineWriter::new(pending.partial_path(), backup_file);
        let staging = LineWriter::fresh(&self.staging_path)?;
        debug!(
            backup = %pending.partial_path().display(),
            staging = %self.staging_path.display(),
            "update session started"
        );
        Ok(Session {
            pending,
            backup,
            staging,
        })
    }
}

struct Session {
    pending: PendingBackup,
    backup: LineWriter,
    staging: LineWriter,
}

impl Session {
    /// Sync and publish the backup, then sync the staging file and swap it
    /// into place.
    fn commit(self, dest: &Path) -> TableResult<PathBuf> {
        self.backup.finish()?;
        let backup = self.pending.publish()?;
        let staged = self.staging.finish()?;
        staging::replace(&staged, dest)?;
        Ok(backup)
    }
}

fn open_source(path: &Path) -> TableResult<RawLines<BufReader<File>>> {
    File::open(path)
        .map(|f| RawLines::new(BufReader::new(f)))
        .map_err(TableError::io("opening", path))
}

/// Whether `a` and `b` name the same file, however each path is spelled
/// (`./bc/..` vs `bc/..`, symlinked parents). A parent directory that does
/// not exist yet can't hold an existing file, so that compares unequal.
fn same_location(a: &Path, b: &Path) -> bool {
    let dir = |p: &Path| p.parent().and_then(|d| fs::canonicalize(d).ok());
    match (dir(a), dir(b)) {
        (Some(da), Some(db)) => da == db && a.file_name() == b.file_name(),
        _ => false,
    }
}

/// Directory holding `path` (`.` for bare file names) and its file name.
pub(crate) fn split_path(path: &Path) -> TableResult<(&Path, &OsStr)> {
    let file_name = path.file_name().ok_or_else(|| TableError::Io {
        action: "resolving",
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, file_name))
}

/// [`Updater::update`] with the default layout and the system clock.
pub fn update<P: AsRef<Path>>(
    path: P,
    row_index: usize,
    new_row_text: &str,
) -> TableResult<UpdateOutcome> {
    Updater::<SystemClock>::default().update(path, row_index, new_row_text)
}

/// [`Updater::restore`] with the default layout and the system clock.
pub fn restore<P: AsRef<Path>>(path: P, from: &Backup) -> TableResult<UpdateOutcome> {
    Updater::<SystemClock>::default().restore(path, from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupCollision;
    use crate::table::{load, serialize_row};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::fs;
    use tempfile::tempdir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    const SAMPLE: &str = "A,[G1]B,[G1]C\r\nfoo,1,2\r\nbar,3,4\r\n";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap()
    }

    fn updater_at(at: DateTime<Utc>) -> Updater<DateTime<Utc>> {
        Updater::with_clock(Config::default(), at)
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let path = dir.join("videos.csv");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_replace_body_row_and_backup() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);

        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());
        let before = load(&path).unwrap();

        let out = updater_at(t0())
            .update(&path, before.line_index(1), "bar,9,9")
            .unwrap();
        assert_eq!(out.lines_read, 3);
        assert!(!out.appended);
        assert_eq!(
            out.backup,
            tmp.path()
                .join("bc")
                .join("2024-05-01T12-34-56")
                .join("videos.csv")
        );

        let after = load(&path).unwrap();
        assert_eq!(after.header, before.header);
        assert_eq!(
            after.rows,
            vec![vec!["foo", "1", "2"], vec!["bar", "9", "9"]]
        );
        assert_eq!(fs::read_to_string(&out.backup).unwrap(), SAMPLE);
        // staging file was consumed by the rename
        assert!(!tmp.path().join("tmp").join("videos.csv").exists());
    }

    #[test]
    fn test_line_index_is_file_line() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());

        updater_at(t0()).update(&path, 1, "x,y,z").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "A,[G1]B,[G1]C\r\nx,y,z\r\nbar,3,4\r\n"
        );
    }

    #[test]
    fn test_row_zero_rewrites_header() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());

        updater_at(t0()).update(&path, 0, "[Meta]A,B,C").unwrap();
        let table = load(&path).unwrap();
        assert_eq!(table.header.columns, vec!["A", "B", "C"]);
        assert_eq!(table.header.groups[0].name, "Meta");
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_append_at_line_count() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());
        let table = load(&path).unwrap();
        let row = serialize_row(&["baz", "5", "6"]);

        let out = updater_at(t0())
            .update(&path, table.append_index(), &row)
            .unwrap();
        assert!(out.appended);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}baz,5,6\r\n", SAMPLE)
        );
    }

    #[test]
    fn test_index_far_past_end_appends_once() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());

        updater_at(t0()).update(&path, 99, "tail").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(content.ends_with("bar,3,4\r\ntail\r\n"));
    }

    #[test]
    fn test_update_is_idempotent() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());

        updater_at(t0()).update(&path, 2, "bar,7,7").unwrap();
        let once = fs::read(&path).unwrap();
        updater_at(t0() + Duration::seconds(1))
            .update(&path, 2, "bar,7,7")
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), once);
    }

    #[test]
    fn test_lf_source_is_normalized_to_crlf() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("unix.csv");
        fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();

        let out = updater_at(t0()).update(&path, 1, "5,6").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\r\n5,6\r\n3,4\r\n");
        let backup = fs::read_to_string(&out.backup).unwrap();
        assert_eq!(backup.lines().count(), 3);
        assert_eq!(backup, "a,b\r\n1,2\r\n3,4\r\n");
    }

    #[test]
    fn test_empty_file_gets_single_line() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("new.csv");
        fs::write(&path, "").unwrap();

        let out = updater_at(t0()).update(&path, 0, "[G]a,b").unwrap();
        assert_eq!(out.lines_read, 0);
        assert!(out.appended);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[G]a,b\r\n");
        assert_eq!(fs::read_to_string(&out.backup).unwrap(), "");
    }

    #[test]
    fn test_same_second_collision_fails_without_touching_source() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());
        let up = updater_at(t0());

        up.update(&path, 1, "first,0,0").unwrap();
        let after_first = fs::read(&path).unwrap();

        let err = up.update(&path, 1, "second,0,0").unwrap_err();
        assert!(matches!(err, TableError::FileConflict { .. }));
        assert_eq!(fs::read(&path).unwrap(), after_first);
        // the first snapshot survives
        let backup = tmp
            .path()
            .join("bc")
            .join("2024-05-01T12-34-56")
            .join("videos.csv");
        assert_eq!(fs::read_to_string(backup).unwrap(), SAMPLE);
    }

    #[test]
    fn test_same_second_collision_policies() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());

        let mut cfg = Config::default();
        cfg.on_backup_collision = BackupCollision::Append;
        let up = Updater::with_clock(cfg.clone(), t0());
        up.update(&path, 1, "x,0,0").unwrap();
        let out = up.update(&path, 1, "y,0,0").unwrap();
        let appended = fs::read_to_string(&out.backup).unwrap();
        assert_eq!(appended.lines().count(), 6);
        assert!(appended.starts_with(SAMPLE));

        cfg.on_backup_collision = BackupCollision::Overwrite;
        let up = Updater::with_clock(cfg, t0());
        let out = up.update(&path, 1, "z,0,0").unwrap();
        assert_eq!(
            fs::read_to_string(&out.backup).unwrap(),
            "A,[G1]B,[G1]C\r\ny,0,0\r\nbar,3,4\r\n"
        );
    }

    #[test]
    fn test_stale_staging_file_is_discarded() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());
        let stage_dir = tmp.path().join("tmp");
        fs::create_dir_all(&stage_dir).unwrap();
        fs::write(stage_dir.join("videos.csv"), "leftover\r\nfrom a crash\r\n").unwrap();

        updater_at(t0()).update(&path, 2, "bar,0,0").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("leftover"));
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_missing_source_creates_nothing() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("absent.csv");

        let err = updater_at(t0()).update(&path, 0, "a").unwrap_err();
        assert!(matches!(err, TableError::Io { action: "opening", .. }));
        assert!(!tmp.path().join("bc").exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_line_break_in_row_rejected() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());

        let err = updater_at(t0()).update(&path, 1, "a\nb").unwrap_err();
        assert!(matches!(err, TableError::InvalidRow));
        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE);
    }

    #[test]
    fn test_custom_layout_dirs() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());
        let cfg = Config {
            backup_dir: "snapshots".to_string(),
            staging_dir: ".staging".to_string(),
            ..Config::default()
        };

        let out = Updater::with_clock(cfg, t0())
            .update(&path, 1, "q,q,q")
            .unwrap();
        assert!(out.backup.starts_with(tmp.path().join("snapshots")));
        assert!(tmp.path().join(".staging").is_dir());
    }

    #[test]
    fn test_restore_round_trip() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());
        let cfg = Config::default();

        updater_at(t0()).update(&path, 1, "edited,0,0").unwrap();
        let backups = list_backups(&path, &cfg).unwrap();
        assert_eq!(backups.len(), 1);

        let out = updater_at(t0() + Duration::seconds(5))
            .restore(&path, &backups[0])
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE);
        assert_eq!(
            fs::read_to_string(&out.backup).unwrap(),
            "A,[G1]B,[G1]C\r\nedited,0,0\r\nbar,3,4\r\n"
        );
        assert_eq!(list_backups(&path, &cfg).unwrap().len(), 2);
    }

    #[test]
    fn test_restore_refuses_own_second() {
        let tmp = tempdir().unwrap();
        let path = write_sample(tmp.path());
        let mut cfg = Config::default();
        cfg.on_backup_collision = BackupCollision::Overwrite;
        let up = Updater::with_clock(cfg.clone(), t0());

        up.update(&path, 1, "edited,0,0").unwrap();
        let backup = list_backups(&path, &cfg).unwrap().remove(0);

        let err = up.restore(&path, &backup).unwrap_err();
        assert!(matches!(err, TableError::FileConflict { .. }));
        assert_eq!(fs::read_to_string(&backup.path).unwrap(), SAMPLE);
    }

    /// Switches the process working directory for the life of the guard.
    struct CwdGuard(PathBuf);

    impl CwdGuard {
        fn enter(dir: &Path) -> Self {
            let prev = std::env::current_dir().unwrap();
            std::env::set_current_dir(dir).unwrap();
            Self(prev)
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    #[test]
    fn test_restore_relative_path_in_same_second() {
        let tmp = tempdir().unwrap();
        write_sample(tmp.path());
        let _cwd = CwdGuard::enter(tmp.path());

        let mut cfg = Config::default();
        cfg.on_backup_collision = BackupCollision::Overwrite;
        let up = Updater::with_clock(cfg.clone(), t0());
        up.update("videos.csv", 1, "edited,0,0").unwrap();

        // listed as `bc/..`, planned as `./bc/..`
        let backup = list_backups("videos.csv", &cfg).unwrap().remove(0);
        let err = up.restore("videos.csv", &backup).unwrap_err();
        assert!(matches!(err, TableError::FileConflict { .. }));

        assert_eq!(
            fs::read_to_string(tmp.path().join("videos.csv")).unwrap(),
            "A,[G1]B,[G1]C\r\nedited,0,0\r\nbar,3,4\r\n"
        );
        let snapshot = tmp
            .path()
            .join("bc")
            .join("2024-05-01T12-34-56")
            .join("videos.csv");
        assert_eq!(fs::read_to_string(snapshot).unwrap(), SAMPLE);
    }

    #[test]
    fn test_cr_only_source_is_normalized_to_crlf() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("mac.csv");
        fs::write(&path, "a,b\r1,2\r3,4").unwrap();

        let out = updater_at(t0()).update(&path, 2, "5,6").unwrap();
        assert_eq!(out.lines_read, 3);
        assert!(!out.appended);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\r\n1,2\r\n5,6\r\n");
        assert_eq!(
            fs::read_to_string(&out.backup).unwrap(),
            "a,b\r\n1,2\r\n3,4\r\n"
        );
    }

    #[test]
    fn test_non_utf8_lines_copied_byte_for_byte() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("latin1.csv");
        let original: &[u8] = b"A,B\r\nJos\xe9,1\r\nbar,2\r\n";
        fs::write(&path, original).unwrap();

        let out = updater_at(t0()).update(&path, 2, "baz,3").unwrap();
        assert_eq!(fs::read(&out.backup).unwrap(), original);
        assert_eq!(
            fs::read(&path).unwrap(),
            b"A,B\r\nJos\xe9,1\r\nbaz,3\r\n".to_vec()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_read_leaves_no_backup() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("videos.csv");
        // opens fine on unix, fails on the first read
        fs::create_dir(&path).unwrap();

        let up = updater_at(t0());
        let err = up.update(&path, 1, "x,0,0").unwrap_err();
        assert!(matches!(err, TableError::Io { action: "reading", .. }));
        assert!(list_backups(&path, &Config::default()).unwrap().is_empty());
        let stamp_dir = tmp.path().join("bc").join("2024-05-01T12-34-56");
        assert!(!stamp_dir.join("videos.csv.partial").exists());

        // the same second is still free for a real update
        fs::remove_dir(&path).unwrap();
        fs::write(&path, SAMPLE).unwrap();
        let out = up.update(&path, 1, "x,0,0").unwrap();
        assert_eq!(fs::read_to_string(&out.backup).unwrap(), SAMPLE);
        assert_eq!(list_backups(&path, &Config::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_split_path_bare_name() {
        let (dir, name) = split_path(Path::new("videos.csv")).unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "videos.csv");
        assert!(split_path(Path::new("/")).is_err());
    }
}
