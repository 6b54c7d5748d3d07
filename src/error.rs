//! Error types for table loading and row updates.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or rewriting a table file.
#[derive(Error, Debug)]
pub enum TableError {
    /// Any filesystem failure, tagged with what we were doing and where.
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A backup with the same timestamped name already exists.
    #[error("backup file {} already exists", path.display())]
    FileConflict { path: PathBuf },

    /// Unbalanced or reversed group brackets (strict header mode only).
    #[error("malformed header field {column}: {field:?}")]
    MalformedHeader { column: usize, field: String },

    /// Replacement text would span more than one line.
    #[error("replacement row contains a line break")]
    InvalidRow,

    /// Backup search pattern could not be built.
    #[error("invalid backup pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Configuration file could not be parsed.
    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for table operations
pub type TableResult<T> = Result<T, TableError>;

impl TableError {
    /// Build a `map_err` adapter that wraps an `io::Error` with context.
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> TableError {
        let path = path.into();
        move |source| TableError::Io {
            action,
            path,
            source,
        }
    }
}
