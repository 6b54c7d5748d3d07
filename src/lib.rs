//! Load comma-delimited tables with a grouped two-tier header, and rewrite
//! single lines of them in place with a timestamped backup of the prior file.
//!
//! ```text
//! [Metadata]Title,[Metadata]Year,YT ID
//! Intro,2021,abc123
//! ```
//!
//! loads into one `Metadata` group spanning two columns followed by an
//! ungrouped `YT ID` column.

pub mod config;
pub mod error;
pub mod lines;
pub mod table;
pub mod update;

pub use config::{BackupCollision, Config};
pub use error::{TableError, TableResult};
pub use table::{load, load_with, serialize_row, Header, HeaderGroup, HeaderMode, Row, Table};
pub use update::{list_backups, restore, update, Backup, Clock, SystemClock, UpdateOutcome, Updater};
