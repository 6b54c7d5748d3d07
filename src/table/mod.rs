// src/table/mod.rs

mod header;
mod load;

use serde::Serialize;

pub use header::{split_group, Header, HeaderGroup, HeaderMode};
pub use load::{load, load_with, split_row};

/// Field separator. No quoting or escaping is supported.
pub const DELIMITER: char = ',';

/// One body line, one cell per field in source order.
pub type Row = Vec<String>;

/// An in-memory snapshot of a table file.
///
/// Built fresh by every [`load`]; it is never patched after an update, so
/// callers reload to see changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub header: Header,
    pub rows: Vec<Row>,
}

impl Table {
    /// Position of the column whose display name is `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.columns.iter().position(|c| c == name)
    }

    /// Cell at body row `row` under the column named `name`.
    pub fn cell(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.column_index(name)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Body row `row` padded with empty cells up to the column count.
    pub fn padded_row(&self, row: usize) -> Option<Vec<&str>> {
        let cells = self.rows.get(row)?;
        let width = cells.len().max(self.header.columns.len());
        let mut out: Vec<&str> = cells.iter().map(String::as_str).collect();
        out.resize(width, "");
        Some(out)
    }

    /// Body rows with at least one non-empty cell, with their indices.
    pub fn visible_rows(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.iter().any(|c| !c.is_empty()))
    }

    /// Number of lines in the file this table was loaded from.
    pub fn line_count(&self) -> usize {
        if self.header.is_empty() {
            0
        } else {
            self.rows.len() + 1
        }
    }

    /// File line index of body row `row`; line 0 is the header.
    pub fn line_index(&self, row: usize) -> usize {
        row + 1
    }

    /// File line index at which a new row would be appended.
    pub fn append_index(&self) -> usize {
        self.line_count()
    }
}

/// Join cells into one replacement line.
pub fn serialize_row<S: AsRef<str>>(cells: &[S]) -> String {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push(DELIMITER);
        }
        line.push_str(cell.as_ref());
    }
    line
}
