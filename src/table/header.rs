use serde::Serialize;

use super::DELIMITER;
use crate::error::{TableError, TableResult};

/// A contiguous run of header columns sharing one `[Group]` label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderGroup {
    pub name: String,
    pub count: usize,
}

/// Two-tier header: group runs on top, column names underneath.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Header {
    pub groups: Vec<HeaderGroup>,
    /// Column display names with their bracket prefix stripped.
    pub columns: Vec<String>,
}

/// How to treat header fields whose brackets don't pair up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// A field with only one kind of bracket has no group and is kept
    /// verbatim. Reversed brackets are split as [`split_group`] describes.
    #[default]
    Lenient,
    /// Unpaired or reversed brackets are a `MalformedHeader` error.
    Strict,
}

/// Split one raw header field into `(group label, column name)`.
///
/// The label is whatever sits between the first `[` and the first `]`; the
/// name is everything after that `]`. Nested or repeated brackets are not
/// interpreted.
///
/// When the first `]` comes before the first `[` the label is still the text
/// between the two positions, taken in whichever order they fall, so
/// `x]y[z` splits into `("]y[", "y[z")`.
pub fn split_group(field: &str) -> Option<(&str, &str)> {
    let open = field.find('[')?;
    let close = field.find(']')?;
    let (lo, hi) = if open < close {
        (open + 1, close)
    } else {
        (close, open + 1)
    };
    Some((&field[lo..hi], &field[close + 1..]))
}

/// No brackets at all, or a `[` that comes before the first `]`.
fn well_bracketed(field: &str) -> bool {
    match (field.find('['), field.find(']')) {
        (None, None) => true,
        (Some(open), Some(close)) => open < close,
        _ => false,
    }
}

impl Header {
    /// Parse the first line of a table file.
    pub fn parse(line: &str, mode: HeaderMode) -> TableResult<Self> {
        let mut header = Header::default();
        for (column, raw) in line.split(DELIMITER).enumerate() {
            let field = raw.trim();
            if mode == HeaderMode::Strict && !well_bracketed(field) {
                return Err(TableError::MalformedHeader {
                    column,
                    field: field.to_string(),
                });
            }
            let (label, name) = split_group(field).unwrap_or(("", field));
            header.push_column(label, name);
        }
        Ok(header)
    }

    /// Append a column, extending the trailing group run or opening a new one.
    fn push_column(&mut self, label: &str, name: &str) {
        self.columns.push(name.to_string());
        match self.groups.last_mut() {
            Some(g) if g.name == label => g.count += 1,
            _ => self.groups.push(HeaderGroup {
                name: label.to_string(),
                count: 1,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Group label of the column at `column`, if it exists.
    pub fn group_of(&self, column: usize) -> Option<&str> {
        let mut end = 0;
        for g in &self.groups {
            end += g.count;
            if column < end {
                return Some(&g.name);
            }
        }
        None
    }

    /// Re-serialize with `[Group]` prefixes, inverse of `parse` for
    /// well-formed headers.
    ///
    /// An explicit empty label is not recorded, so `[]x` comes back as `x`.
    /// Both load to the same header.
    pub fn to_line(&self) -> String {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut columns = self.columns.iter();
        for g in &self.groups {
            for name in columns.by_ref().take(g.count) {
                if g.name.is_empty() {
                    fields.push(name.clone());
                } else {
                    fields.push(format!("[{}]{}", g.name, name));
                }
            }
        }
        fields.join(",")
    }
}
