// src/table/load.rs

use std::{fs::File, io::BufReader, path::Path};
use tracing::{debug, instrument};

use super::{Header, HeaderMode, Row, Table, DELIMITER};
use crate::error::{TableError, TableResult};
use crate::lines::RawLines;

/// Load a table file with lenient header parsing.
pub fn load<P: AsRef<Path>>(path: P) -> TableResult<Table> {
    load_with(path, HeaderMode::Lenient)
}

/// Stream `path` once: the first line becomes the two-tier header, every
/// following line becomes a row of trimmed cells.
///
/// Lines may end in `\r\n`, `\n` or a bare `\r`. Bytes that aren't valid
/// UTF-8 are decoded lossily rather than rejected.
///
/// Blank lines are kept as rows; filtering them is up to the renderer
/// (see [`Table::visible_rows`]). An empty file yields an empty header and no
/// rows.
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_with<P: AsRef<Path>>(path: P, mode: HeaderMode) -> TableResult<Table> {
    let path = path.as_ref();
    let file = File::open(path).map_err(TableError::io("opening", path))?;
    let reader = BufReader::new(file);

    let mut header: Option<Header> = None;
    let mut rows: Vec<Row> = Vec::new();

    for line in RawLines::new(reader) {
        let bytes = line.map_err(TableError::io("reading", path))?;
        let line = String::from_utf8_lossy(&bytes);
        if header.is_none() {
            header = Some(Header::parse(&line, mode)?);
            continue;
        }
        rows.push(split_row(&line));
    }

    let header = header.unwrap_or_default();
    debug!(
        columns = header.columns.len(),
        groups = header.groups.len(),
        rows = rows.len(),
        "loaded table"
    );
    Ok(Table { header, rows })
}

/// Split a body line into trimmed cells.
pub fn split_row(line: &str) -> Row {
    line.split(DELIMITER).map(|c| c.trim().to_string()).collect()
}
