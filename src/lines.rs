// src/lines.rs

use std::io::{self, BufRead};

/// Splits a byte stream into lines on `\r\n`, `\n` or a bare `\r`.
///
/// Lines are yielded as raw bytes without their terminator, so callers can
/// copy them verbatim or decode them as they see fit. A trailing terminator
/// does not produce an extra empty line.
pub struct RawLines<R> {
    inner: R,
    /// Last line ended in `\r`; swallow a `\n` that immediately follows.
    skip_lf: bool,
}

impl<R: BufRead> RawLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            skip_lf: false,
        }
    }

    fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let mut partial = false;
        loop {
            let buf = self.inner.fill_buf()?;
            if buf.is_empty() {
                return Ok(if partial { Some(line) } else { None });
            }
            let start = if self.skip_lf && buf[0] == b'\n' { 1 } else { 0 };
            self.skip_lf = false;

            match buf[start..].iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(i) => {
                    let end = start + i;
                    line.extend_from_slice(&buf[start..end]);
                    self.skip_lf = buf[end] == b'\r';
                    self.inner.consume(end + 1);
                    return Ok(Some(line));
                }
                None => {
                    let len = buf.len();
                    line.extend_from_slice(&buf[start..]);
                    partial |= len > start;
                    self.inner.consume(len);
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for RawLines<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}
