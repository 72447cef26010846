use csv::{ReaderBuilder, Trim};
use std::{borrow::Cow, fs, io::Cursor, path::Path, sync::Arc};

use super::{Cell, RawRow, Rows, SourceError};

/// Open a CSV extract and stream its records in file order.
pub(super) fn read_csv(path: &Path) -> Result<Rows, SourceError> {
    let bytes = fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(bytes, path)
}

/// - first record names the columns
/// - every value is trimmed
/// - invalid UTF-8 is replaced, never fatal
/// - blank lines are skipped, ragged rows are tolerated (missing trailing
///   cells behave like absent keys)
pub(super) fn decode(bytes: Vec<u8>, path: &Path) -> Result<Rows, SourceError> {
    let bytes: Arc<[u8]> = bytes.into();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(Cursor::new(Arc::clone(&bytes)));

    let headers: Arc<[String]> = rdr
        .byte_headers()
        .map_err(|source| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(|h| lossy_trimmed(h).into_owned())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SourceError::NoHeader(path.to_path_buf()));
    }

    let path = path.to_path_buf();
    let mut lines = LineCounter::new(bytes);
    let rows = rdr.into_byte_records().map(move |result| {
        let record = result.map_err(|source| SourceError::Csv {
            path: path.clone(),
            source,
        })?;
        let line = record
            .position()
            .map(|p| lines.line_at(p.byte() as usize))
            .unwrap_or(0);
        let cells = record
            .iter()
            .map(|value| match lossy_trimmed(value) {
                v if v.is_empty() => Cell::Empty,
                v => Cell::Text(v.into_owned()),
            })
            .collect();
        Ok::<RawRow, SourceError>(RawRow::new(line, Arc::clone(&headers), cells))
    });

    Ok(Box::new(rows))
}

fn lossy_trimmed(value: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(value) {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim()),
        Cow::Owned(s) => Cow::Owned(s.trim().to_string()),
    }
}

/// Maps record byte offsets to 1-based file lines. The reader reports a
/// record's position before the blank lines it skips, so those are stepped
/// over here. Offsets must be queried in increasing order.
struct LineCounter {
    bytes: Arc<[u8]>,
    offset: usize,
    line: usize,
}

impl LineCounter {
    fn new(bytes: Arc<[u8]>) -> Self {
        Self {
            bytes,
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, offset: usize) -> usize {
        let len = self.bytes.len();
        let mut start = offset.clamp(self.offset, len);
        while start < len && matches!(self.bytes[start], b'\r' | b'\n') {
            start += 1;
        }
        self.line += self.bytes[self.offset..start]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        self.offset = start;
        self.line
    }
}
