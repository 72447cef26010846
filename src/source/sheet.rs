use calamine::{open_workbook_auto, Data, Range, Reader};
use std::{collections::HashMap, path::Path, sync::Arc};
use tracing::debug;

use super::{Cell, RawRow, Rows, SourceError, SourceOptions};
use crate::contract::date_parser;

/// Read the first worksheet of a workbook. Spreadsheets are decoded in one go
/// (calamine materialises the whole range), then handed out row by row.
pub(super) fn read_sheet(path: &Path, options: SourceOptions) -> Result<Rows, SourceError> {
    let workbook_err = |message: String| SourceError::Workbook {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_err(e.to_string()))?;
    let sheet_name = workbook.sheet_names().first().cloned().unwrap_or_default();
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| workbook_err("workbook has no worksheets".into()))?
        .map_err(|e| workbook_err(e.to_string()))?;
    debug!(sheet = %sheet_name, size = ?range.get_size(), "loaded worksheet");

    let rows = rows_from_range(&range, options)
        .ok_or_else(|| SourceError::NoHeader(path.to_path_buf()))?;
    Ok(Box::new(rows.into_iter().map(Ok::<RawRow, SourceError>)))
}

/// Turn a cell range into header-keyed rows. Returns `None` for an empty range.
pub(super) fn rows_from_range(range: &Range<Data>, options: SourceOptions) -> Option<Vec<RawRow>> {
    let (first_row, _) = range.start()?;
    let mut rows = range.rows();
    let headers = header_names(rows.next()?);

    let mut out = Vec::new();
    for (idx, row) in rows.enumerate() {
        let cells: Vec<Cell> = row
            .iter()
            .map(|data| cell_from_data(data, options.cell_dates))
            .collect();
        if cells.iter().all(|c| matches!(c, Cell::Empty)) {
            continue;
        }
        // header sits on `first_row`, data starts right below it
        let line = first_row as usize + idx + 2;
        out.push(RawRow::new(line, Arc::clone(&headers), cells));
    }
    Some(out)
}

/// Header cells become column names. Blank headers are named `__EMPTY` and
/// repeated names get `_1`, `_2`… suffixes so every column stays addressable.
fn header_names(row: &[Data]) -> Arc<[String]> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    row.iter()
        .map(|data| {
            let base = match data {
                Data::Empty => "__EMPTY".to_string(),
                Data::String(s) if s.trim().is_empty() => "__EMPTY".to_string(),
                Data::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            let n = seen.entry(base.clone()).or_insert(0);
            let name = if *n == 0 {
                base
            } else {
                format!("{}_{}", base, n)
            };
            *n += 1;
            name
        })
        .collect()
}

/// Map one calamine cell onto the pipeline's untyped [`Cell`].
pub(super) fn cell_from_data(data: &Data, cell_dates: bool) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) if cell_dates => dt
            .as_datetime()
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Number(dt.as_f64())),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) if cell_dates => date_parser::parse_date_str(s)
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_range() -> Range<Data> {
        let mut range = Range::new((0, 0), (3, 2));
        range.set_value((0, 0), Data::String("Assetnum".into()));
        range.set_value((0, 1), Data::String("GBV".into()));
        range.set_value((0, 2), Data::String("GBV".into()));

        range.set_value((1, 0), Data::String("AX100 | SN1".into()));
        range.set_value((1, 1), Data::Float(1250.5));
        range.set_value((1, 2), Data::Int(3));
        // row 2 left blank
        range.set_value((3, 0), Data::String("AX200 | SN2".into()));
        range
    }

    #[test]
    fn range_rows_are_keyed_by_header_and_skip_blank_rows() {
        let rows = rows_from_range(&sample_range(), SourceOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].line(), 2);
        assert_eq!(
            rows[0].get("Assetnum"),
            Some(&Cell::Text("AX100 | SN1".into()))
        );
        assert_eq!(rows[0].get("GBV"), Some(&Cell::Number(1250.5)));
        assert_eq!(rows[0].get("GBV_1"), Some(&Cell::Number(3.0)));

        assert_eq!(rows[1].line(), 4);
        assert_eq!(rows[1].get("GBV"), Some(&Cell::Empty));
    }

    #[test]
    fn blank_headers_get_placeholder_names() {
        let names = header_names(&[
            Data::String("Plant".into()),
            Data::Empty,
            Data::String("  ".into()),
        ]);
        assert_eq!(&names[..], &["Plant", "__EMPTY", "__EMPTY_1"]);
    }

    #[test]
    fn maps_scalar_cells() {
        assert_eq!(cell_from_data(&Data::Empty, true), Cell::Empty);
        assert_eq!(cell_from_data(&Data::String(String::new()), true), Cell::Empty);
        assert_eq!(cell_from_data(&Data::Int(7), true), Cell::Number(7.0));
        assert_eq!(cell_from_data(&Data::Bool(true), true), Cell::Bool(true));
        assert_eq!(
            cell_from_data(&Data::String("P100".into()), false),
            Cell::Text("P100".into())
        );
    }

    #[test]
    fn iso_date_cells_follow_cell_dates_switch() {
        let iso = Data::DateTimeIso("2021-01-01T00:00:00".into());
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(cell_from_data(&iso, true), Cell::Date(expected));
        assert_eq!(
            cell_from_data(&iso, false),
            Cell::Text("2021-01-01T00:00:00".into())
        );
    }

    #[test]
    fn empty_range_has_no_rows() {
        let range: Range<Data> = Range::empty();
        assert!(rows_from_range(&range, SourceOptions::default()).is_none());
    }
}
