use chrono::NaiveDateTime;

use super::date_parser::{excel_serial_to_datetime, parse_date_str};
use crate::source::Cell;

/// Absent columns, empty cells and whitespace-only text.
pub fn is_blank(cell: Option<&Cell>) -> bool {
    cell.map_or(true, Cell::is_blank)
}

/// Date coercion:
/// - numeric cells are Excel serial day counts
/// - text goes through the general parser only, so `"44197"` is not a serial
/// - dates pass through unchanged
/// - blank or unparseable input is `None`
pub fn coerce_date(cell: Option<&Cell>) -> Option<NaiveDateTime> {
    match cell? {
        Cell::Date(d) => Some(*d),
        Cell::Number(n) => excel_serial_to_datetime(*n),
        Cell::Text(s) => parse_date_str(s),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

/// Numeric coercion: blank or non-numeric input is `None`, never zero.
pub fn coerce_number(cell: Option<&Cell>) -> Option<f64> {
    match cell? {
        Cell::Number(n) if n.is_finite() => Some(*n),
        Cell::Text(s) => parse_number(s),
        Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Trimmed numeric text → finite `f64`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Text coercion; every non-blank scalar has a text rendering.
pub fn coerce_text(cell: Option<&Cell>) -> Option<String> {
    match cell? {
        Cell::Empty => None,
        Cell::Text(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Cell::Number(n) => Some(format_number(*n)),
        Cell::Bool(b) => Some(b.to_string()),
        Cell::Date(d) => Some(format_date(d)),
    }
}

/// `12.0` renders as `"12"`, `12.5` as `"12.5"`.
pub fn format_number(n: f64) -> String {
    n.to_string()
}

/// ISO-8601 UTC with millisecond precision.
pub fn format_date(d: &NaiveDateTime) -> String {
    d.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn excel_serial_number_yields_calendar_date() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(coerce_date(Some(&Cell::Number(44197.0))), Some(expected));
    }

    #[test]
    fn date_text_uses_the_general_parser() {
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(coerce_date(Some(&text("2021-01-01"))), Some(expected));
        // a serial day count typed as text is not a recognised date layout
        assert_eq!(coerce_date(Some(&text("44197"))), None);
    }

    #[test]
    fn blank_date_input_is_none() {
        assert_eq!(coerce_date(Some(&text(""))), None);
        assert_eq!(coerce_date(Some(&Cell::Empty)), None);
        assert_eq!(coerce_date(None), None);
    }

    #[test]
    fn native_date_passes_through() {
        let d = NaiveDate::from_ymd_opt(2023, 6, 30)
            .unwrap()
            .and_hms_opt(13, 45, 10)
            .unwrap();
        assert_eq!(coerce_date(Some(&Cell::Date(d))), Some(d));
    }

    #[test]
    fn unparseable_date_text_is_none() {
        assert_eq!(coerce_date(Some(&text("pending"))), None);
        assert_eq!(coerce_date(Some(&Cell::Bool(true))), None);
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(coerce_number(Some(&text(""))), None);
        assert_eq!(coerce_number(Some(&text("12.5"))), Some(12.5));
        assert_eq!(coerce_number(Some(&text(" 7 "))), Some(7.0));
        assert_eq!(coerce_number(Some(&text("abc"))), None);
        assert_eq!(coerce_number(Some(&text("NaN"))), None);
        assert_eq!(coerce_number(Some(&Cell::Number(3.25))), Some(3.25));
        assert_eq!(coerce_number(Some(&Cell::Empty)), None);
        assert_eq!(coerce_number(None), None);
    }

    #[test]
    fn text_coercion_renders_scalars() {
        assert_eq!(coerce_text(Some(&text("  NAM "))), Some("NAM".into()));
        assert_eq!(coerce_text(Some(&text("   "))), None);
        assert_eq!(coerce_text(Some(&Cell::Number(1250.0))), Some("1250".into()));
        assert_eq!(coerce_text(Some(&Cell::Number(12.5))), Some("12.5".into()));
        assert_eq!(coerce_text(Some(&Cell::Bool(false))), Some("false".into()));

        let d = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            coerce_text(Some(&Cell::Date(d))),
            Some("2021-01-01T00:00:00.000Z".into())
        );
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&Cell::Empty)));
        assert!(is_blank(Some(&text(" "))));
        assert!(!is_blank(Some(&Cell::Number(0.0))));
    }
}
