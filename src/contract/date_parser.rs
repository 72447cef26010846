use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Days between the Excel serial epoch (1899-12-30) and the Unix epoch.
pub const EXCEL_EPOCH_OFFSET_DAYS: f64 = 25569.0;
pub const MILLIS_PER_DAY: f64 = 86_400_000.0;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Excel serial day count → UTC timestamp, millisecond precision.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let millis = ((serial - EXCEL_EPOCH_OFFSET_DAYS) * MILLIS_PER_DAY).round();
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc())
}

/// Fast parse of `"YYYY/MM/DD HH:MM:SS"`, the layout most extract tooling emits.
pub fn parse_slash_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    // minimal length + separators check
    let b = s.as_bytes();
    if b.len() < 19 || !b[..19].is_ascii() || b[4] != b'/' || b[7] != b'/' || b[10] != b' ' {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[5..7].parse().ok()?;
    let day: u32 = s[8..10].parse().ok()?;
    let hour: u32 = s[11..13].parse().ok()?;
    let min: u32 = s[14..16].parse().ok()?;
    let sec: u32 = s[17..19].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)
}

/// General date parser for text cells. Zoned timestamps are normalised to
/// UTC; zone-less values are taken as UTC already. Returns `None` when no
/// known layout matches.
pub fn parse_date_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(ts) = parse_slash_timestamp(s) {
        return Some(ts);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn serial_44197_is_new_year_2021() {
        assert_eq!(
            excel_serial_to_datetime(44197.0),
            Some(ymd_hms(2021, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn serial_fraction_is_time_of_day() {
        assert_eq!(
            excel_serial_to_datetime(44197.5),
            Some(ymd_hms(2021, 1, 1, 12, 0, 0))
        );
        assert_eq!(
            excel_serial_to_datetime(25569.0),
            Some(ymd_hms(1970, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn serial_rejects_non_finite() {
        assert_eq!(excel_serial_to_datetime(f64::NAN), None);
        assert_eq!(excel_serial_to_datetime(f64::INFINITY), None);
        assert_eq!(excel_serial_to_datetime(1e300), None);
    }

    #[test]
    fn parses_slash_timestamps() {
        assert_eq!(
            parse_slash_timestamp("2024/12/22 00:05:00"),
            Some(ymd_hms(2024, 12, 22, 0, 5, 0))
        );
        assert_eq!(parse_slash_timestamp("2024-12-22 00:05:00"), None);
        assert_eq!(parse_slash_timestamp("2024/13/22 00:05:00"), None);
    }

    #[test]
    fn parses_common_layouts() {
        let new_year = ymd_hms(2021, 1, 1, 0, 0, 0);
        assert_eq!(parse_date_str("2021-01-01"), Some(new_year));
        assert_eq!(parse_date_str("2021/01/01"), Some(new_year));
        assert_eq!(parse_date_str("01/01/2021"), Some(new_year));
        assert_eq!(parse_date_str("01-Jan-2021"), Some(new_year));
        assert_eq!(parse_date_str("Jan 1, 2021"), Some(new_year));
        assert_eq!(parse_date_str(" 2021-01-01T00:00:00 "), Some(new_year));
        assert_eq!(
            parse_date_str("2021-01-01 08:30"),
            Some(ymd_hms(2021, 1, 1, 8, 30, 0))
        );
    }

    #[test]
    fn zoned_timestamps_are_normalised_to_utc() {
        assert_eq!(
            parse_date_str("2021-01-01T10:00:00+10:00"),
            Some(ymd_hms(2021, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            parse_date_str("2021-01-01T00:00:00.000Z"),
            Some(ymd_hms(2021, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date_str(""), None);
        assert_eq!(parse_date_str("next tuesday"), None);
        assert_eq!(parse_date_str("TBD"), None);
    }
}
