// src/normalize/coerce.rs

use chrono::NaiveDate;

const ISO_DATE: &str = "%Y-%m-%d";

/// `"YYYYMMDD"` → calendar date. Exactly eight ASCII digits, and the day must exist.
pub fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Rewrite a session date as `YYYY-MM-DD`.
///
/// Accepts the compact export form and, so that a second pass is a no-op,
/// a value that is already ISO.
pub fn to_iso_date(s: &str) -> Option<String> {
    let s = s.trim();
    let date = parse_compact_date(s).or_else(|| {
        if s.len() == 10 {
            NaiveDate::parse_from_str(s, ISO_DATE).ok()
        } else {
            None
        }
    })?;
    Some(date.format(ISO_DATE).to_string())
}

/// Parse a numeric cell. `NaN` counts as missing and becomes zero.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let v: f64 = s.trim().parse().ok()?;
    Some(if v.is_nan() { 0.0 } else { v })
}
