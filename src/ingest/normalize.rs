// src/ingest/normalize.rs
//! Total parsers for the loosely formatted values platforms export.
//! None of these fail: malformed input maps to a neutral value.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Date patterns tried in order; the first full match wins.
const DATE_PATTERNS: [&str; 6] = [
    "%m/%d/%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%m-%d-%Y",
];

const DATETIME_PATTERNS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Parse a money string: `"$1,234.56"` -> 1234.56. Unparsable -> 0.0.
pub fn parse_currency(raw: &str) -> f64 {
    let s = raw.trim();
    let negative = s.starts_with('(') && s.ends_with(')');
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            if negative {
                -v.abs()
            } else {
                v
            }
        }
        _ => 0.0,
    }
}

/// Parse a rate: `"12%"` -> 0.12, `"0.12"` -> 0.12, `"150"` -> 1.5.
/// Values above 1 are read as whole percents. Unparsable -> 0.0.
pub fn parse_percentage(raw: &str) -> f64 {
    let cleaned = raw.replace('%', "");
    match cleaned.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => {
            if v > 1.0 {
                v / 100.0
            } else {
                v
            }
        }
        _ => 0.0,
    }
}

/// Parse a calendar date in any of the known export formats. No match -> `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for pattern in DATE_PATTERNS {
        if let Ok(d) = NaiveDate::parse_from_str(s, pattern) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for pattern in DATETIME_PATTERNS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(dt.date());
        }
    }
    None
}

/// Largest unit count accepted on one order line.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Parse a quantity. Absent/blank means one unit; anything non-integral, negative or above
/// [`MAX_QUANTITY`] is rejected.
pub fn parse_quantity(raw: Option<&str>) -> Option<i64> {
    let s = match raw.map(str::trim) {
        None | Some("") => return Some(1),
        Some(s) => s,
    };
    let qty = match s.parse::<i64>() {
        Ok(n) => n,
        Err(_) => {
            let f = s.parse::<f64>().ok()?;
            if f.fract() != 0.0 || !(0.0..=MAX_QUANTITY as f64).contains(&f) {
                return None;
            }
            f as i64
        }
    };
    (0..=MAX_QUANTITY).contains(&qty).then_some(qty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_strips_symbols_and_separators() {
        assert_eq!(parse_currency("$1,234.56"), 1234.56);
        assert_eq!(parse_currency("€ 12.50"), 12.5);
        assert_eq!(parse_currency("($3.00)"), -3.0);
        assert_eq!(parse_currency(""), 0.0);
        assert_eq!(parse_currency("abc"), 0.0);
        assert_eq!(parse_currency("1.2.3"), 0.0);
    }

    #[test]
    fn percentage_accepts_both_forms() {
        assert!((parse_percentage("12%") - 0.12).abs() < 1e-12);
        assert!((parse_percentage("0.12") - 0.12).abs() < 1e-12);
        assert!((parse_percentage("150") - 1.5).abs() < 1e-12);
        assert_eq!(parse_percentage("1"), 1.0);
        assert_eq!(parse_percentage("n/a"), 0.0);
    }

    #[test]
    fn dates_in_known_formats_agree() {
        let want = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(parse_date("03/15/2024"), want);
        assert_eq!(parse_date("2024-03-15"), want);
        assert_eq!(parse_date("15/03/2024"), want);
        assert_eq!(parse_date("March 15, 2024"), want);
        assert_eq!(parse_date("Mar 15, 2024"), want);
        assert_eq!(parse_date("03-15-2024"), want);
        assert_eq!(parse_date("2024-03-15T18:22:01Z"), want);
        assert_eq!(parse_date("2024-03-15T18:22:01"), want);
        assert_eq!(parse_date(" 2024-03-15 "), want);
    }

    #[test]
    fn unknown_dates_are_none() {
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2024-03-15 junk"), None);
    }

    #[test]
    fn ambiguous_day_month_prefers_month_first() {
        assert_eq!(parse_date("04/05/2024"), NaiveDate::from_ymd_opt(2024, 4, 5));
    }

    #[test]
    fn quantity_defaults_and_rejects() {
        assert_eq!(parse_quantity(None), Some(1));
        assert_eq!(parse_quantity(Some(" ")), Some(1));
        assert_eq!(parse_quantity(Some("3")), Some(3));
        assert_eq!(parse_quantity(Some("2.0")), Some(2));
        assert_eq!(parse_quantity(Some("two")), None);
    }

    #[test]
    fn quantity_outside_order_range_is_rejected() {
        assert_eq!(parse_quantity(Some("1e20")), None);
        assert_eq!(parse_quantity(Some("9223372036854775807")), None);
        assert_eq!(parse_quantity(Some("-2")), None);
        assert_eq!(parse_quantity(Some("-2.0")), None);
        assert_eq!(parse_quantity(Some("0")), Some(0));
        assert_eq!(parse_quantity(Some("1000000")), Some(MAX_QUANTITY));
        assert_eq!(parse_quantity(Some("1000001")), None);
    }
}
