//! Flexible birth-date parsing.
//!
//! Accepts `DD-MM-YYYY` with any of `- / .` or spaces as separators,
//! compact `DDMMYYYY` / `DDMMYY`, and `DD <month> YYYY` with Indonesian or
//! English month names. Labels like `TGL LAHIR:` are ignored.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::pattern;

static DATE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\b(TGL|TANGGAL|LAHIR|LHR|THN|TAHUN|DATE|BIRTH)\b"));

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| pattern(r"[\s\-/.]+"));

static TEXT_MONTH: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^(\d{1,2}) ([A-Z]+) (\d{2,4})$"));

static NUMERIC_TRIPLE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\b\d{1,2} \d{1,2} \d{2,4}\b"));

const MONTHS: &[(&str, u32)] = &[
    ("JAN", 1),
    ("JANUARI", 1),
    ("JANUARY", 1),
    ("PEB", 2),
    ("FEB", 2),
    ("FEBRUARI", 2),
    ("FEBRUARY", 2),
    ("MAR", 3),
    ("MARET", 3),
    ("MARCH", 3),
    ("APR", 4),
    ("APRIL", 4),
    ("MEI", 5),
    ("MAY", 5),
    ("JUN", 6),
    ("JUNI", 6),
    ("JUNE", 6),
    ("JUL", 7),
    ("JULI", 7),
    ("JULY", 7),
    ("AGU", 8),
    ("AGT", 8),
    ("AGUSTUS", 8),
    ("AUGUST", 8),
    ("SEP", 9),
    ("SEPT", 9),
    ("SEPTEMBER", 9),
    ("OKT", 10),
    ("OCT", 10),
    ("OKTOBER", 10),
    ("OCTOBER", 10),
    ("NOP", 11),
    ("NOV", 11),
    ("NOVEMBER", 11),
    ("DES", 12),
    ("DEC", 12),
    ("DESEMBER", 12),
    ("DECEMBER", 12),
];

/// Month-name fragments that make a line look like a date.
const MONTH_HINTS: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MEI", "MAY", "JUN", "JUL", "AGU", "AGT", "SEP", "OKT", "OCT",
    "NOV", "NOP", "DES", "DEC",
];

fn month_number(name: &str) -> Option<u32> {
    MONTHS.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
}

/// Uppercase, drop labels and `:`/`=`.
fn strip_labels(input: &str) -> String {
    let upper = input.trim().to_uppercase();
    DATE_LABEL
        .replace_all(&upper, "")
        .replace([':', '='], " ")
        .trim()
        .to_string()
}

fn collapse_separators(s: &str) -> String {
    SEPARATORS.replace_all(s, " ").trim().to_string()
}

/// Two-digit years pivot at 50: `<50` is 20xx, otherwise 19xx.
fn expand_year(year: i32) -> i32 {
    match year {
        0..=49 => 2000 + year,
        50..=99 => 1900 + year,
        _ => year,
    }
}

fn to_date(day: u32, month: u32, year: i32) -> Option<NaiveDate> {
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return None;
    }
    let year = expand_year(year);
    if !(1900..=2100).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_text_month(normalized: &str) -> Option<(u32, u32, i32)> {
    let caps = TEXT_MONTH.captures(normalized)?;
    let day = caps.get(1)?.as_str().parse().ok()?;
    let month = month_number(caps.get(2)?.as_str())?;
    let year = caps.get(3)?.as_str().parse().ok()?;
    Some((day, month, year))
}

fn parse_numeric(normalized: &str) -> Option<(u32, u32, i32)> {
    let parts: Vec<&str> = normalized.split(' ').collect();
    let [d, m, y] = parts.as_slice() else {
        return None;
    };
    Some((d.parse().ok()?, m.parse().ok()?, y.parse().ok()?))
}

fn parse_compact(cleaned: &str) -> Option<(u32, u32, i32)> {
    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
    let year_len = match digits.len() {
        8 => 4,
        6 => 2,
        _ => return None,
    };
    let day = digits.get(0..2)?.parse().ok()?;
    let month = digits.get(2..4)?.parse().ok()?;
    let year = digits.get(4..4 + year_len)?.parse().ok()?;
    Some((day, month, year))
}

/// Parse a birth date. Returns `None` for anything that is not a real
/// calendar date between 1900 and 2100.
pub fn parse_flexible_date(input: &str) -> Option<NaiveDate> {
    let cleaned = strip_labels(input);
    if cleaned.is_empty() {
        return None;
    }
    let normalized = collapse_separators(&cleaned);

    let (day, month, year) = parse_text_month(&normalized)
        .or_else(|| parse_numeric(&normalized))
        .or_else(|| parse_compact(&cleaned))?;

    to_date(day, month, year)
}

/// Cheap structural check used to tell 5-line blocks from 4-line ones.
/// More lenient than [`parse_flexible_date`].
pub fn looks_like_date(input: &str) -> bool {
    let cleaned = strip_labels(input);
    if cleaned.is_empty() {
        return false;
    }
    if MONTH_HINTS.iter().any(|m| cleaned.contains(m)) {
        return true;
    }
    if NUMERIC_TRIPLE.is_match(&collapse_separators(&cleaned)) {
        return true;
    }

    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 6 || digits.len() == 8 {
        let day: u32 = digits[0..2].parse().unwrap_or(0);
        let month: u32 = digits[2..4].parse().unwrap_or(0);
        return (1..=31).contains(&day) && (1..=12).contains(&month);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn accepted_formats() {
        let cases = [
            ("15-08-1975", ymd(1975, 8, 15)),
            ("15/08/1975", ymd(1975, 8, 15)),
            ("15.08.1975", ymd(1975, 8, 15)),
            ("15 08 1975", ymd(1975, 8, 15)),
            ("15  -  08  -  1975", ymd(1975, 8, 15)),
            ("15081975", ymd(1975, 8, 15)),
            ("150875", ymd(1975, 8, 15)),
            ("1 Januari 25", ymd(2025, 1, 1)),
            ("20-Jan-2025", ymd(2025, 1, 20)),
            ("17 Agustus 1945", ymd(1945, 8, 17)),
            ("3 Peb 1980", ymd(1980, 2, 3)),
            ("Tgl Lahir: 01-02-2003", ymd(2003, 2, 1)),
            ("TANGGAL LAHIR = 5 Desember 1990", ymd(1990, 12, 5)),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_flexible_date(input), expected, "parse {input:?}");
        }
    }

    #[test]
    fn rejected_inputs() {
        for input in [
            "",
            "32-01-2000",
            "10-13-2000",
            "00-01-2000",
            "30-02-2000",
            "01-01-1850",
            "01-01-2200",
            "1 Smarch 2000",
            "5049488500001111",
            "hello",
        ] {
            assert_eq!(parse_flexible_date(input), None, "{input:?} should not parse");
        }
    }

    #[test]
    fn two_digit_year_pivot() {
        assert_eq!(parse_flexible_date("01-01-49"), ymd(2049, 1, 1));
        assert_eq!(parse_flexible_date("01-01-50"), ymd(1950, 1, 1));
    }

    #[test]
    fn looks_like_date_cases() {
        for input in ["15-08-1975", "150875", "1 Januari 25", "lahir 3 mei 80", "15 8 75"] {
            assert!(looks_like_date(input), "{input:?} should look like a date");
        }
        for input in ["3173444455556666", "Budi Santoso", "", "KK 3173"] {
            assert!(!looks_like_date(input), "{input:?} should not look like a date");
        }
    }
}
