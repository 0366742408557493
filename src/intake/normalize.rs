//! Text normalization and line splitting.
//!
//! Chat clients add invisible characters, mixed line endings and
//! doubled punctuation. Everything downstream assumes one clean value per
//! line, so this is the first stage for every message.

use std::sync::LazyLock;

use regex::Regex;

use super::pattern;

static COLON_RUN: LazyLock<Regex> = LazyLock::new(|| pattern(r":+"));

/// `<text><whitespace><16+ digits>` pasted on a single line.
static MERGED_LINE: LazyLock<Regex> = LazyLock::new(|| pattern(r"^(.*?)\s+(\d{16,})$"));

static HAS_WORD: LazyLock<Regex> = LazyLock::new(|| pattern(r"[A-Za-z]{2,}"));

/// Tokens that mark a line as "label + number" rather than "name + number".
static LABEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    pattern(
        r"(?i)\b(NIK|KTP|KK|KJP|KAJ|KPDJ|KJMU|LANSIA|PJLP|RUSUN|DISABILITAS|DASAWISMA|DAWIS|GURU|HONORER|PEKERJA|KARTU|KELUARGA|ATM|NO|NOMOR|NOMER)\b",
    )
});

static ENUMERATION: LazyLock<Regex> = LazyLock::new(|| pattern(r"^\s*\d{1,3}\s*[.)]\s*"));

static NAME_TOKEN: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)\b(nama|nm)\b"));

/// Pickup-point words people paste into the name line.
static LOCATION_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(kecamatan cengkareng|mini dc cengkareng|rusun pesakih|rusunpesakih|kedoya)\b")
});

static NAME_PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| pattern(r"[=:;,]"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s+"));

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| pattern(r"\d+"));

/// Strip zero-width characters and the BOM, unify newlines, collapse colon
/// runs and trim.
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect();
    let unified = cleaned.replace("\r\n", "\n").replace('\r', "\n");
    COLON_RUN.replace_all(&unified, ":").trim().to_string()
}

/// Split on newlines, trim each line and drop the empty ones.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split lines where a name and a long number were pasted together.
///
/// `"Agus Dalimin 5049488500001111"` becomes two lines. A line whose text
/// part is a label (`NIK 3173...`) or has no word in it stays as is.
pub fn auto_split_merged(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let Some(caps) = MERGED_LINE.captures(&line) else {
            out.push(line);
            continue;
        };
        let head = caps.get(1).map_or("", |m| m.as_str()).trim();
        let digits = caps.get(2).map_or("", |m| m.as_str());

        if head.is_empty() || !HAS_WORD.is_match(head) || LABEL_TOKEN.is_match(head) {
            out.push(line);
        } else {
            out.push(head.to_string());
            out.push(digits.to_string());
        }
    }
    out
}

/// Full normalization: sanitize, split, then undo merged lines.
pub fn normalize(text: &str) -> Vec<String> {
    auto_split_merged(split_lines(&sanitize(text)))
}

/// Concatenate every digit run in the input.
pub fn extract_digits(input: &str) -> String {
    DIGIT_RUN
        .find_iter(input)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .concat()
}

/// Clean a name line: drop enumeration markers, `nama`/`nm` tokens, stray
/// punctuation and pasted location words, then collapse whitespace.
pub fn clean_name(raw: &str) -> String {
    let s = ENUMERATION.replace(raw, "");
    let s = LOCATION_NOISE.replace_all(&s, "");
    let s = NAME_TOKEN.replace_all(&s, "");
    let s = NAME_PUNCTUATION.replace_all(&s, "");
    let s = s.replace('.', " ");
    WHITESPACE.replace_all(&s, " ").trim().to_string()
}

/// Name as typed during an edit: digits are dropped as well, uppercased.
pub fn clean_edited_name(raw: &str) -> String {
    let without_digits: String = ENUMERATION
        .replace(raw, "")
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect();
    clean_name(&without_digits).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sanitize_strips_invisible_and_unifies() {
        let input = "\u{FEFF}Budi\u{200B} Santoso\r\nKTP::: 3173\u{00A0}01\rX  ";
        assert_eq!(sanitize(input), "Budi Santoso\nKTP: 3173 01\nX");
    }

    #[test]
    fn split_drops_blank_lines() {
        assert_eq!(split_lines("  a \n\n   \n b\n"), lines(&["a", "b"]));
    }

    #[test]
    fn auto_split_cases() {
        let cases: &[(&str, &[&str])] = &[
            (
                "Agus Dalimin 5049488500001111",
                &["Agus Dalimin", "5049488500001111"],
            ),
            ("NIK 3173444455556666", &["NIK 3173444455556666"]),
            ("No KK 3173444455556666", &["No KK 3173444455556666"]),
            ("12 3173444455556666", &["12 3173444455556666"]),
            ("Agus 504948850000111", &["Agus 504948850000111"]),
            ("Siti\t5049488500001111", &["Siti", "5049488500001111"]),
        ];
        for (input, expected) in cases {
            assert_eq!(
                auto_split_merged(lines(&[input])),
                lines(expected),
                "auto split of {input:?}"
            );
        }
    }

    #[test]
    fn extract_digits_joins_runs() {
        assert_eq!(extract_digits("KJP: 5049 4885-0000 1111"), "5049488500001111");
        assert_eq!(extract_digits("none"), "");
    }

    #[test]
    fn clean_name_cases() {
        let cases = [
            ("1. Budi Santoso", "Budi Santoso"),
            ("2) Siti", "Siti"),
            ("Nama: Rina", "Rina"),
            ("nm = Joko", "Joko"),
            ("Purnama Sari", "Purnama Sari"),
            ("M.Yusuf", "M Yusuf"),
            ("Dewi   Kedoya", "Dewi"),
        ];
        for (raw, expected) in cases {
            assert_eq!(clean_name(raw), expected, "clean_name({raw:?})");
        }
    }

    #[test]
    fn edited_name_drops_digits_and_uppercases() {
        assert_eq!(clean_edited_name("3. budi 123 santoso"), "BUDI SANTOSO");
    }
}
