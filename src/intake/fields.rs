//! Positional field extraction and the per-field validation rules.

use std::sync::LazyLock;

use regex::Regex;

use super::date::parse_flexible_date;
use super::normalize::{clean_edited_name, clean_name, extract_digits};
use super::pattern;
use super::types::{Field, FieldError, FieldErrorKind, ParsedFields, Site, SiteMode};

/// Shortest free-text sub-site name accepted, counting letters and digits.
pub const MIN_SUB_SITE_CHARS: usize = 3;

static FAMILY_KEYWORD: LazyLock<Regex> = LazyLock::new(|| pattern(r"\b(kk|kartu\s*keluarga)\b"));

static ID_KEYWORD: LazyLock<Regex> = LazyLock::new(|| pattern(r"\b(ktp|nik)\b"));

/// Length and prefix constraints for a digits-only field.
struct DigitRule {
    field: Field,
    min_len: usize,
    max_len: usize,
    program_prefix: bool,
}

const DIGIT_RULES: &[DigitRule] = &[
    DigitRule {
        field: Field::Card,
        min_len: 16,
        max_len: 18,
        program_prefix: true,
    },
    DigitRule {
        field: Field::Id,
        min_len: 16,
        max_len: 16,
        program_prefix: false,
    },
    DigitRule {
        field: Field::Family,
        min_len: 16,
        max_len: 16,
        program_prefix: false,
    },
];

/// Pairs that must differ. The error lands on the second field.
const DISTINCT_PAIRS: &[(Field, Field)] = &[
    (Field::Card, Field::Id),
    (Field::Card, Field::Family),
    (Field::Id, Field::Family),
];

fn digits_of(fields: &ParsedFields, field: Field) -> &str {
    match field {
        Field::Card => &fields.card,
        Field::Id => &fields.id,
        Field::Family => &fields.family,
        Field::Name | Field::BirthDate | Field::Location => "",
    }
}

impl DigitRule {
    fn check(&self, value: &str, card_prefix: &str, errors: &mut Vec<FieldError>) {
        let label = self.field.label();
        if value.is_empty() {
            errors.push(FieldError::new(
                self.field,
                FieldErrorKind::Required,
                format!("{label} wajib diisi"),
            ));
            return;
        }
        if value.len() < self.min_len || value.len() > self.max_len {
            let expected = if self.min_len == self.max_len {
                format!("{} digit", self.min_len)
            } else {
                format!("{}-{} digit", self.min_len, self.max_len)
            };
            errors.push(FieldError::new(
                self.field,
                FieldErrorKind::InvalidLength,
                format!("{label} harus {expected} (tertulis {} digit)", value.len()),
            ));
        }
        if self.program_prefix && !value.starts_with(card_prefix) {
            errors.push(FieldError::new(
                self.field,
                FieldErrorKind::InvalidPrefix,
                format!("{label} harus diawali {card_prefix}"),
            ));
        }
    }
}

/// Extract fields by position: name, card, ID, family, then birth date in
/// five-line mode.
pub fn build_fields(block: &[String], mode: SiteMode) -> ParsedFields {
    let line = |i: usize| block.get(i).map(String::as_str).unwrap_or("");
    ParsedFields {
        name: clean_name(line(0)).to_uppercase(),
        card: extract_digits(line(1)),
        id: extract_digits(line(2)),
        family: extract_digits(line(3)),
        birth_date: match mode {
            SiteMode::FiveLine => parse_flexible_date(line(4)),
            SiteMode::FourLine => None,
        },
        site_context: None,
    }
}

/// Apply every rule and collect all errors. Never stops at the first one.
pub fn validate(fields: &ParsedFields, mode: SiteMode, card_prefix: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if fields.name.trim().is_empty() {
        errors.push(FieldError::new(
            Field::Name,
            FieldErrorKind::Required,
            "Nama wajib diisi",
        ));
    }

    for rule in DIGIT_RULES {
        rule.check(digits_of(fields, rule.field), card_prefix, &mut errors);
    }

    if mode == SiteMode::FiveLine && fields.birth_date.is_none() {
        errors.push(FieldError::new(
            Field::BirthDate,
            FieldErrorKind::Required,
            "Tanggal lahir wajib diisi dengan tanggal yang valid",
        ));
    }

    for &(first, second) in DISTINCT_PAIRS {
        let a = digits_of(fields, first);
        let b = digits_of(fields, second);
        if !a.is_empty() && a == b {
            errors.push(FieldError::new(
                second,
                FieldErrorKind::SameAsOther,
                format!("{} sama dengan {}", second.label(), first.label()),
            ));
        }
    }

    errors
}

/// Four-line blocks only: a family keyword on line 3 with an ID keyword on
/// line 4 means the sender swapped the two.
pub fn check_line_order(block: &[String]) -> Option<FieldError> {
    let third = block.get(2)?.to_lowercase();
    let fourth = block.get(3)?.to_lowercase();
    (FAMILY_KEYWORD.is_match(&third) && ID_KEYWORD.is_match(&fourth)).then(|| {
        FieldError::new(
            Field::Id,
            FieldErrorKind::WrongOrder,
            "Urutan terbalik: baris 3 harus KTP dan baris 4 harus KK",
        )
    })
}

/// Build and validate one block.
pub fn validate_block(
    block: &[String],
    mode: SiteMode,
    card_prefix: &str,
) -> (ParsedFields, Vec<FieldError>) {
    let fields = build_fields(block, mode);
    let mut errors = validate(&fields, mode, card_prefix);
    if mode == SiteMode::FourLine {
        errors.extend(check_line_order(block));
    }
    (fields, errors)
}

/// Collapse whitespace in a typed sub-site name. `None` when too short.
pub fn clean_sub_site(raw: &str) -> Option<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (name.chars().filter(|c| c.is_alphanumeric()).count() >= MIN_SUB_SITE_CHARS).then_some(name)
}

/// A typed sub-site under the record's own site.
fn relocate(raw: &str, current: &ParsedFields) -> Result<String, Vec<FieldError>> {
    let Some(site) = current.site_context.as_deref().and_then(Site::from_context) else {
        return Err(vec![FieldError::new(
            Field::Location,
            FieldErrorKind::Required,
            "Lokasi asal data tidak dikenali",
        )]);
    };
    clean_sub_site(raw)
        .map(|name| site.context(&name))
        .ok_or_else(|| {
            vec![FieldError::new(
                Field::Location,
                FieldErrorKind::InvalidLength,
                format!("Nama lokasi minimal {MIN_SUB_SITE_CHARS} huruf"),
            )]
        })
}

/// Revalidate a single edited value against the same rules used during
/// extraction, including the cross-field checks against the record's other
/// fields. Returns the value as it would be stored.
pub fn revalidate_field(
    field: Field,
    raw: &str,
    current: &ParsedFields,
    card_prefix: &str,
) -> Result<String, Vec<FieldError>> {
    let mode = current.mode();
    let mut candidate = current.clone();
    let stored = match field {
        Field::Name => {
            candidate.name = clean_edited_name(raw);
            candidate.name.clone()
        }
        Field::Card => {
            candidate.card = extract_digits(raw);
            candidate.card.clone()
        }
        Field::Id => {
            candidate.id = extract_digits(raw);
            candidate.id.clone()
        }
        Field::Family => {
            candidate.family = extract_digits(raw);
            candidate.family.clone()
        }
        Field::BirthDate => {
            candidate.birth_date = parse_flexible_date(raw);
            candidate
                .birth_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        }
        Field::Location => return relocate(raw, current),
    };

    // Birth date only exists for five-line records.
    let mode = if field == Field::BirthDate {
        SiteMode::FiveLine
    } else {
        mode
    };

    // The stored record was valid, so any cross-field clash involves `field`.
    let errors: Vec<FieldError> = validate(&candidate, mode, card_prefix)
        .into_iter()
        .filter(|e| e.field == field || e.kind == FieldErrorKind::SameAsOther)
        .collect();

    if errors.is_empty() {
        Ok(stored)
    } else {
        Err(errors)
    }
}
