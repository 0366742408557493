//! Core types for the record-extraction pipeline.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One inbound chat message as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: Uuid,
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub is_admin: bool,
}

impl RawMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            text: text.into(),
            received_at: Utc::now(),
            is_admin: false,
        }
    }

    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// How many lines make up one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteMode {
    /// Name, card, ID, family.
    FourLine,
    /// Name, card, ID, family, birth date.
    FiveLine,
}

impl SiteMode {
    pub fn block_size(self) -> usize {
        match self {
            SiteMode::FourLine => 4,
            SiteMode::FiveLine => 5,
        }
    }

    pub fn other(self) -> Self {
        match self {
            SiteMode::FourLine => SiteMode::FiveLine,
            SiteMode::FiveLine => SiteMode::FourLine,
        }
    }
}

/// Distribution program the sender registers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Pasarjaya,
    Dharmajaya,
}

const PASARJAYA_SUB_SITES: &[&str] = &[
    "Jakgrosir Kedoya",
    "Gerai Rusun Pesakih",
    "Mini DC Kec. Cengkareng",
    "Jakmart Bambu Larangan",
];

const DHARMAJAYA_SUB_SITES: &[&str] = &["Duri Kosambi", "Kapuk Jagal", "Pulogadung", "Cakung"];

impl Site {
    pub fn mode(self) -> SiteMode {
        match self {
            Site::Pasarjaya => SiteMode::FiveLine,
            Site::Dharmajaya => SiteMode::FourLine,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Site::Pasarjaya => "PASARJAYA",
            Site::Dharmajaya => "DHARMAJAYA",
        }
    }

    /// Fixed pickup points, in menu order.
    pub fn sub_sites(self) -> &'static [&'static str] {
        match self {
            Site::Pasarjaya => PASARJAYA_SUB_SITES,
            Site::Dharmajaya => DHARMAJAYA_SUB_SITES,
        }
    }

    /// Whether the menu offers a free-text "other" entry after the fixed ones.
    pub fn allows_manual_sub_site(self) -> bool {
        matches!(self, Site::Pasarjaya)
    }

    /// Context string stored with every record, e.g. `PASARJAYA - Cakung`.
    pub fn context(self, sub_site: &str) -> String {
        format!("{} - {}", self.label(), sub_site)
    }

    pub fn from_context(context: &str) -> Option<Self> {
        let head = context.split(" - ").next()?.trim();
        match head {
            "PASARJAYA" => Some(Site::Pasarjaya),
            "DHARMAJAYA" => Some(Site::Dharmajaya),
            _ => None,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A record field, used to address validation errors and edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Card,
    Id,
    Family,
    BirthDate,
    /// Site context (`<SITE> - <sub-site>`); only ever edited, never parsed.
    Location,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::Name => "Nama",
            Field::Card => "Nomor Kartu",
            Field::Id => "KTP",
            Field::Family => "KK",
            Field::BirthDate => "Tanggal Lahir",
            Field::Location => "Lokasi",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Card => "card",
            Field::Id => "id",
            Field::Family => "family",
            Field::BirthDate => "birth_date",
            Field::Location => "location",
        }
    }

    /// Fields a sender may edit for records of the given mode, in menu order.
    pub fn editable(mode: SiteMode) -> &'static [Field] {
        match mode {
            SiteMode::FourLine => &[
                Field::Name,
                Field::Card,
                Field::Id,
                Field::Family,
                Field::Location,
            ],
            SiteMode::FiveLine => &[
                Field::Name,
                Field::Card,
                Field::Id,
                Field::Family,
                Field::BirthDate,
                Field::Location,
            ],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Required,
    InvalidLength,
    InvalidPrefix,
    WrongOrder,
    SameAsOther,
    DuplicateInMessage,
    /// On an admin blocklist.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: Field,
    pub kind: FieldErrorKind,
    pub detail: String,
}

impl FieldError {
    pub fn new(field: Field, kind: FieldErrorKind, detail: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            detail: detail.into(),
        }
    }
}

/// Fields extracted positionally from one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub name: String,
    pub card: String,
    pub id: String,
    pub family: String,
    pub birth_date: Option<NaiveDate>,
    pub site_context: Option<String>,
}

impl ParsedFields {
    /// Value of a digit field or the name, as it would be compared for uniqueness.
    pub fn value(&self, field: Field) -> Option<String> {
        match field {
            Field::Name => Some(self.name.to_uppercase()),
            Field::Card => Some(self.card.clone()),
            Field::Id => Some(self.id.clone()),
            Field::Family => Some(self.family.clone()),
            Field::BirthDate => self.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Field::Location => self.site_context.clone(),
        }
        .filter(|v| !v.is_empty())
    }

    /// Record shape, from the site context when known.
    pub fn mode(&self) -> SiteMode {
        match self.site_context.as_deref().and_then(Site::from_context) {
            Some(site) => site.mode(),
            None if self.birth_date.is_some() => SiteMode::FiveLine,
            None => SiteMode::FourLine,
        }
    }
}

/// Outcome of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Ok,
    SkipFormat,
    SkipDuplicate,
}

impl RecordStatus {
    /// Statuses only move forward, and only out of `Ok`.
    pub fn can_transition_to(&self, target: RecordStatus) -> bool {
        matches!(
            (self, target),
            (RecordStatus::Ok, RecordStatus::SkipFormat)
                | (RecordStatus::Ok, RecordStatus::SkipDuplicate)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordStatus::Ok)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStatus::Ok => "OK",
            RecordStatus::SkipFormat => "SKIP_FORMAT",
            RecordStatus::SkipDuplicate => "SKIP_DUPLICATE",
        };
        write!(f, "{s}")
    }
}

/// Which uniqueness rule a prior record tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateKind {
    Name,
    Card,
    Id,
    FamilyOther,
}

impl DuplicateKind {
    pub fn for_field(field: Field) -> Option<Self> {
        match field {
            Field::Name => Some(DuplicateKind::Name),
            Field::Card => Some(DuplicateKind::Card),
            Field::Id => Some(DuplicateKind::Id),
            Field::Family => Some(DuplicateKind::FamilyOther),
            Field::BirthDate | Field::Location => None,
        }
    }
}

/// Field values of the conflicting prior record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorValues {
    pub name: String,
    pub card: String,
    pub id: String,
    pub family: String,
}

impl PriorValues {
    pub fn value(&self, field: Field) -> Option<String> {
        match field {
            Field::Name => Some(self.name.to_uppercase()),
            Field::Card => Some(self.card.clone()),
            Field::Id => Some(self.id.clone()),
            Field::Family => Some(self.family.clone()),
            Field::BirthDate | Field::Location => None,
        }
        .filter(|v| !v.is_empty())
    }
}

impl From<&ParsedFields> for PriorValues {
    fn from(f: &ParsedFields) -> Self {
        Self {
            name: f.name.clone(),
            card: f.card.clone(),
            id: f.id.clone(),
            family: f.family.clone(),
        }
    }
}

/// A record already stored for the day, as seen by the duplicate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorRecord {
    pub sender: String,
    pub values: PriorValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateInfo {
    pub kind: DuplicateKind,
    pub day_key: NaiveDate,
    /// Reply text that never names the other sender.
    pub safe_message: String,
    pub prior: PriorValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordResult {
    /// 1-based position of the block in the message.
    pub index: usize,
    pub raw_lines: Vec<String>,
    pub fields: ParsedFields,
    pub status: RecordStatus,
    pub errors: Vec<FieldError>,
    pub duplicate: Option<DuplicateInfo>,
}

impl RecordResult {
    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }

    /// Demote an `Ok` record with an extra error. No-op otherwise.
    pub fn reject(&mut self, error: FieldError) -> bool {
        if !self.status.can_transition_to(RecordStatus::SkipFormat) {
            return false;
        }
        self.status = RecordStatus::SkipFormat;
        self.errors.push(error);
        true
    }

    /// Mark an `Ok` record as a duplicate of a prior one. No-op otherwise.
    pub fn mark_duplicate(&mut self, info: DuplicateInfo) -> bool {
        if !self.status.can_transition_to(RecordStatus::SkipDuplicate) {
            return false;
        }
        self.status = RecordStatus::SkipDuplicate;
        self.duplicate = Some(info);
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub total: usize,
    pub ok: usize,
    pub skip_format: usize,
    pub skip_duplicate: usize,
}

impl IngestStats {
    pub fn from_records(records: &[RecordResult]) -> Self {
        let mut stats = Self {
            total: records.len(),
            ..Self::default()
        };
        for r in records {
            match r.status {
                RecordStatus::Ok => stats.ok += 1,
                RecordStatus::SkipFormat => stats.skip_format += 1,
                RecordStatus::SkipDuplicate => stats.skip_duplicate += 1,
            }
        }
        stats
    }
}

/// Everything extracted from one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResult {
    pub message_id: Uuid,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    pub day_key: NaiveDate,
    pub site_context: Option<String>,
    pub records: Vec<RecordResult>,
    pub remainder: Vec<String>,
    pub stats: IngestStats,
}

impl IngestionResult {
    pub fn ok_records(&self) -> impl Iterator<Item = &RecordResult> {
        self.records.iter().filter(|r| r.is_ok())
    }

    /// Recount after a later stage changed statuses.
    pub fn refresh_stats(&mut self) {
        self.stats = IngestStats::from_records(&self.records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_status_transitions() {
        let valid = [
            (RecordStatus::Ok, RecordStatus::SkipFormat),
            (RecordStatus::Ok, RecordStatus::SkipDuplicate),
        ];
        for (from, to) in valid {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }

        let invalid = [
            (RecordStatus::SkipFormat, RecordStatus::Ok),
            (RecordStatus::SkipFormat, RecordStatus::SkipDuplicate),
            (RecordStatus::SkipDuplicate, RecordStatus::Ok),
            (RecordStatus::SkipDuplicate, RecordStatus::SkipFormat),
            (RecordStatus::Ok, RecordStatus::Ok),
        ];
        for (from, to) in invalid {
            assert!(!from.can_transition_to(to), "{from} should NOT transition to {to}");
        }
    }

    #[test]
    fn status_serde_matches_display() {
        for status in [
            RecordStatus::Ok,
            RecordStatus::SkipFormat,
            RecordStatus::SkipDuplicate,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn site_context_round_trip() {
        let ctx = Site::Dharmajaya.context("Cakung");
        assert_eq!(ctx, "DHARMAJAYA - Cakung");
        assert_eq!(Site::from_context(&ctx), Some(Site::Dharmajaya));
        assert_eq!(Site::from_context("GUDANG - X"), None);
        assert_eq!(Site::Pasarjaya.mode().block_size(), 5);
        assert_eq!(Site::Dharmajaya.mode().block_size(), 4);
    }

    #[test]
    fn terminal_record_is_not_demoted_again() {
        let mut record = RecordResult {
            index: 1,
            raw_lines: vec![],
            fields: ParsedFields::default(),
            status: RecordStatus::SkipFormat,
            errors: vec![],
            duplicate: None,
        };
        let applied = record.reject(FieldError::new(
            Field::Card,
            FieldErrorKind::DuplicateInMessage,
            "dup",
        ));
        assert!(!applied);
        assert!(record.errors.is_empty());
    }
}
