//! Deduplication between records of the same message.

use std::collections::HashMap;

use super::types::{Field, FieldError, FieldErrorKind, RecordResult};

/// Demote later `Ok` records that repeat a value of one of `fields` already
/// claimed by an earlier `Ok` record. Records that failed validation do not
/// claim anything.
pub fn dedupe_within_message(records: &mut [RecordResult], fields: &[Field]) {
    let mut first_seen: HashMap<(Field, String), usize> = HashMap::new();

    for record in records.iter_mut() {
        if !record.is_ok() {
            continue;
        }

        let clash = fields.iter().find_map(|&field| {
            let value = record.fields.value(field)?;
            first_seen
                .get(&(field, value))
                .map(|&owner| (field, owner))
        });

        match clash {
            Some((field, owner)) => {
                record.reject(FieldError::new(
                    field,
                    FieldErrorKind::DuplicateInMessage,
                    format!("{} sama dengan data ke-{owner} di pesan ini", field.label()),
                ));
            }
            None => {
                for &field in fields {
                    if let Some(value) = record.fields.value(field) {
                        first_seen.entry((field, value)).or_insert(record.index);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::types::{ParsedFields, RecordStatus};

    fn record(index: usize, card: &str, id: &str, family: &str, status: RecordStatus) -> RecordResult {
        RecordResult {
            index,
            raw_lines: vec![],
            fields: ParsedFields {
                name: format!("N{index}"),
                card: card.to_string(),
                id: id.to_string(),
                family: family.to_string(),
                ..ParsedFields::default()
            },
            status,
            errors: vec![],
            duplicate: None,
        }
    }

    const FIELDS: &[Field] = &[Field::Card, Field::Id];

    #[test]
    fn repeated_card_demotes_second() {
        let mut records = vec![
            record(1, "5049488500001111", "3173000000000001", "3173000000000009", RecordStatus::Ok),
            record(2, "5049488500001111", "3173000000000002", "3173000000000008", RecordStatus::Ok),
        ];
        dedupe_within_message(&mut records, FIELDS);

        assert_eq!(records[0].status, RecordStatus::Ok);
        assert_eq!(records[1].status, RecordStatus::SkipFormat);
        assert_eq!(records[1].errors[0].kind, FieldErrorKind::DuplicateInMessage);
        assert_eq!(records[1].errors[0].field, Field::Card);
    }

    #[test]
    fn repeated_family_is_allowed() {
        let mut records = vec![
            record(1, "5049488500001111", "3173000000000001", "3173000000000009", RecordStatus::Ok),
            record(2, "5049488500002222", "3173000000000002", "3173000000000009", RecordStatus::Ok),
        ];
        dedupe_within_message(&mut records, FIELDS);
        assert!(records.iter().all(|r| r.status == RecordStatus::Ok));
    }

    #[test]
    fn invalid_records_do_not_claim_values() {
        let mut records = vec![
            record(1, "5049488500001111", "3173000000000001", "x", RecordStatus::SkipFormat),
            record(2, "5049488500001111", "3173000000000002", "3173000000000008", RecordStatus::Ok),
            record(3, "5049488500003333", "3173000000000002", "3173000000000007", RecordStatus::Ok),
        ];
        dedupe_within_message(&mut records, FIELDS);

        assert_eq!(records[1].status, RecordStatus::Ok);
        assert_eq!(records[2].status, RecordStatus::SkipFormat);
        assert_eq!(records[2].errors[0].field, Field::Id);
        assert!(records[0].errors.is_empty());
    }
}
