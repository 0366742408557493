//! Result assembly and the per-day duplicate check.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::blocks::{StructureError, check_structure, group_into_blocks};
use super::dedupe::dedupe_within_message;
use super::fields::validate_block;
use super::normalize::normalize;
use super::policy::{DayRule, OwnerScope, UniquenessPolicy};
use super::types::{
    DuplicateInfo, DuplicateKind, Field, FieldError, FieldErrorKind, IngestStats,
    IngestionResult, PriorRecord, PriorValues, RawMessage, RecordResult, RecordStatus, Site,
    SiteMode,
};
use crate::error::DatabaseError;
use crate::schedule::day_key;
use crate::store::{BlockList, BlockedEntry, RegistrationStore};

/// Blocklists checked against every record, in order.
const RECORD_BLOCKLISTS: [BlockList; 2] = [BlockList::Id, BlockList::Family];

/// Everything needed to turn one text into records.
#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    pub message: &'a RawMessage,
    /// Usually `message.text`, but buffered text when a site was chosen late.
    pub text: &'a str,
    pub site: Site,
    pub sub_site: &'a str,
    pub card_prefix: &'a str,
}

/// Build, validate and dedupe records from normalized lines. Lines that do
/// not fill a whole block come back as the remainder.
pub fn extract(
    lines: &[String],
    mode: SiteMode,
    card_prefix: &str,
    site_context: Option<&str>,
    policy: &UniquenessPolicy,
) -> (Vec<RecordResult>, Vec<String>) {
    let grouped = group_into_blocks(lines, mode.block_size());

    let mut records: Vec<RecordResult> = grouped
        .blocks
        .into_iter()
        .enumerate()
        .map(|(i, block)| {
            let (mut fields, errors) = validate_block(&block, mode, card_prefix);
            fields.site_context = site_context.map(str::to_string);
            let status = if errors.is_empty() {
                RecordStatus::Ok
            } else {
                RecordStatus::SkipFormat
            };
            RecordResult {
                index: i + 1,
                raw_lines: block,
                fields,
                status,
                errors,
                duplicate: None,
            }
        })
        .collect();

    dedupe_within_message(&mut records, &policy.within_message);
    (records, grouped.remainder)
}

/// Normalize, gate on structure, then extract. A structural problem rejects
/// the whole message so nothing downstream ever sees partial blocks.
pub fn ingest(
    req: &IngestRequest<'_>,
    policy: &UniquenessPolicy,
) -> Result<IngestionResult, StructureError> {
    let lines = normalize(req.text);
    let mode = req.site.mode();
    check_structure(&lines, mode)?;

    let context = req.site.context(req.sub_site);
    let (records, remainder) = extract(&lines, mode, req.card_prefix, Some(&context), policy);

    Ok(IngestionResult {
        message_id: req.message.id,
        sender: req.message.sender.clone(),
        received_at: req.message.received_at,
        day_key: day_key(req.message.received_at),
        site_context: Some(context),
        stats: IngestStats::from_records(&records),
        records,
        remainder,
    })
}

fn conflict_message(rule: &DayRule, prior: &PriorValues) -> String {
    let owner = if prior.name.is_empty() {
        "orang lain".to_string()
    } else {
        prior.name.to_uppercase()
    };
    match (rule.field, rule.scope) {
        (Field::Family, OwnerScope::OtherSenders) => {
            "KK sudah didaftarkan oleh pengirim lain hari ini".to_string()
        }
        (Field::Name, _) => format!("Nama {owner} sudah terdaftar hari ini"),
        (field, _) => format!("{} sudah terdaftar atas nama {owner}", field.label()),
    }
}

fn blocked_message(entry: &BlockedEntry) -> String {
    let reason = entry
        .reason
        .as_deref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default();
    match entry.list {
        BlockList::Id => format!("KTP sudah mencapai batas pendaftaran bulan ini{reason}"),
        _ => format!(
            "Nomor {} terblokir{reason}. Silakan ganti data lain.",
            entry.list.label()
        ),
    }
}

/// Demote `Ok` records carrying a blocked number to `SKIP_FORMAT`. Lapsed
/// entries are ignored. Returns how many records were demoted.
pub fn apply_blocks(
    result: &mut IngestionResult,
    blocked: &[BlockedEntry],
    now: DateTime<Utc>,
) -> usize {
    let mut demoted = 0;
    for record in result.records.iter_mut().filter(|r| r.is_ok()) {
        let hit = blocked.iter().filter(|e| e.in_force(now)).find_map(|entry| {
            let field = entry.list.field()?;
            (record.fields.value(field).as_deref() == Some(entry.value.as_str()))
                .then(|| FieldError::new(field, FieldErrorKind::Blocked, blocked_message(entry)))
        });
        if hit.is_some_and(|error| record.reject(error)) {
            demoted += 1;
        }
    }

    result.refresh_stats();
    demoted
}

/// Mark `Ok` records that clash with priors. Returns how many were marked.
pub fn apply_priors(
    result: &mut IngestionResult,
    priors: &[PriorRecord],
    policy: &UniquenessPolicy,
) -> usize {
    let mut marked = 0;
    let day = result.day_key;
    let sender = result.sender.clone();

    for record in result.records.iter_mut().filter(|r| r.is_ok()) {
        let mut messages = Vec::new();
        let mut first: Option<(DuplicateKind, PriorValues)> = None;

        for prior in priors {
            for rule in policy.violations(&record.fields, &sender, prior) {
                let message = conflict_message(&rule, &prior.values);
                if !messages.contains(&message) {
                    messages.push(message);
                }
                if first.is_none() {
                    first = DuplicateKind::for_field(rule.field).map(|k| (k, prior.values.clone()));
                }
            }
        }

        if let Some((kind, values)) = first {
            let applied = record.mark_duplicate(DuplicateInfo {
                kind,
                day_key: day,
                safe_message: messages.join("\n"),
                prior: values,
            });
            if applied {
                marked += 1;
            }
        }
    }

    result.refresh_stats();
    marked
}

/// Runs the blocklists, then the per-day uniqueness rules, against stored
/// records.
pub struct DuplicateChecker<'a> {
    store: &'a dyn RegistrationStore,
    policy: &'a UniquenessPolicy,
}

impl<'a> DuplicateChecker<'a> {
    pub fn new(store: &'a dyn RegistrationStore, policy: &'a UniquenessPolicy) -> Self {
        Self { store, policy }
    }

    /// Returns how many records were demoted or marked.
    pub async fn check(&self, result: &mut IngestionResult) -> Result<usize, DatabaseError> {
        let demoted = self.check_blocklists(result).await?;
        Ok(demoted + self.check_priors(result).await?)
    }

    async fn check_blocklists(&self, result: &mut IngestionResult) -> Result<usize, DatabaseError> {
        let mut blocked = Vec::new();
        for list in RECORD_BLOCKLISTS {
            let Some(field) = list.field() else {
                continue;
            };
            let values: BTreeSet<String> = result
                .ok_records()
                .filter_map(|r| r.fields.value(field))
                .collect();
            if values.is_empty() {
                continue;
            }
            let values: Vec<String> = values.into_iter().collect();
            blocked.extend(self.store.find_blocked(list, &values).await?);
        }
        if blocked.is_empty() {
            return Ok(0);
        }

        let now = result.received_at;
        let demoted = apply_blocks(result, &blocked, now);
        if demoted > 0 {
            info!(sender = %result.sender, demoted, "Records on a blocklist");
        }
        Ok(demoted)
    }

    async fn check_priors(&self, result: &mut IngestionResult) -> Result<usize, DatabaseError> {
        let lookups: BTreeSet<(Field, String)> = result
            .ok_records()
            .flat_map(|r| self.policy.lookups(&r.fields))
            .collect();
        if lookups.is_empty() {
            return Ok(0);
        }

        let lookups: Vec<(Field, String)> = lookups.into_iter().collect();
        let priors = self.store.find_priors(result.day_key, &lookups).await?;
        debug!(
            sender = %result.sender,
            lookups = lookups.len(),
            priors = priors.len(),
            "Duplicate lookup"
        );

        let marked = apply_priors(result, &priors, self.policy);
        if marked > 0 {
            info!(
                sender = %result.sender,
                day_key = %result.day_key,
                marked,
                "Records already registered today"
            );
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AdminDesk, MemoryStore};
    use chrono::{TimeDelta, TimeZone};

    const PREFIX: &str = "504948";

    fn message(sender: &str, text: &str) -> RawMessage {
        RawMessage::new(sender, text).at(Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap())
    }

    fn request<'a>(msg: &'a RawMessage, site: Site) -> IngestRequest<'a> {
        IngestRequest {
            message: msg,
            text: &msg.text,
            site,
            sub_site: "Cakung",
            card_prefix: PREFIX,
        }
    }

    const TWO_RECORDS: &str = "Budi Santoso\n5049488500001111\n3173010101010001\n3173010101010009\n\
                               Siti 5049488500002222\n3173010101010002\n3173010101010009";

    #[test]
    fn ingests_four_line_message() {
        let msg = message("alice", TWO_RECORDS);
        let result = ingest(&request(&msg, Site::Dharmajaya), &UniquenessPolicy::default()).unwrap();

        assert_eq!(result.stats.total, 2);
        assert_eq!(result.stats.ok, 2, "{:?}", result.records);
        assert_eq!(result.records[1].fields.name, "SITI");
        assert_eq!(
            result.records[0].fields.site_context.as_deref(),
            Some("DHARMAJAYA - Cakung")
        );
        assert!(result.remainder.is_empty());
    }

    #[test]
    fn mode_mismatch_rejects_everything() {
        let msg = message("alice", TWO_RECORDS);
        let err = ingest(&request(&msg, Site::Pasarjaya), &UniquenessPolicy::default()).unwrap_err();
        assert!(matches!(err, StructureError::ModeMismatch { lines: 8, .. }));
    }

    #[test]
    fn partial_failures_keep_siblings() {
        let text = "Budi\n5049470000001111\n3173010101010001\n3173010101010009\n\
                    Siti\n5049488500002222\n3173010101010002\n3173010101010008";
        let msg = message("alice", text);
        let result = ingest(&request(&msg, Site::Dharmajaya), &UniquenessPolicy::default()).unwrap();
        assert_eq!(result.stats.ok, 1);
        assert_eq!(result.stats.skip_format, 1);
        assert_eq!(result.records[0].errors[0].kind, FieldErrorKind::InvalidPrefix);
    }

    #[test]
    fn undated_five_line_record_fails_alone() {
        let text = "Budi\n5049488500001111\n3173010101010001\n3173010101010009\n15-08-1975\n\
                    Siti\n5049488500002222\n3173010101010002\n3173010101010008\nlupa";
        let msg = message("alice", text);
        let result = ingest(&request(&msg, Site::Pasarjaya), &UniquenessPolicy::default()).unwrap();

        assert_eq!(result.stats.ok, 1);
        assert_eq!(result.stats.skip_format, 1);
        assert!(result.records[0].is_ok());
        assert_eq!(result.records[1].errors[0].field, Field::BirthDate);
        assert_eq!(result.records[1].errors[0].kind, FieldErrorKind::Required);
    }

    #[test]
    fn extract_reports_remainder() {
        let lines: Vec<String> = TWO_RECORDS.lines().map(|l| l.trim().to_string()).collect();
        let lines = crate::intake::normalize::auto_split_merged(lines);
        let (records, remainder) =
            extract(&lines[..6], SiteMode::FourLine, PREFIX, None, &UniquenessPolicy::default());
        assert_eq!(records.len(), 1);
        assert_eq!(remainder, vec!["Siti", "5049488500002222"]);
    }

    #[test]
    fn priors_mark_duplicates_without_leaking_sender() {
        let msg = message("bob", TWO_RECORDS);
        let mut result =
            ingest(&request(&msg, Site::Dharmajaya), &UniquenessPolicy::default()).unwrap();
        let priors = vec![PriorRecord {
            sender: "alice".to_string(),
            values: PriorValues {
                name: "ANI".to_string(),
                card: "5049488500001111".to_string(),
                id: "3173999999999999".to_string(),
                family: "3173888888888888".to_string(),
            },
        }];

        let marked = apply_priors(&mut result, &priors, &UniquenessPolicy::default());
        assert_eq!(marked, 1);
        assert_eq!(result.stats.skip_duplicate, 1);
        assert_eq!(result.stats.ok, 1);

        let info = result.records[0].duplicate.as_ref().unwrap();
        assert_eq!(info.kind, DuplicateKind::Card);
        assert_eq!(info.prior.card, "5049488500001111");
        assert!(!info.safe_message.contains("alice"));
    }

    #[test]
    fn sibling_family_from_same_sender_is_not_duplicate() {
        let msg = message("alice", TWO_RECORDS);
        let mut result =
            ingest(&request(&msg, Site::Dharmajaya), &UniquenessPolicy::default()).unwrap();
        let priors = vec![PriorRecord {
            sender: "alice".to_string(),
            values: PriorValues {
                name: "ANI".to_string(),
                card: "5049488500009999".to_string(),
                id: "3173999999999999".to_string(),
                family: "3173010101010009".to_string(),
            },
        }];
        assert_eq!(apply_priors(&mut result, &priors, &UniquenessPolicy::default()), 0);

        let mut from_bob = result.clone();
        from_bob.sender = "bob".to_string();
        assert_eq!(apply_priors(&mut from_bob, &priors, &UniquenessPolicy::default()), 2);
        let info = from_bob.records[0].duplicate.as_ref().unwrap();
        assert_eq!(info.kind, DuplicateKind::FamilyOther);
    }

    fn blocked(list: BlockList, value: &str, created_at: DateTime<Utc>) -> BlockedEntry {
        BlockedEntry {
            list,
            value: value.to_string(),
            reason: None,
            created_at,
        }
    }

    #[test]
    fn blocked_family_demotes_every_sibling() {
        let msg = message("alice", TWO_RECORDS);
        let mut result =
            ingest(&request(&msg, Site::Dharmajaya), &UniquenessPolicy::default()).unwrap();
        let entry = BlockedEntry {
            reason: Some("tunggakan".to_string()),
            ..blocked(BlockList::Family, "3173010101010009", msg.received_at)
        };

        assert_eq!(apply_blocks(&mut result, &[entry], msg.received_at), 2);
        assert_eq!(result.stats.skip_format, 2);
        let error = &result.records[0].errors[0];
        assert_eq!((error.field, error.kind), (Field::Family, FieldErrorKind::Blocked));
        assert!(error.detail.contains("tunggakan"), "{}", error.detail);
    }

    #[test]
    fn last_months_id_block_has_lapsed() {
        let msg = message("alice", TWO_RECORDS);
        let mut result =
            ingest(&request(&msg, Site::Dharmajaya), &UniquenessPolicy::default()).unwrap();
        let last_month = msg.received_at - TimeDelta::days(5);
        let entries = [
            blocked(BlockList::Id, "3173010101010001", last_month),
            blocked(BlockList::Id, "3173010101010002", msg.received_at),
        ];

        assert_eq!(apply_blocks(&mut result, &entries, msg.received_at), 1);
        assert!(result.records[0].is_ok());
        assert_eq!(result.records[1].errors[0].kind, FieldErrorKind::Blocked);
    }

    #[tokio::test]
    async fn blocklist_runs_before_prior_lookup() {
        let store = MemoryStore::new();
        let policy = UniquenessPolicy::default();
        let first = message("alice", TWO_RECORDS);
        let stored = ingest(&request(&first, Site::Dharmajaya), &policy).unwrap();
        store.persist(&stored, TWO_RECORDS).await.unwrap();
        store
            .block(&blocked(BlockList::Id, "3173010101010001", first.received_at))
            .await
            .unwrap();

        let again = message("bob", TWO_RECORDS);
        let mut result = ingest(&request(&again, Site::Dharmajaya), &policy).unwrap();
        let touched = DuplicateChecker::new(store.as_ref(), &policy)
            .check(&mut result)
            .await
            .unwrap();

        assert_eq!(touched, 2);
        assert_eq!(result.records[0].status, RecordStatus::SkipFormat);
        assert!(result.records[0].duplicate.is_none());
        assert_eq!(result.records[1].status, RecordStatus::SkipDuplicate);
        assert_eq!(result.stats.skip_format, 1);
        assert_eq!(result.stats.skip_duplicate, 1);
    }
}
