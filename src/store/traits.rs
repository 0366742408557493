//! Collaborator traits for persistence and the admin desk.
//!
//! The conversation engine only talks to these traits. `LibSqlBackend`
//! implements both for production; `MemoryStore` implements both for tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::intake::{Field, IngestionResult, ParsedFields, PriorRecord};
use crate::schedule::month_start;

/// A committed registration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub message_id: Uuid,
    pub sender: String,
    pub day_key: NaiveDate,
    pub received_at: DateTime<Utc>,
    pub fields: ParsedFields,
    pub card_type: String,
}

/// Per-day totals for the admin recap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecap {
    pub day_key: NaiveDate,
    pub total: usize,
    pub senders: usize,
    /// `(site context, count)`, sorted by site context.
    pub by_site: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub phone: String,
    pub name: String,
}

/// Who a queued broadcast goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastTarget {
    AllContacts,
    TodaysSenders,
}

impl BroadcastTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastTarget::AllContacts => "all_contacts",
            BroadcastTarget::TodaysSenders => "todays_senders",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub id: Uuid,
    pub target: BroadcastTarget,
    pub text: String,
    pub send_at: DateTime<Utc>,
    pub requested_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReceipt {
    pub id: Uuid,
    pub day_key: NaiveDate,
    pub rows: usize,
}

/// One sender's share of a day's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderTally {
    pub sender: String,
    pub records: usize,
}

/// An admin-maintained blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockList {
    /// ID numbers. An entry only holds during the WIB month it was added.
    Id,
    Family,
    /// Sender phone numbers, in `62…` form.
    Sender,
}

impl BlockList {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockList::Id => "id",
            BlockList::Family => "family",
            BlockList::Sender => "sender",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BlockList::Id => "KTP",
            BlockList::Family => "KK",
            BlockList::Sender => "No HP",
        }
    }

    /// The record field this list is matched against, if any.
    pub fn field(&self) -> Option<Field> {
        match self {
            BlockList::Id => Some(Field::Id),
            BlockList::Family => Some(Field::Family),
            BlockList::Sender => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedEntry {
    pub list: BlockList,
    pub value: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BlockedEntry {
    /// ID blocks lapse when the month turns; the others never do.
    pub fn in_force(&self, now: DateTime<Utc>) -> bool {
        match self.list {
            BlockList::Id => self.created_at >= month_start(now),
            BlockList::Family | BlockList::Sender => true,
        }
    }
}

/// Registration persistence and the per-day duplicate lookup.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    // ── Duplicate lookup ────────────────────────────────────────────

    /// Records stored for `day_key` matching any `(field, value)` pair.
    /// Names are compared case-insensitively.
    async fn find_priors(
        &self,
        day_key: NaiveDate,
        lookups: &[(Field, String)],
    ) -> Result<Vec<PriorRecord>, DatabaseError>;

    /// Entries on `list` whose value is one of `values`, lapsed or not.
    async fn find_blocked(
        &self,
        list: BlockList,
        values: &[String],
    ) -> Result<Vec<BlockedEntry>, DatabaseError>;

    // ── Persistence ─────────────────────────────────────────────────

    /// Store the audit entry and every `Ok` record, atomically. Returns the
    /// number of records written.
    async fn persist(&self, result: &IngestionResult, raw_text: &str)
    -> Result<usize, DatabaseError>;

    // ── Sender records ──────────────────────────────────────────────

    /// The sender's records for a day, in arrival order.
    async fn records_for_day(
        &self,
        sender: &str,
        day_key: NaiveDate,
    ) -> Result<Vec<StoredRecord>, DatabaseError>;

    /// Delete specific records owned by the sender. Returns deleted names.
    async fn delete_records(&self, sender: &str, ids: &[Uuid])
    -> Result<Vec<String>, DatabaseError>;

    /// Delete by 1-based position in [`records_for_day`] order. Positions
    /// out of range are ignored. Returns deleted names.
    ///
    /// [`records_for_day`]: RegistrationStore::records_for_day
    async fn delete_by_positions(
        &self,
        sender: &str,
        day_key: NaiveDate,
        positions: &[usize],
    ) -> Result<Vec<String>, DatabaseError> {
        let records = self.records_for_day(sender, day_key).await?;
        let ids: Vec<Uuid> = positions
            .iter()
            .filter_map(|&p| p.checked_sub(1).and_then(|i| records.get(i)))
            .map(|r| r.id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.delete_records(sender, &ids).await
    }

    /// Overwrite one field of a record owned by the sender.
    async fn update_field(
        &self,
        sender: &str,
        id: Uuid,
        field: Field,
        value: &str,
    ) -> Result<(), DatabaseError>;

    /// Delete the sender's latest submission of the day if it arrived
    /// within `window` of `now`. Returns deleted names (empty when there
    /// was nothing to undo).
    async fn undo_last(
        &self,
        sender: &str,
        day_key: NaiveDate,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<String>, DatabaseError>;
}

/// Administrative collaborator calls.
#[async_trait]
pub trait AdminDesk: Send + Sync {
    // ── Recap ───────────────────────────────────────────────────────

    /// Totals for every day in `[from, to]` that has records.
    async fn recap(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DayRecap>, DatabaseError>;

    /// Senders with records on a day, in order of their first submission.
    async fn senders_for_day(&self, day_key: NaiveDate) -> Result<Vec<SenderTally>, DatabaseError>;

    // ── Contacts ────────────────────────────────────────────────────

    async fn list_contacts(&self) -> Result<Vec<Contact>, DatabaseError>;

    /// Insert or rename a contact keyed by phone.
    async fn upsert_contact(&self, contact: &Contact) -> Result<(), DatabaseError>;

    async fn delete_contact(&self, phone: &str) -> Result<bool, DatabaseError>;

    // ── Blocklists ──────────────────────────────────────────────────

    async fn list_blocked(&self, list: BlockList) -> Result<Vec<BlockedEntry>, DatabaseError>;

    /// Insert or refresh an entry. Re-blocking restarts its month.
    async fn block(&self, entry: &BlockedEntry) -> Result<(), DatabaseError>;

    async fn unblock(&self, list: BlockList, value: &str) -> Result<bool, DatabaseError>;

    // ── Outbound work ───────────────────────────────────────────────

    async fn queue_broadcast(&self, request: &BroadcastRequest) -> Result<(), DatabaseError>;

    /// Queue a spreadsheet export of one day for the export worker.
    async fn request_export(
        &self,
        day_key: NaiveDate,
        requested_by: &str,
    ) -> Result<ExportReceipt, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError>;

    async fn set_setting(&self, key: &str, value: &serde_json::Value)
    -> Result<(), DatabaseError>;
}
