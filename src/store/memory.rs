//! In-memory store for tests and local runs without a database file.
//!
//! Writes can be made to fail on demand so callers can check that a failed
//! side effect leaves their own state untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::intake::card_type::card_type_label;
use crate::intake::{Field, IngestionResult, PriorRecord, PriorValues};
use crate::store::traits::{
    AdminDesk, BlockList, BlockedEntry, BroadcastRequest, Contact, DayRecap, ExportReceipt,
    RegistrationStore, SenderTally, StoredRecord,
};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredRecord>>,
    intake_log: RwLock<Vec<(IngestionResult, String)>>,
    contacts: RwLock<BTreeMap<String, String>>,
    broadcasts: RwLock<Vec<BroadcastRequest>>,
    exports: RwLock<Vec<ExportReceipt>>,
    settings: RwLock<HashMap<String, serde_json::Value>>,
    blocklist: RwLock<BTreeMap<(BlockList, String), BlockedEntry>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every mutating call return an error until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Audit entries written so far.
    pub async fn logged(&self) -> usize {
        self.intake_log.read().await.len()
    }

    pub async fn broadcasts(&self) -> Vec<BroadcastRequest> {
        self.broadcasts.read().await.clone()
    }

    fn check_write(&self, op: &str) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query(format!("{op}: write failure injected")));
        }
        Ok(())
    }

    fn check_read(&self, op: &str) -> Result<(), DatabaseError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query(format!("{op}: read failure injected")));
        }
        Ok(())
    }
}

fn matches_lookup(record: &StoredRecord, field: Field, value: &str) -> bool {
    let f = &record.fields;
    match field {
        Field::Name => f.name.to_uppercase() == value.to_uppercase(),
        Field::Card => f.card == value,
        Field::Id => f.id == value,
        Field::Family => f.family == value,
        Field::BirthDate => f
            .birth_date
            .is_some_and(|d| d.format("%Y-%m-%d").to_string() == value),
        Field::Location => f.site_context.as_deref() == Some(value),
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn find_priors(
        &self,
        day_key: NaiveDate,
        lookups: &[(Field, String)],
    ) -> Result<Vec<PriorRecord>, DatabaseError> {
        self.check_read("find_priors")?;
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.day_key == day_key)
            .filter(|r| lookups.iter().any(|(f, v)| matches_lookup(r, *f, v)))
            .map(|r| PriorRecord {
                sender: r.sender.clone(),
                values: PriorValues::from(&r.fields),
            })
            .collect())
    }

    async fn find_blocked(
        &self,
        list: BlockList,
        values: &[String],
    ) -> Result<Vec<BlockedEntry>, DatabaseError> {
        self.check_read("find_blocked")?;
        let blocklist = self.blocklist.read().await;
        Ok(values
            .iter()
            .filter_map(|v| blocklist.get(&(list, v.clone())))
            .cloned()
            .collect())
    }

    async fn persist(
        &self,
        result: &IngestionResult,
        raw_text: &str,
    ) -> Result<usize, DatabaseError> {
        self.check_write("persist")?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.extend(result.ok_records().map(|r| StoredRecord {
            id: Uuid::new_v4(),
            message_id: result.message_id,
            sender: result.sender.clone(),
            day_key: result.day_key,
            received_at: result.received_at,
            card_type: card_type_label(&r.fields.card).to_string(),
            fields: r.fields.clone(),
        }));
        self.intake_log
            .write()
            .await
            .push((result.clone(), raw_text.to_string()));
        Ok(records.len() - before)
    }

    async fn records_for_day(
        &self,
        sender: &str,
        day_key: NaiveDate,
    ) -> Result<Vec<StoredRecord>, DatabaseError> {
        self.check_read("records_for_day")?;
        let mut found: Vec<StoredRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.sender == sender && r.day_key == day_key)
            .cloned()
            .collect();
        // Stable sort keeps block order within one message.
        found.sort_by_key(|r| r.received_at);
        Ok(found)
    }

    async fn delete_records(
        &self,
        sender: &str,
        ids: &[Uuid],
    ) -> Result<Vec<String>, DatabaseError> {
        self.check_write("delete_records")?;
        let mut records = self.records.write().await;
        let mut names = Vec::new();
        records.retain(|r| {
            let doomed = r.sender == sender && ids.contains(&r.id);
            if doomed {
                names.push(r.fields.name.clone());
            }
            !doomed
        });
        Ok(names)
    }

    async fn update_field(
        &self,
        sender: &str,
        id: Uuid,
        field: Field,
        value: &str,
    ) -> Result<(), DatabaseError> {
        self.check_write("update_field")?;
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id && r.sender == sender)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "registration".to_string(),
                id: id.to_string(),
            })?;

        let f = &mut record.fields;
        match field {
            Field::Name => f.name = value.to_string(),
            Field::Card => {
                f.card = value.to_string();
                record.card_type = card_type_label(value).to_string();
            }
            Field::Id => f.id = value.to_string(),
            Field::Family => f.family = value.to_string(),
            Field::BirthDate => {
                f.birth_date = Some(NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(
                    |e| DatabaseError::Serialization(format!("bad birth date {value:?}: {e}")),
                )?)
            }
            Field::Location => f.site_context = Some(value.to_string()),
        }
        Ok(())
    }

    async fn undo_last(
        &self,
        sender: &str,
        day_key: NaiveDate,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<String>, DatabaseError> {
        let records = self.records_for_day(sender, day_key).await?;
        let Some(latest) = records.last() else {
            return Ok(Vec::new());
        };
        let age = now.signed_duration_since(latest.received_at);
        if age.to_std().is_ok_and(|age| age > window) {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = records
            .iter()
            .filter(|r| r.message_id == latest.message_id)
            .map(|r| r.id)
            .collect();
        self.delete_records(sender, &ids).await
    }
}

#[async_trait]
impl AdminDesk for MemoryStore {
    async fn recap(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DayRecap>, DatabaseError> {
        self.check_read("recap")?;
        let records = self.records.read().await;

        let mut days: BTreeMap<NaiveDate, (Vec<&str>, BTreeMap<String, usize>)> = BTreeMap::new();
        for r in records.iter().filter(|r| r.day_key >= from && r.day_key <= to) {
            let (senders, sites) = days.entry(r.day_key).or_default();
            if !senders.contains(&r.sender.as_str()) {
                senders.push(&r.sender);
            }
            let site = r.fields.site_context.clone().unwrap_or_else(|| "-".to_string());
            *sites.entry(site).or_default() += 1;
        }

        Ok(days
            .into_iter()
            .map(|(day_key, (senders, sites))| DayRecap {
                day_key,
                total: sites.values().sum(),
                senders: senders.len(),
                by_site: sites.into_iter().collect(),
            })
            .collect())
    }

    async fn senders_for_day(&self, day_key: NaiveDate) -> Result<Vec<SenderTally>, DatabaseError> {
        self.check_read("senders_for_day")?;
        let records = self.records.read().await;
        let mut day: Vec<&StoredRecord> = records.iter().filter(|r| r.day_key == day_key).collect();
        day.sort_by_key(|r| r.received_at);

        let mut tallies: Vec<SenderTally> = Vec::new();
        for r in day {
            match tallies.iter_mut().find(|t| t.sender == r.sender) {
                Some(tally) => tally.records += 1,
                None => tallies.push(SenderTally {
                    sender: r.sender.clone(),
                    records: 1,
                }),
            }
        }
        Ok(tallies)
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>, DatabaseError> {
        self.check_read("list_contacts")?;
        let mut contacts: Vec<Contact> = self
            .contacts
            .read()
            .await
            .iter()
            .map(|(phone, name)| Contact {
                phone: phone.clone(),
                name: name.clone(),
            })
            .collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.phone.cmp(&b.phone)));
        Ok(contacts)
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<(), DatabaseError> {
        self.check_write("upsert_contact")?;
        self.contacts
            .write()
            .await
            .insert(contact.phone.clone(), contact.name.clone());
        Ok(())
    }

    async fn delete_contact(&self, phone: &str) -> Result<bool, DatabaseError> {
        self.check_write("delete_contact")?;
        Ok(self.contacts.write().await.remove(phone).is_some())
    }

    async fn list_blocked(&self, list: BlockList) -> Result<Vec<BlockedEntry>, DatabaseError> {
        self.check_read("list_blocked")?;
        Ok(self
            .blocklist
            .read()
            .await
            .values()
            .filter(|e| e.list == list)
            .cloned()
            .collect())
    }

    async fn block(&self, entry: &BlockedEntry) -> Result<(), DatabaseError> {
        self.check_write("block")?;
        self.blocklist
            .write()
            .await
            .insert((entry.list, entry.value.clone()), entry.clone());
        Ok(())
    }

    async fn unblock(&self, list: BlockList, value: &str) -> Result<bool, DatabaseError> {
        self.check_write("unblock")?;
        Ok(self
            .blocklist
            .write()
            .await
            .remove(&(list, value.to_string()))
            .is_some())
    }

    async fn queue_broadcast(&self, request: &BroadcastRequest) -> Result<(), DatabaseError> {
        self.check_write("queue_broadcast")?;
        self.broadcasts.write().await.push(request.clone());
        Ok(())
    }

    async fn request_export(
        &self,
        day_key: NaiveDate,
        _requested_by: &str,
    ) -> Result<ExportReceipt, DatabaseError> {
        self.check_write("request_export")?;
        let rows = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.day_key == day_key)
            .count();
        let receipt = ExportReceipt {
            id: Uuid::new_v4(),
            day_key,
            rows,
        };
        self.exports.write().await.push(receipt.clone());
        Ok(receipt)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        self.check_read("get_setting")?;
        Ok(self.settings.read().await.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        self.check_write("set_setting")?;
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
