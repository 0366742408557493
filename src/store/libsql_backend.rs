//! libSQL backend for the registration store and the admin desk.
//!
//! Supports local file and in-memory databases. A single connection is
//! shared, so every write takes `write_lock`: a lone statement issued while
//! another task holds an open transaction would otherwise join it and be
//! rolled back with it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::intake::card_type::card_type_label;
use crate::intake::{Field, IngestionResult, ParsedFields, PriorRecord, PriorValues};
use crate::schedule::format_day_key;
use crate::store::migrations;
use crate::store::traits::{
    AdminDesk, BlockList, BlockedEntry, BroadcastRequest, Contact, DayRecap, ExportReceipt,
    RegistrationStore, SenderTally, StoredRecord,
};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed precision keeps text ordering chronological.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_day(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Serialization(format!("bad day key {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s:?}: {e}")))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn field_column(field: Field) -> &'static str {
    match field {
        Field::Name => "name",
        Field::Card => "card",
        Field::Id => "id_number",
        Field::Family => "family",
        Field::BirthDate => "birth_date",
        Field::Location => "site_context",
    }
}

/// Map a `(value, reason, created_at)` row to a blocklist entry.
fn row_to_blocked(list: BlockList, row: &libsql::Row) -> Result<BlockedEntry, DatabaseError> {
    Ok(BlockedEntry {
        list,
        value: row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("row_to_blocked: {e}")))?,
        reason: row.get::<String>(1).ok(),
        created_at: parse_datetime(&row.get::<String>(2).unwrap_or_default()),
    })
}

const RECORD_COLUMNS: &str = "id, message_id, sender, day_key, received_at, name, card, id_number, family, birth_date, site_context, card_type";

/// Map a libsql Row to a StoredRecord. Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<StoredRecord, DatabaseError> {
    let get = |i: i32| {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::Query(format!("row_to_record column {i}: {e}")))
    };
    let birth_date = row
        .get::<String>(9)
        .ok()
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());

    Ok(StoredRecord {
        id: parse_uuid(&get(0)?)?,
        message_id: parse_uuid(&get(1)?)?,
        sender: get(2)?,
        day_key: parse_day(&get(3)?)?,
        received_at: parse_datetime(&get(4)?),
        fields: ParsedFields {
            name: get(5)?,
            card: get(6)?,
            id: get(7)?,
            family: get(8)?,
            birth_date,
            site_context: row.get::<String>(10).ok(),
        },
        card_type: get(11)?,
    })
}

#[async_trait]
impl RegistrationStore for LibSqlBackend {
    // ── Duplicate lookup ────────────────────────────────────────────

    async fn find_priors(
        &self,
        day_key: NaiveDate,
        lookups: &[(Field, String)],
    ) -> Result<Vec<PriorRecord>, DatabaseError> {
        let conn = self.conn();
        let day = format_day_key(day_key);
        let mut seen = HashSet::new();
        let mut priors = Vec::new();

        for (field, value) in lookups {
            let sql = match field {
                Field::Name => "SELECT id, sender, name, card, id_number, family FROM registrations
                     WHERE day_key = ?1 AND upper(name) = upper(?2)"
                    .to_string(),
                other => format!(
                    "SELECT id, sender, name, card, id_number, family FROM registrations
                     WHERE day_key = ?1 AND {} = ?2",
                    field_column(*other)
                ),
            };
            let mut rows = conn
                .query(&sql, params![day.clone(), value.clone()])
                .await
                .map_err(|e| DatabaseError::Query(format!("find_priors: {e}")))?;

            while let Some(row) = rows
                .next()
                .await
                .map_err(|e| DatabaseError::Query(format!("find_priors: {e}")))?
            {
                let id: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("find_priors: {e}")))?;
                if !seen.insert(id) {
                    continue;
                }
                priors.push(PriorRecord {
                    sender: row.get(1).unwrap_or_default(),
                    values: PriorValues {
                        name: row.get(2).unwrap_or_default(),
                        card: row.get(3).unwrap_or_default(),
                        id: row.get(4).unwrap_or_default(),
                        family: row.get(5).unwrap_or_default(),
                    },
                });
            }
        }

        Ok(priors)
    }

    async fn find_blocked(
        &self,
        list: BlockList,
        values: &[String],
    ) -> Result<Vec<BlockedEntry>, DatabaseError> {
        let mut found = Vec::new();
        for value in values {
            let mut rows = self
                .conn()
                .query(
                    "SELECT value, reason, created_at FROM blocklist WHERE list = ?1 AND value = ?2",
                    params![list.as_str(), value.clone()],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("find_blocked: {e}")))?;
            if let Some(row) = rows
                .next()
                .await
                .map_err(|e| DatabaseError::Query(format!("find_blocked: {e}")))?
            {
                found.push(row_to_blocked(list, &row)?);
            }
        }
        Ok(found)
    }

    // ── Persistence ─────────────────────────────────────────────────

    async fn persist(
        &self,
        result: &IngestionResult,
        raw_text: &str,
    ) -> Result<usize, DatabaseError> {
        let result_json = serde_json::to_string(result)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let day = format_day_key(result.day_key);
        let received_at = format_datetime(result.received_at);

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("persist begin: {e}")))?;

        tx.execute(
            "INSERT INTO intake_log (message_id, sender, day_key, received_at, site_context,
                total, ok_count, skip_format_count, skip_duplicate_count, raw_text, result_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                result.message_id.to_string(),
                result.sender.clone(),
                day.clone(),
                received_at.clone(),
                opt_text_owned(result.site_context.clone()),
                result.stats.total as i64,
                result.stats.ok as i64,
                result.stats.skip_format as i64,
                result.stats.skip_duplicate as i64,
                raw_text,
                result_json
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("persist intake_log: {e}")))?;

        let mut written = 0;
        for record in result.ok_records() {
            let f = &record.fields;
            tx.execute(
                "INSERT INTO registrations (id, message_id, record_index, sender, day_key,
                    received_at, name, card, id_number, family, birth_date, site_context, card_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    Uuid::new_v4().to_string(),
                    result.message_id.to_string(),
                    record.index as i64,
                    result.sender.clone(),
                    day.clone(),
                    received_at.clone(),
                    f.name.clone(),
                    f.card.clone(),
                    f.id.clone(),
                    f.family.clone(),
                    opt_text_owned(f.birth_date.map(|d| d.format("%Y-%m-%d").to_string())),
                    opt_text_owned(f.site_context.clone()),
                    card_type_label(&f.card)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("persist registrations: {e}")))?;
            written += 1;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("persist commit: {e}")))?;

        debug!(
            message_id = %result.message_id,
            sender = %result.sender,
            written,
            "Ingestion persisted"
        );
        Ok(written)
    }

    // ── Sender records ──────────────────────────────────────────────

    async fn records_for_day(
        &self,
        sender: &str,
        day_key: NaiveDate,
    ) -> Result<Vec<StoredRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM registrations
                     WHERE sender = ?1 AND day_key = ?2
                     ORDER BY received_at ASC, record_index ASC"
                ),
                params![sender, format_day_key(day_key)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("records_for_day: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("records_for_day: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }

    async fn delete_records(
        &self,
        sender: &str,
        ids: &[Uuid],
    ) -> Result<Vec<String>, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_records begin: {e}")))?;

        let mut names = Vec::new();
        for id in ids {
            let mut rows = tx
                .query(
                    "SELECT name FROM registrations WHERE id = ?1 AND sender = ?2",
                    params![id.to_string(), sender],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("delete_records: {e}")))?;
            let Some(row) = rows
                .next()
                .await
                .map_err(|e| DatabaseError::Query(format!("delete_records: {e}")))?
            else {
                continue;
            };
            names.push(row.get::<String>(0).unwrap_or_default());

            tx.execute(
                "DELETE FROM registrations WHERE id = ?1 AND sender = ?2",
                params![id.to_string(), sender],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_records: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_records commit: {e}")))?;
        debug!(sender = %sender, deleted = names.len(), "Records deleted");
        Ok(names)
    }

    async fn update_field(
        &self,
        sender: &str,
        id: Uuid,
        field: Field,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.conn();

        let sql = if field == Field::Card {
            "UPDATE registrations SET card = ?1, card_type = ?4 WHERE id = ?2 AND sender = ?3"
                .to_string()
        } else {
            format!(
                "UPDATE registrations SET {} = ?1 WHERE id = ?2 AND sender = ?3",
                field_column(field)
            )
        };
        let executed = if field == Field::Card {
            conn.execute(
                &sql,
                params![value, id.to_string(), sender, card_type_label(value)],
            )
            .await
        } else {
            conn.execute(&sql, params![value, id.to_string(), sender])
                .await
        };
        let count = executed.map_err(|e| DatabaseError::Query(format!("update_field: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "registration".to_string(),
                id: id.to_string(),
            });
        }
        debug!(sender = %sender, record_id = %id, field = %field, "Record field updated");
        Ok(())
    }

    async fn undo_last(
        &self,
        sender: &str,
        day_key: NaiveDate,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT message_id, received_at FROM registrations
                 WHERE sender = ?1 AND day_key = ?2
                 ORDER BY received_at DESC LIMIT 1",
                params![sender, format_day_key(day_key)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("undo_last: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("undo_last: {e}")))?
        else {
            return Ok(Vec::new());
        };
        let message_id: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("undo_last: {e}")))?;
        let received_at = parse_datetime(&row.get::<String>(1).unwrap_or_default());

        let age = now.signed_duration_since(received_at);
        if age.to_std().is_ok_and(|age| age > window) {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = self
            .records_for_day(sender, day_key)
            .await?
            .into_iter()
            .filter(|r| r.message_id.to_string() == message_id)
            .map(|r| r.id)
            .collect();
        self.delete_records(sender, &ids).await
    }
}

#[async_trait]
impl AdminDesk for LibSqlBackend {
    // ── Recap ───────────────────────────────────────────────────────

    async fn recap(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DayRecap>, DatabaseError> {
        let conn = self.conn();
        let (from, to) = (format_day_key(from), format_day_key(to));

        let mut rows = conn
            .query(
                "SELECT day_key, COALESCE(site_context, '-'), COUNT(*) FROM registrations
                 WHERE day_key BETWEEN ?1 AND ?2
                 GROUP BY day_key, site_context",
                params![from.clone(), to.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recap: {e}")))?;

        let mut days: BTreeMap<NaiveDate, DayRecap> = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recap: {e}")))?
        {
            let day = parse_day(&row.get::<String>(0).unwrap_or_default())?;
            let site: String = row.get(1).unwrap_or_default();
            let count = row.get::<i64>(2).unwrap_or(0) as usize;
            let entry = days.entry(day).or_insert_with(|| DayRecap {
                day_key: day,
                total: 0,
                senders: 0,
                by_site: Vec::new(),
            });
            entry.total += count;
            entry.by_site.push((site, count));
        }

        let mut rows = conn
            .query(
                "SELECT day_key, COUNT(DISTINCT sender) FROM registrations
                 WHERE day_key BETWEEN ?1 AND ?2 GROUP BY day_key",
                params![from, to],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recap senders: {e}")))?;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recap senders: {e}")))?
        {
            let day = parse_day(&row.get::<String>(0).unwrap_or_default())?;
            if let Some(entry) = days.get_mut(&day) {
                entry.senders = row.get::<i64>(1).unwrap_or(0) as usize;
            }
        }

        Ok(days
            .into_values()
            .map(|mut d| {
                d.by_site.sort();
                d
            })
            .collect())
    }

    async fn senders_for_day(&self, day_key: NaiveDate) -> Result<Vec<SenderTally>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT sender, COUNT(*) FROM registrations WHERE day_key = ?1
                 GROUP BY sender ORDER BY MIN(received_at), sender",
                params![format_day_key(day_key)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("senders_for_day: {e}")))?;

        let mut tallies = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("senders_for_day: {e}")))?
        {
            tallies.push(SenderTally {
                sender: row.get(0).unwrap_or_default(),
                records: row.get::<i64>(1).unwrap_or(0) as usize,
            });
        }
        Ok(tallies)
    }

    // ── Contacts ────────────────────────────────────────────────────

    async fn list_contacts(&self) -> Result<Vec<Contact>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT phone, name FROM contacts ORDER BY name, phone", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_contacts: {e}")))?;

        let mut contacts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_contacts: {e}")))?
        {
            contacts.push(Contact {
                phone: row.get(0).unwrap_or_default(),
                name: row.get(1).unwrap_or_default(),
            });
        }
        Ok(contacts)
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<(), DatabaseError> {
        let now = format_datetime(Utc::now());
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO contacts (phone, name, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (phone) DO UPDATE SET name = ?2, updated_at = ?3",
                params![contact.phone.clone(), contact.name.clone(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_contact: {e}")))?;
        Ok(())
    }

    async fn delete_contact(&self, phone: &str) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute("DELETE FROM contacts WHERE phone = ?1", params![phone])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_contact: {e}")))?;
        Ok(count > 0)
    }

    // ── Blocklists ──────────────────────────────────────────────────

    async fn list_blocked(&self, list: BlockList) -> Result<Vec<BlockedEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value, reason, created_at FROM blocklist WHERE list = ?1 ORDER BY value",
                params![list.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_blocked: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_blocked: {e}")))?
        {
            entries.push(row_to_blocked(list, &row)?);
        }
        Ok(entries)
    }

    async fn block(&self, entry: &BlockedEntry) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO blocklist (list, value, reason, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (list, value) DO UPDATE SET reason = ?3, created_at = ?4",
                params![
                    entry.list.as_str(),
                    entry.value.clone(),
                    opt_text_owned(entry.reason.clone()),
                    format_datetime(entry.created_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("block: {e}")))?;
        Ok(())
    }

    async fn unblock(&self, list: BlockList, value: &str) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "DELETE FROM blocklist WHERE list = ?1 AND value = ?2",
                params![list.as_str(), value],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("unblock: {e}")))?;
        Ok(count > 0)
    }

    // ── Outbound work ───────────────────────────────────────────────

    async fn queue_broadcast(&self, request: &BroadcastRequest) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO broadcasts (id, target, text, send_at, requested_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    request.id.to_string(),
                    request.target.as_str(),
                    request.text.clone(),
                    format_datetime(request.send_at),
                    request.requested_by.clone()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue_broadcast: {e}")))?;
        Ok(())
    }

    async fn request_export(
        &self,
        day_key: NaiveDate,
        requested_by: &str,
    ) -> Result<ExportReceipt, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let conn = self.conn();
        let day = format_day_key(day_key);

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM registrations WHERE day_key = ?1",
                params![day.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("request_export: {e}")))?;
        let count = match rows.next().await {
            Ok(Some(row)) => row.get::<i64>(0).unwrap_or(0) as usize,
            Ok(None) => 0,
            Err(e) => return Err(DatabaseError::Query(format!("request_export: {e}"))),
        };

        let receipt = ExportReceipt {
            id: Uuid::new_v4(),
            day_key,
            rows: count,
        };
        conn.execute(
            "INSERT INTO export_requests (id, day_key, row_count, requested_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![receipt.id.to_string(), day, count as i64, requested_by],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("request_export: {e}")))?;
        Ok(receipt)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value: serde_json::Value =
                    serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        let now = format_datetime(Utc::now());
        let value_str =
            serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value_str, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        Ok(())
    }
}
