//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS registrations (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                record_index INTEGER NOT NULL,
                sender TEXT NOT NULL,
                day_key TEXT NOT NULL,
                received_at TEXT NOT NULL,
                name TEXT NOT NULL,
                card TEXT NOT NULL,
                id_number TEXT NOT NULL,
                family TEXT NOT NULL,
                birth_date TEXT,
                site_context TEXT,
                card_type TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_registrations_day_sender
                ON registrations(day_key, sender);
            CREATE INDEX IF NOT EXISTS idx_registrations_day_card ON registrations(day_key, card);
            CREATE INDEX IF NOT EXISTS idx_registrations_day_id ON registrations(day_key, id_number);
            CREATE INDEX IF NOT EXISTS idx_registrations_day_family
                ON registrations(day_key, family);

            CREATE TABLE IF NOT EXISTS intake_log (
                message_id TEXT PRIMARY KEY,
                sender TEXT NOT NULL,
                day_key TEXT NOT NULL,
                received_at TEXT NOT NULL,
                site_context TEXT,
                total INTEGER NOT NULL,
                ok_count INTEGER NOT NULL,
                skip_format_count INTEGER NOT NULL,
                skip_duplicate_count INTEGER NOT NULL,
                raw_text TEXT NOT NULL,
                result_json TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_intake_log_day ON intake_log(day_key);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "#,
    },
    Migration {
        version: 2,
        name: "admin_desk",
        sql: r#"
            CREATE TABLE IF NOT EXISTS contacts (
                phone TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS broadcasts (
                id TEXT PRIMARY KEY,
                target TEXT NOT NULL,
                text TEXT NOT NULL,
                send_at TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_broadcasts_status ON broadcasts(status, send_at);

            CREATE TABLE IF NOT EXISTS export_requests (
                id TEXT PRIMARY KEY,
                day_key TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                requested_by TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "#,
    },
    Migration {
        version: 3,
        name: "blocklist",
        sql: r#"
            CREATE TABLE IF NOT EXISTS blocklist (
                list TEXT NOT NULL,
                value TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (list, value)
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::debug!(
        version = get_current_version(conn).await?,
        "Database migrations complete"
    );

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
