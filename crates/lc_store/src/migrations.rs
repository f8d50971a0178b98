//! Schema, applied idempotently at open.
//!
//! Journal mode is set on the connection options, never here: SQLite refuses
//! to change `journal_mode` inside a transaction.

use sqlx::SqlitePool;

use crate::error::StoreError;

pub const SCHEMA_VERSION: i64 = 1;

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS meta (
        key   TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS accounts (
        account_id                TEXT PRIMARY KEY NOT NULL,
        username                  TEXT NOT NULL,
        first_name                TEXT,
        last_name                 TEXT,
        bio                       TEXT,
        avatar_url                TEXT NOT NULL DEFAULT '',
        signature_public_key      BLOB NOT NULL,
        signature_private_key_enc TEXT NOT NULL,
        version                   INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS contacts (
        contact_id                TEXT PRIMARY KEY NOT NULL,
        username                  TEXT NOT NULL,
        first_name                TEXT,
        last_name                 TEXT,
        bio                       TEXT,
        avatar_url                TEXT NOT NULL DEFAULT '',
        status                    TEXT NOT NULL,
        own_kem_public_key        BLOB,
        own_kem_secret_key_enc    TEXT,
        peer_signature_public_key BLOB,
        peer_kem_public_key       BLOB,
        version                   INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status)",
    // No foreign key to contacts: rows must survive contact deletion.
    "CREATE TABLE IF NOT EXISTS seen_handshakes (
        digest     TEXT PRIMARY KEY NOT NULL,
        contact_id TEXT NOT NULL,
        seen_at    INTEGER NOT NULL
    )",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    for stmt in STATEMENTS {
        sqlx::query(stmt)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
    }
    sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?)")
        .bind(SCHEMA_VERSION.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
