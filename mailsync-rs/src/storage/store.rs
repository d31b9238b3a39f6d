//! SQLite-backed message store
//!
//! The engine's view of the relational store: read one account and the
//! contact index, load the existing external keys, bulk-insert message
//! rows, and stamp the last successful sync.
//!
//! Message identity is append-only: an external key, once persisted, is
//! never reused or overwritten (UNIQUE constraint per account).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::Result;

/// A mail account, read once per sync run.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// A decoded message ready for insertion.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub account_id: i64,
    /// `folder:UID`, globally unique per account. The dedup key.
    pub external_key: String,
    /// Canonical local folder tag (`inbox`/`sent`).
    pub folder: String,
    /// `inbound`/`outbound`.
    pub direction: String,
    pub from_addr: String,
    pub to_addr: String,
    pub subject: String,
    pub contact_id: Option<i64>,
    pub message_ts: DateTime<Utc>,
}

/// Message store over a SQLite pool.
#[derive(Clone)]
pub struct MessageStore {
    pub db: Arc<SqlitePool>,
}

impl MessageStore {
    /// Open the store and create tables if needed.
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                username TEXT NOT NULL,
                secret TEXT NOT NULL,
                last_sync_at TEXT
            )
            "#,
        )
        .execute(&db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                external_key TEXT NOT NULL,
                folder TEXT NOT NULL,
                direction TEXT NOT NULL,
                from_addr TEXT NOT NULL,
                to_addr TEXT NOT NULL,
                subject TEXT NOT NULL,
                contact_id INTEGER,
                message_ts TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (account_id, external_key)
            )
            "#,
        )
        .execute(&db)
        .await?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Add an account; returns its id.
    pub async fn add_account(
        &self,
        host: &str,
        port: u16,
        username: &str,
        secret: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO accounts (host, port, username, secret) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(host)
        .bind(port as i64)
        .bind(username)
        .bind(secret)
        .execute(&*self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch one account by id.
    pub async fn account(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, host, port, username, secret, last_sync_at FROM accounts WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            host: row.get("host"),
            port: row.get::<i64, _>("port") as u16,
            username: row.get("username"),
            secret: row.get("secret"),
            last_sync_at: row
                .get::<Option<String>, _>("last_sync_at")
                .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
        }))
    }

    /// Add a contact; returns its id.
    pub async fn add_contact(&self, name: &str, email: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO contacts (name, email) VALUES (?1, ?2)")
            .bind(name)
            .bind(email)
            .execute(&*self.db)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Lowercased email -> contact id, for sender correlation.
    pub async fn contact_email_index(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT id, email FROM contacts WHERE email != ''")
            .fetch_all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<String, _>("email").to_lowercase(),
                    row.get::<i64, _>("id"),
                )
            })
            .collect())
    }

    /// Every external key already persisted for the account.
    pub async fn existing_keys(&self, account_id: i64) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT external_key FROM messages WHERE account_id = ?1")
            .bind(account_id)
            .fetch_all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("external_key"))
            .collect())
    }

    /// Whether any rows exist for this account+folder. Decides the
    /// lookback window (a never-synced folder gets the full window).
    pub async fn folder_has_rows(&self, account_id: i64, folder: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM messages WHERE account_id = ?1 AND folder = ?2",
        )
        .bind(account_id)
        .bind(folder)
        .fetch_one(&*self.db)
        .await?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    /// Insert one batch of rows in a single transaction. All-or-nothing:
    /// a failed batch inserts no rows and is retried by a later run.
    pub async fn insert_messages(&self, rows: &[MessageRecord]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;

        for record in rows {
            sqlx::query(
                r#"
                INSERT INTO messages
                    (account_id, external_key, folder, direction,
                     from_addr, to_addr, subject, contact_id, message_ts, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(record.account_id)
            .bind(&record.external_key)
            .bind(&record.folder)
            .bind(&record.direction)
            .bind(&record.from_addr)
            .bind(&record.to_addr)
            .bind(&record.subject)
            .bind(record.contact_id)
            .bind(record.message_ts.to_rfc3339())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Inserted batch of {} messages", rows.len());
        Ok(rows.len())
    }

    /// Stamp the account's last successful sync. Called exactly once per
    /// completed run.
    pub async fn update_last_sync(&self, account_id: i64, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_sync_at = ?1 WHERE id = ?2")
            .bind(ts.to_rfc3339())
            .bind(account_id)
            .execute(&*self.db)
            .await?;

        info!("Account {} last sync updated", account_id);
        Ok(())
    }

    /// Total message rows for an account.
    pub async fn message_count(&self, account_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE account_id = ?1")
            .bind(account_id)
            .fetch_one(&*self.db)
            .await?;

        Ok(row.get("n"))
    }
}
