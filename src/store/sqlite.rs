//! SQLite-backed [`MessageStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, trace};
use uuid::Uuid;

use super::{MessageRecord, MessageStatus, MessageStore, StoreError};
use crate::entities::TaskId;

/// Schema for the `messages` table.
pub const SCHEMA_SQL: &str = include_str!("../../migrations/001_messages.sql");

type MessageRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Message store over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    db: SqlitePool,
}

impl SqliteMessageStore {
    /// Wrap an existing pool. The schema must already be applied.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open (creating if missing) a database file and apply the schema.
    ///
    /// Pass `":memory:"` for a throwaway database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot connect or the
    /// schema fails to apply.
    pub async fn open(path: &str, max_connections: u32) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        // Every connection to ":memory:" is a separate database.
        let max_connections = if path == ":memory:" {
            1
        } else {
            max_connections.max(1)
        };
        let db = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        migrate(&db).await?;
        info!(path, "message store opened");
        Ok(Self { db })
    }

    /// Returns a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

/// Apply the message schema. Idempotent.
///
/// # Errors
///
/// Returns an error if the schema statements fail.
pub async fn migrate(db: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(db).await?;
    trace!("message schema applied");
    Ok(())
}

fn decode_row(row: MessageRow) -> Result<MessageRecord, StoreError> {
    let (id, task_id, status, answer, error, created_at, updated_at) = row;
    let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt {
        field: "id",
        detail: e.to_string(),
    })?;
    let task_id = Uuid::parse_str(&task_id)
        .map(TaskId::from_uuid)
        .map_err(|e| StoreError::Corrupt {
            field: "task_id",
            detail: e.to_string(),
        })?;
    Ok(MessageRecord {
        id,
        task_id,
        status: MessageStatus::parse(&status)?,
        answer,
        error,
        created_at,
        updated_at,
    })
}

const SELECT_MESSAGE: &str = "SELECT id, task_id, status, answer, error, created_at, updated_at \
     FROM messages WHERE id = ?1";

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, record: &MessageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (id, task_id, status, answer, error, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(record.id.to_string())
        .bind(record.task_id.to_string())
        .bind(record.status.as_str())
        .bind(&record.answer)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.db)
        .await?;
        trace!(id = %record.id, task_id = %record.task_id, "message inserted");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError> {
        let row: Option<MessageRow> = sqlx::query_as(SELECT_MESSAGE)
            .bind(id.to_string())
            .fetch_optional(&self.db)
            .await?;
        row.map(decode_row).transpose()
    }

    async fn mark_failed(&self, id: Uuid, description: &str) -> Result<MessageRecord, StoreError> {
        let mut tx = self.db.begin().await?;

        let row: Option<MessageRow> = sqlx::query_as(SELECT_MESSAGE)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let mut record = row.map(decode_row).transpose()?.ok_or(StoreError::NotFound(id))?;

        record.status = MessageStatus::Error;
        record.error = Some(description.to_owned());
        record.updated_at = Utc::now();

        sqlx::query("UPDATE messages SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(record.status.as_str())
            .bind(&record.error)
            .bind(record.updated_at)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        trace!(%id, "message marked failed");
        Ok(record)
    }

    async fn save_answer(&self, id: Uuid, answer: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE messages SET answer = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(answer)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
