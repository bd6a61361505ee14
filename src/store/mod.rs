//! Message persistence.
//!
//! The pipeline only needs to read a message back by id and mark it failed;
//! [`MessageStore`] is that seam. [`sqlite::SqliteMessageStore`] is the
//! sqlx-backed implementation.

pub mod sqlite;

pub use self::sqlite::SqliteMessageStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::TaskId;

/// Lifecycle status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Generated (or generating) normally.
    #[default]
    Normal,
    /// Generation failed; see [`MessageRecord::error`].
    Error,
}

impl MessageStatus {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Error => "error",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "normal" => Ok(Self::Normal),
            "error" => Ok(Self::Error),
            other => Err(StoreError::InvalidEnum {
                field: "status",
                value: other.to_owned(),
            }),
        }
    }
}

/// A persisted message produced by a generation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message id.
    pub id: Uuid,
    /// Task that produced the message.
    pub task_id: TaskId,
    /// Current status.
    pub status: MessageStatus,
    /// Answer text generated so far.
    pub answer: String,
    /// Failure description, set when `status` is [`MessageStatus::Error`].
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    /// A fresh, normal, empty message for a task.
    pub fn new(task_id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            status: MessageStatus::Normal,
            answer: String::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Errors from message persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No message with the given id.
    #[error("message {0} not found")]
    NotFound(Uuid),

    /// An invalid enum value was read from the database.
    #[error("invalid {field} value: {value:?}")]
    InvalidEnum {
        /// Which field contained the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },

    /// A stored column could not be decoded.
    #[error("corrupt {field} column: {detail}")]
    Corrupt {
        /// Which column.
        field: &'static str,
        /// Decode failure.
        detail: String,
    },
}

/// Persistence operations the pipeline relies on.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a new message record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    async fn insert(&self, record: &MessageRecord) -> Result<(), StoreError>;

    /// Fetch the canonical record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or decode failure.
    async fn get(&self, id: Uuid) -> Result<Option<MessageRecord>, StoreError>;

    /// Re-fetch the record, mark it errored with `description`, and commit.
    ///
    /// Returns the updated record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    async fn mark_failed(&self, id: Uuid, description: &str) -> Result<MessageRecord, StoreError>;

    /// Store the final answer text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    async fn save_answer(&self, id: Uuid, answer: &str) -> Result<(), StoreError>;
}
