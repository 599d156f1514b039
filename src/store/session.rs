//! Chat sessions.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::core::errors::{StoreError, StoreResult};
use crate::core::ids::SessionId;
use crate::store::lifecycle::{now_millis, SoftDeleteState};
use crate::store::message::ChatMessage;
use crate::store::pool::DatabasePool;
use crate::store::repository::{
    Cascade, DeleteReport, Filter, ReadOptions, SoftDeletable, SoftDeleteRepository,
};
use crate::store::schema::{MESSAGES_TABLE, SESSIONS_TABLE};

/// Title given to sessions created without one.
pub const DEFAULT_TITLE: &str = "New chat";

/// A conversation owning zero or more messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Session identifier.
    pub id: SessionId,
    /// Display title.
    pub title: Option<String>,
    /// Lifecycle timestamps.
    #[serde(flatten)]
    pub lifecycle: SoftDeleteState,
}

impl SoftDeletable for ChatSession {
    type Id = SessionId;

    const TABLE: &'static str = SESSIONS_TABLE;
    const COLUMNS: &'static str = "id, title";
    const CASCADES: &'static [Cascade] = &[Cascade {
        table: MESSAGES_TABLE,
        foreign_key: "session_id",
    }];

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            lifecycle: SoftDeleteState::from_row(row)?,
        })
    }

    fn id(&self) -> SessionId {
        self.id
    }

    fn lifecycle(&self) -> &SoftDeleteState {
        &self.lifecycle
    }
}

/// A session together with the messages visible under the same read options.
#[derive(Clone, Debug, Serialize)]
pub struct SessionWithMessages {
    /// The session row.
    pub session: ChatSession,
    /// Its messages in creation order.
    pub messages: Vec<ChatMessage>,
}

/// Repository for chat sessions.
#[derive(Clone)]
pub struct SessionRepository {
    sessions: SoftDeleteRepository<ChatSession>,
    messages: SoftDeleteRepository<ChatMessage>,
}

impl SessionRepository {
    /// Create a repository over the given pools.
    #[must_use]
    pub fn new(pool: &DatabasePool) -> Self {
        Self {
            sessions: SoftDeleteRepository::new(pool.clone()),
            messages: SoftDeleteRepository::new(pool.clone()),
        }
    }

    /// Insert a new session. A missing title falls back to [`DEFAULT_TITLE`].
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn create(&self, title: Option<String>) -> StoreResult<ChatSession> {
        let session = ChatSession {
            id: SessionId::new(),
            title: Some(title.unwrap_or_else(|| DEFAULT_TITLE.to_string())),
            lifecycle: SoftDeleteState::created(now_millis()),
        };

        sqlx::query(&format!(
            "INSERT INTO {SESSIONS_TABLE} (id, title, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, NULL)"
        ))
        .bind(session.id)
        .bind(&session.title)
        .bind(session.lifecycle.created_at.timestamp_millis())
        .bind(session.lifecycle.updated_at.timestamp_millis())
        .execute(&self.sessions.pool().writer)
        .await?;

        tracing::debug!(session_id = %session.id, "Created chat session");
        Ok(session)
    }

    /// Load a session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn find(
        &self,
        id: SessionId,
        options: ReadOptions,
    ) -> StoreResult<Option<ChatSession>> {
        self.sessions.find(id, options).await
    }

    /// List sessions in creation order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list(&self, options: ReadOptions) -> StoreResult<Vec<ChatSession>> {
        self.sessions.select(Filter::all(), options).await
    }

    /// Load a session and its messages. Both reads honour `options`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn load_with_messages(
        &self,
        id: SessionId,
        options: ReadOptions,
    ) -> StoreResult<Option<SessionWithMessages>> {
        let Some(session) = self.sessions.find(id, options).await? else {
            return Ok(None);
        };
        let messages = self
            .messages
            .select(Filter::eq("session_id", id.to_string()), options)
            .await?;
        Ok(Some(SessionWithMessages { session, messages }))
    }

    /// Change the title of a live session.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the session is missing or deleted.
    pub async fn set_title(&self, id: SessionId, title: impl Into<String>) -> StoreResult<()> {
        let title: String = title.into();
        let changed = sqlx::query(&format!(
            "UPDATE {SESSIONS_TABLE} SET title = ?1, updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL"
        ))
        .bind(title)
        .bind(now_millis().timestamp_millis())
        .bind(id)
        .execute(&self.sessions.pool().writer)
        .await?
        .rows_affected();

        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: SESSIONS_TABLE,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Soft-delete a session and all of its messages.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the session does not exist.
    pub async fn delete(&self, id: SessionId) -> StoreResult<DeleteReport> {
        self.sessions.delete(id).await
    }

    /// Make a deleted session visible again. Its messages stay deleted.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the session does not exist.
    pub async fn restore(&self, id: SessionId) -> StoreResult<bool> {
        self.sessions.restore(id).await
    }
}
