//! Threaded chat messages.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use crate::core::errors::{StoreError, StoreResult};
use crate::core::ids::{MessageId, SessionId};
use crate::store::lifecycle::{now_millis, SoftDeleteState};
use crate::store::pool::DatabasePool;
use crate::store::repository::{
    Cascade, DeleteReport, Filter, ReadOptions, SoftDeletable, SoftDeleteRepository,
};
use crate::store::schema::{MESSAGES_TABLE, SESSIONS_TABLE};
use crate::store::tree::MessageTree;

/// A message belonging to one session, optionally replying to a parent message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message identifier.
    pub id: MessageId,
    /// Owning session. Never changes after insert.
    pub session_id: SessionId,
    /// Parent message in the same session; `None` for roots.
    pub parent_id: Option<MessageId>,
    /// Free-form role, e.g. `user` or `assistant`.
    pub role: String,
    /// Visibility flag.
    pub hidden: Option<bool>,
    /// Opaque message parts.
    pub parts: Option<serde_json::Value>,
    /// Lifecycle timestamps.
    #[serde(flatten)]
    pub lifecycle: SoftDeleteState,
}

impl SoftDeletable for ChatMessage {
    type Id = MessageId;

    const TABLE: &'static str = MESSAGES_TABLE;
    const COLUMNS: &'static str = "id, session_id, parent_id, role, hidden, parts";
    const CASCADES: &'static [Cascade] = &[Cascade {
        table: MESSAGES_TABLE,
        foreign_key: "parent_id",
    }];

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let parts = row
            .try_get::<Option<String>, _>("parts")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|err| sqlx::Error::ColumnDecode {
                index: "parts".to_string(),
                source: Box::new(err),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            parent_id: row.try_get("parent_id")?,
            role: row.try_get("role")?,
            hidden: row.try_get("hidden")?,
            parts,
            lifecycle: SoftDeleteState::from_row(row)?,
        })
    }

    fn id(&self) -> MessageId {
        self.id
    }

    fn lifecycle(&self) -> &SoftDeleteState {
        &self.lifecycle
    }
}

/// Fields of a message to insert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Owning session; must exist and not be deleted.
    pub session_id: SessionId,
    /// Parent message; must be a live message of the same session.
    pub parent_id: Option<MessageId>,
    /// Free-form role.
    pub role: String,
    /// Visibility flag.
    pub hidden: Option<bool>,
    /// Opaque message parts.
    pub parts: Option<serde_json::Value>,
}

impl NewMessage {
    /// Root message with no parts.
    #[must_use]
    pub fn new(session_id: SessionId, role: impl Into<String>) -> Self {
        Self {
            session_id,
            parent_id: None,
            role: role.into(),
            hidden: None,
            parts: None,
        }
    }

    /// Set the parent message.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: MessageId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the message parts.
    #[must_use]
    pub fn with_parts(mut self, parts: serde_json::Value) -> Self {
        self.parts = Some(parts);
        self
    }

    /// Set the visibility flag.
    #[must_use]
    pub const fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }
}

/// Repository for chat messages.
#[derive(Clone)]
pub struct MessageRepository {
    messages: SoftDeleteRepository<ChatMessage>,
}

impl MessageRepository {
    /// Create a repository over the given pools.
    #[must_use]
    pub fn new(pool: &DatabasePool) -> Self {
        Self {
            messages: SoftDeleteRepository::new(pool.clone()),
        }
    }

    /// Insert a message after checking its session and parent.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the session is missing or deleted,
    /// [`StoreError::InvalidParent`] if the parent is missing, deleted, or in
    /// another session, or an error if storage access fails.
    pub async fn insert(&self, new: NewMessage) -> StoreResult<ChatMessage> {
        let message = ChatMessage {
            id: MessageId::new(),
            session_id: new.session_id,
            parent_id: new.parent_id,
            role: new.role,
            hidden: new.hidden,
            parts: new.parts,
            lifecycle: SoftDeleteState::created(now_millis()),
        };
        let parts = message
            .parts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Checks and insert share one writer transaction, so a concurrent
        // session delete either sees this row or is seen by the checks.
        let mut tx = self.messages.pool().writer.begin().await?;

        let session_live: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT deleted_at IS NULL FROM {SESSIONS_TABLE} WHERE id = ?1"
        ))
        .bind(message.session_id)
        .fetch_optional(&mut *tx)
        .await?;
        if session_live != Some(1) {
            return Err(StoreError::NotFound {
                entity: SESSIONS_TABLE,
                id: message.session_id.to_string(),
            });
        }

        if let Some(parent_id) = message.parent_id {
            let parent_session: Option<SessionId> = sqlx::query_scalar(&format!(
                "SELECT session_id FROM {MESSAGES_TABLE} WHERE id = ?1 AND deleted_at IS NULL"
            ))
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?;
            if parent_session != Some(message.session_id) {
                return Err(StoreError::InvalidParent {
                    parent: parent_id.to_string(),
                    session: message.session_id.to_string(),
                });
            }
        }

        sqlx::query(&format!(
            "INSERT INTO {MESSAGES_TABLE}
             (id, session_id, parent_id, role, hidden, parts, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)"
        ))
        .bind(message.id)
        .bind(message.session_id)
        .bind(message.parent_id)
        .bind(&message.role)
        .bind(message.hidden)
        .bind(parts)
        .bind(message.lifecycle.created_at.timestamp_millis())
        .bind(message.lifecycle.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            message_id = %message.id,
            session_id = %message.session_id,
            "Inserted chat message"
        );
        Ok(message)
    }

    /// Load a message.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn find(
        &self,
        id: MessageId,
        options: ReadOptions,
    ) -> StoreResult<Option<ChatMessage>> {
        self.messages.find(id, options).await
    }

    /// Messages of a session in creation order.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn list_for_session(
        &self,
        session_id: SessionId,
        options: ReadOptions,
    ) -> StoreResult<Vec<ChatMessage>> {
        self.messages
            .select(Filter::eq("session_id", session_id.to_string()), options)
            .await
    }

    /// Direct replies to a message.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn children(
        &self,
        parent_id: MessageId,
        options: ReadOptions,
    ) -> StoreResult<Vec<ChatMessage>> {
        self.messages
            .select(Filter::eq("parent_id", parent_id.to_string()), options)
            .await
    }

    /// Thread view of a session's messages.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn tree(
        &self,
        session_id: SessionId,
        options: ReadOptions,
    ) -> StoreResult<MessageTree> {
        let messages = self.list_for_session(session_id, options).await?;
        Ok(MessageTree::build(messages))
    }

    /// Soft-delete a message and its direct children. Grandchildren are untouched.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the message does not exist.
    pub async fn delete(&self, id: MessageId) -> StoreResult<DeleteReport> {
        self.messages.delete(id).await
    }

    /// Make a deleted message visible again. Its children stay deleted.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the message does not exist.
    pub async fn restore(&self, id: MessageId) -> StoreResult<bool> {
        self.messages.restore(id).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::test_support::temp_store;

    #[tokio::test]
    async fn test_insert_round_trips_parts() {
        let (_dir, store) = temp_store().await;
        let session = store.sessions.create(None).await.unwrap();

        let parts = json!([{"kind": "text", "content": "héllo"}]);
        let message = store
            .messages
            .insert(NewMessage::new(session.id, "user").with_parts(parts.clone()).hidden(false))
            .await
            .unwrap();

        let loaded = store
            .messages
            .find(message.id, ReadOptions::live())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.parts, Some(parts));
        assert_eq!(loaded.hidden, Some(false));
        assert_eq!(loaded, message);
    }

    #[tokio::test]
    async fn test_deleting_session_cascades_to_whole_thread() {
        let (_dir, store) = temp_store().await;
        let session = store.sessions.create(None).await.unwrap();
        let m1 = store
            .messages
            .insert(NewMessage::new(session.id, "user"))
            .await
            .unwrap();
        let m2 = store
            .messages
            .insert(NewMessage::new(session.id, "assistant").with_parent(m1.id))
            .await
            .unwrap();

        let report = store.sessions.delete(session.id).await.unwrap();
        assert_eq!(report.cascaded, 2);

        let all = store
            .messages
            .list_for_session(session.id, ReadOptions::include_deleted())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|m| m.lifecycle.is_deleted()));
        let stamp = store
            .sessions
            .find(session.id, ReadOptions::include_deleted())
            .await
            .unwrap()
            .unwrap()
            .lifecycle
            .deleted_at;
        assert!(all.iter().all(|m| m.lifecycle.deleted_at == stamp));
        assert!(all.iter().any(|m| m.id == m2.id));
    }

    #[tokio::test]
    async fn test_deleting_message_cascades_one_level() {
        let (_dir, store) = temp_store().await;
        let session = store.sessions.create(None).await.unwrap();
        let m1 = store
            .messages
            .insert(NewMessage::new(session.id, "user"))
            .await
            .unwrap();
        let m2 = store
            .messages
            .insert(NewMessage::new(session.id, "assistant").with_parent(m1.id))
            .await
            .unwrap();
        let m3 = store
            .messages
            .insert(NewMessage::new(session.id, "user"))
            .await
            .unwrap();
        let grandchild = store
            .messages
            .insert(NewMessage::new(session.id, "user").with_parent(m2.id))
            .await
            .unwrap();

        let report = store.messages.delete(m1.id).await.unwrap();
        assert!(report.deleted);
        assert_eq!(report.cascaded, 1);

        let live: Vec<_> = store
            .messages
            .list_for_session(session.id, ReadOptions::live())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(live, vec![m3.id, grandchild.id]);

        assert!(store
            .sessions
            .find(session.id, ReadOptions::live())
            .await
            .unwrap()
            .is_some());
        assert!(store
            .messages
            .children(m1.id, ReadOptions::live())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .messages
                .children(m1.id, ReadOptions::include_deleted())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_restore_message_leaves_children_deleted() {
        let (_dir, store) = temp_store().await;
        let session = store.sessions.create(None).await.unwrap();
        let m1 = store
            .messages
            .insert(NewMessage::new(session.id, "user"))
            .await
            .unwrap();
        let m2 = store
            .messages
            .insert(NewMessage::new(session.id, "assistant").with_parent(m1.id))
            .await
            .unwrap();

        store.messages.delete(m1.id).await.unwrap();
        assert!(store.messages.restore(m1.id).await.unwrap());
        assert!(!store.messages.restore(m1.id).await.unwrap());

        assert!(store
            .messages
            .find(m1.id, ReadOptions::live())
            .await
            .unwrap()
            .is_some());
        assert!(store
            .messages
            .find(m2.id, ReadOptions::live())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_missing_or_deleted_session() {
        let (_dir, store) = temp_store().await;

        let err = store
            .messages
            .insert(NewMessage::new(SessionId::new(), "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let session = store.sessions.create(None).await.unwrap();
        store.sessions.delete(session.id).await.unwrap();
        let err = store
            .messages
            .insert(NewMessage::new(session.id, "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_insert_rejects_parent_from_other_session() {
        let (_dir, store) = temp_store().await;
        let first = store.sessions.create(None).await.unwrap();
        let second = store.sessions.create(None).await.unwrap();
        let foreign = store
            .messages
            .insert(NewMessage::new(first.id, "user"))
            .await
            .unwrap();

        let err = store
            .messages
            .insert(NewMessage::new(second.id, "assistant").with_parent(foreign.id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent { .. }));

        let err = store
            .messages
            .insert(NewMessage::new(second.id, "assistant").with_parent(MessageId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent { .. }));
    }

    #[tokio::test]
    async fn test_session_reference_is_immutable() {
        let (_dir, store) = temp_store().await;
        let first = store.sessions.create(None).await.unwrap();
        let second = store.sessions.create(None).await.unwrap();
        let message = store
            .messages
            .insert(NewMessage::new(first.id, "user"))
            .await
            .unwrap();

        let result = sqlx::query("UPDATE chat_messages SET session_id = ?1 WHERE id = ?2")
            .bind(second.id)
            .bind(message.id)
            .execute(&store.pool().writer)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tree_reflects_read_options() {
        let (_dir, store) = temp_store().await;
        let session = store.sessions.create(None).await.unwrap();
        let root = store
            .messages
            .insert(NewMessage::new(session.id, "user"))
            .await
            .unwrap();
        let reply = store
            .messages
            .insert(NewMessage::new(session.id, "assistant").with_parent(root.id))
            .await
            .unwrap();
        store.messages.delete(reply.id).await.unwrap();

        let live = store.messages.tree(session.id, ReadOptions::live()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live.children(root.id).count(), 0);

        let all = store
            .messages
            .tree(session.id, ReadOptions::include_deleted())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.children(root.id).map(|m| m.id).collect::<Vec<_>>(), vec![reply.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_on_one_session_all_commit() {
        let (_dir, store) = temp_store().await;
        let session = store.sessions.create(None).await.unwrap();

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.messages.insert(NewMessage::new(session.id, "user")).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store
            .messages
            .list_for_session(session.id, ReadOptions::live())
            .await
            .unwrap();
        assert_eq!(stored.len(), 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_session_deletes_racing_inserts_leave_no_live_orphans() {
        let (_dir, store) = temp_store().await;
        let mut sessions = Vec::new();
        for _ in 0..8 {
            sessions.push(store.sessions.create(None).await.unwrap().id);
        }

        let mut inserts = Vec::new();
        let mut deletes = Vec::new();
        for session_id in sessions.iter().copied() {
            for _ in 0..20 {
                let store = store.clone();
                inserts.push(tokio::spawn(async move {
                    store.messages.insert(NewMessage::new(session_id, "user")).await
                }));
            }
            let store = store.clone();
            deletes.push(tokio::spawn(async move { store.sessions.delete(session_id).await }));
        }

        for handle in inserts {
            match handle.await.unwrap() {
                Ok(_) | Err(StoreError::NotFound { .. }) => {}
                Err(other) => panic!("insert failed with {other}"),
            }
        }
        for handle in deletes {
            assert!(handle.await.unwrap().unwrap().deleted);
        }

        for session_id in sessions {
            let live = store
                .messages
                .list_for_session(session_id, ReadOptions::live())
                .await
                .unwrap();
            assert!(live.is_empty());
        }
    }
}
