//! Relational schema for sessions and threaded messages.

use sqlx::SqlitePool;
use tracing::info;

use crate::core::errors::StoreResult;

/// Table holding chat sessions.
pub const SESSIONS_TABLE: &str = "chat_sessions";
/// Table holding chat messages.
pub const MESSAGES_TABLE: &str = "chat_messages";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chat_sessions (
    id TEXT PRIMARY KEY,
    title TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_chat_sessions_deleted
    ON chat_sessions (deleted_at);

CREATE TABLE IF NOT EXISTS chat_messages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES chat_sessions (id),
    parent_id TEXT REFERENCES chat_messages (id),
    role TEXT NOT NULL,
    hidden INTEGER,
    parts TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_chat_messages_session
    ON chat_messages (session_id, deleted_at);
CREATE INDEX IF NOT EXISTS idx_chat_messages_parent
    ON chat_messages (parent_id);

CREATE TRIGGER IF NOT EXISTS chat_messages_session_immutable
BEFORE UPDATE OF session_id ON chat_messages
WHEN NEW.session_id <> OLD.session_id
BEGIN
    SELECT RAISE(ABORT, 'chat_messages.session_id is immutable');
END;

CREATE TRIGGER IF NOT EXISTS chat_sessions_no_hard_delete
BEFORE DELETE ON chat_sessions
BEGIN
    SELECT RAISE(ABORT, 'chat_sessions rows are soft-deleted only');
END;

CREATE TRIGGER IF NOT EXISTS chat_messages_no_hard_delete
BEFORE DELETE ON chat_messages
BEGIN
    SELECT RAISE(ABORT, 'chat_messages rows are soft-deleted only');
END;
";

/// Create tables, indexes and triggers if they do not exist.
///
/// # Errors
/// Returns an error if a connection cannot be acquired or the DDL fails.
pub async fn migrate(writer: &SqlitePool) -> StoreResult<()> {
    sqlx::raw_sql(SCHEMA).execute(writer).await?;
    info!("Database schema ready");
    Ok(())
}
