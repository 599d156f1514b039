//! Lifecycle timestamps shared by every soft-deletable entity.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Creation, update and soft-deletion timestamps.
///
/// Embedded by value in each entity. `deleted_at` is only ever cleared by
/// [`SoftDeleteState::restore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteState {
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// When the row was soft-deleted, if it was.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDeleteState {
    /// Fresh state for a row created at `now`.
    #[must_use]
    pub const fn created(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the row is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Mark deleted at `now`. Deleting twice keeps the first timestamp.
    #[must_use]
    pub const fn soft_delete(self, now: DateTime<Utc>) -> Self {
        if self.deleted_at.is_some() {
            return self;
        }
        Self {
            created_at: self.created_at,
            updated_at: now,
            deleted_at: Some(now),
        }
    }

    /// Clear the deletion mark.
    #[must_use]
    pub const fn restore(self, now: DateTime<Utc>) -> Self {
        if self.deleted_at.is_none() {
            return self;
        }
        Self {
            created_at: self.created_at,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Read the `created_at`, `updated_at` and `deleted_at` columns of a row.
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            created_at: millis_column(row, "created_at")?,
            updated_at: millis_column(row, "updated_at")?,
            deleted_at: row
                .try_get::<Option<i64>, _>("deleted_at")?
                .map(|ms| millis_to_datetime("deleted_at", ms))
                .transpose()?,
        })
    }
}

/// Column list matching [`SoftDeleteState::from_row`].
pub(crate) const LIFECYCLE_COLUMNS: &str = "created_at, updated_at, deleted_at";

/// Current time truncated to the millisecond precision used in storage.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}

fn millis_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let ms: i64 = row.try_get(column)?;
    millis_to_datetime(column, ms)
}

fn millis_to_datetime(column: &str, ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("invalid timestamp: {ms}").into(),
        })
}
