//! Soft-delete policy shared by every entity repository.
//!
//! Entities opt in by implementing [`SoftDeletable`]. Every read made through
//! [`SoftDeleteRepository`] excludes rows with `deleted_at` set unless the
//! caller passes [`ReadOptions::include_deleted`], and every delete is turned
//! into an `UPDATE` of `deleted_at` plus the entity's one-level cascades,
//! committed in a single transaction.

use std::fmt::Display;
use std::marker::PhantomData;

use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::core::errors::{StoreError, StoreResult};
use crate::store::lifecycle::{now_millis, SoftDeleteState, LIFECYCLE_COLUMNS};
use crate::store::pool::DatabasePool;

/// Dependent rows soft-deleted together with their owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cascade {
    /// Table holding the dependent rows.
    pub table: &'static str,
    /// Column referencing the owner's `id`.
    pub foreign_key: &'static str,
}

/// Capability of an entity stored with lifecycle columns.
///
/// The table must have an `id` primary key and the `created_at`,
/// `updated_at`, `deleted_at` columns stored as epoch milliseconds.
pub trait SoftDeletable: Sized + Send + 'static {
    /// Identifier type bound to the `id` column.
    type Id: Display + Copy + Send + Sync + 'static;

    /// Table name.
    const TABLE: &'static str;
    /// Entity columns read by [`SoftDeletable::from_row`], before the lifecycle columns.
    const COLUMNS: &'static str;
    /// Dependents soft-deleted when a row of this table is deleted.
    const CASCADES: &'static [Cascade];

    /// Decode a row selected with `COLUMNS` followed by the lifecycle columns.
    ///
    /// # Errors
    /// Returns an error if a column has an unexpected type or value.
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error>;

    /// Row identifier.
    fn id(&self) -> Self::Id;

    /// Lifecycle timestamps.
    fn lifecycle(&self) -> &SoftDeleteState;

    /// Whether the row is soft-deleted.
    fn is_deleted(&self) -> bool {
        self.lifecycle().is_deleted()
    }
}

/// Per-query visibility of soft-deleted rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    include_deleted: bool,
}

impl ReadOptions {
    /// Only rows that are not soft-deleted.
    #[must_use]
    pub const fn live() -> Self {
        Self {
            include_deleted: false,
        }
    }

    /// Soft-deleted rows are returned too.
    #[must_use]
    pub const fn include_deleted() -> Self {
        Self {
            include_deleted: true,
        }
    }

    /// Whether soft-deleted rows are visible.
    #[must_use]
    pub const fn includes_deleted(self) -> bool {
        self.include_deleted
    }
}

/// Value bound to a [`Filter`] placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterValue {
    /// TEXT parameter.
    Text(String),
    /// INTEGER parameter.
    Integer(i64),
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// `WHERE` clause with positional parameters.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    conditions: Vec<String>,
    params: Vec<FilterValue>,
}

impl Filter {
    /// Match every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match rows where `column = value`.
    #[must_use]
    pub fn eq(column: &'static str, value: impl Into<FilterValue>) -> Self {
        Self::all().and_eq(column, value)
    }

    /// Add a `column = value` condition.
    #[must_use]
    pub fn and_eq(mut self, column: &'static str, value: impl Into<FilterValue>) -> Self {
        self.params.push(value.into());
        self.conditions
            .push(format!("{column} = ?{}", self.params.len()));
        self
    }

    /// Add a `column IS NULL` condition.
    #[must_use]
    pub fn and_is_null(mut self, column: &'static str) -> Self {
        self.conditions.push(format!("{column} IS NULL"));
        self
    }

    /// Render the conditions, adding the soft-delete scope unless deleted rows are requested.
    #[must_use]
    pub fn where_clause(&self, options: ReadOptions) -> String {
        let mut conditions = self.conditions.clone();
        if !options.includes_deleted() {
            conditions.push("deleted_at IS NULL".to_string());
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }
}

/// Result of a soft delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Whether the target row changed (false if it was already deleted).
    pub deleted: bool,
    /// Dependent rows soft-deleted by cascade rules.
    pub cascaded: u64,
}

async fn load_lifecycle(
    conn: &mut SqliteConnection,
    table: &str,
    id: &str,
) -> Result<Option<SoftDeleteState>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {LIFECYCLE_COLUMNS} FROM {table} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(SoftDeleteState::from_row).transpose()
}

async fn store_lifecycle(
    conn: &mut SqliteConnection,
    table: &str,
    id: &str,
    state: &SoftDeleteState,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "UPDATE {table} SET updated_at = ?1, deleted_at = ?2 WHERE id = ?3"
    ))
    .bind(state.updated_at.timestamp_millis())
    .bind(state.deleted_at.map(|at| at.timestamp_millis()))
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository base applying the soft-delete policy to an entity table.
///
/// Reads go to the reader pool. Deletes and restores run as one transaction
/// on the writer.
pub struct SoftDeleteRepository<E> {
    pool: DatabasePool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for SoftDeleteRepository<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: SoftDeletable> SoftDeleteRepository<E> {
    /// Create a repository over the given pools.
    #[must_use]
    pub const fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    /// Pools used by this repository.
    #[must_use]
    pub const fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// `SELECT` statement for this entity under the given filter.
    #[must_use]
    pub fn select_sql(filter: &Filter, options: ReadOptions) -> String {
        format!(
            "SELECT {}, {LIFECYCLE_COLUMNS} FROM {}{} ORDER BY created_at, rowid",
            E::COLUMNS,
            E::TABLE,
            filter.where_clause(options)
        )
    }

    /// Load rows matching `filter`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn select(&self, filter: Filter, options: ReadOptions) -> StoreResult<Vec<E>> {
        let sql = Self::select_sql(&filter, options);
        let mut query = sqlx::query(&sql);
        for param in filter.params {
            query = match param {
                FilterValue::Text(text) => query.bind(text),
                FilterValue::Integer(number) => query.bind(number),
            };
        }
        let rows = query.fetch_all(&self.pool.reader).await?;
        let entities = rows
            .iter()
            .map(E::from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(entities)
    }

    /// Load one row by id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn find(&self, id: E::Id, options: ReadOptions) -> StoreResult<Option<E>> {
        let rows = self
            .select(Filter::eq("id", id.to_string()), options)
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Soft-delete a row and apply the entity's cascade rules.
    ///
    /// Deleting a row that is already soft-deleted changes nothing.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the row does not exist, or an
    /// error if the transaction fails.
    pub async fn delete(&self, id: E::Id) -> StoreResult<DeleteReport> {
        let now = now_millis();
        let id_text = id.to_string();
        let mut tx = self.pool.writer.begin().await?;

        let Some(current) = load_lifecycle(&mut tx, E::TABLE, &id_text).await? else {
            return Err(not_found::<E>(id));
        };
        let next = current.soft_delete(now);
        if next == current {
            debug!(table = E::TABLE, %id, "Row already soft-deleted");
            return Ok(DeleteReport::default());
        }

        store_lifecycle(&mut tx, E::TABLE, &id_text, &next).await?;
        let stamp = now.timestamp_millis();
        let mut cascaded = 0;
        for rule in E::CASCADES {
            cascaded += sqlx::query(&format!(
                "UPDATE {} SET deleted_at = ?1, updated_at = ?1
                 WHERE {} = ?2 AND deleted_at IS NULL",
                rule.table, rule.foreign_key
            ))
            .bind(stamp)
            .bind(&id_text)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;

        info!(table = E::TABLE, %id, cascaded, "Soft-deleted row");
        Ok(DeleteReport {
            deleted: true,
            cascaded,
        })
    }

    /// Clear the deletion mark of a row. Dependents stay deleted.
    ///
    /// Returns `false` if the row was not deleted.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the row does not exist, or an
    /// error if storage access fails.
    pub async fn restore(&self, id: E::Id) -> StoreResult<bool> {
        let now = now_millis();
        let id_text = id.to_string();
        let mut tx = self.pool.writer.begin().await?;

        let Some(current) = load_lifecycle(&mut tx, E::TABLE, &id_text).await? else {
            return Err(not_found::<E>(id));
        };
        let next = current.restore(now);
        if next == current {
            return Ok(false);
        }
        store_lifecycle(&mut tx, E::TABLE, &id_text, &next).await?;
        tx.commit().await?;

        info!(table = E::TABLE, %id, "Restored row");
        Ok(true)
    }
}

fn not_found<E: SoftDeletable>(id: E::Id) -> StoreError {
    StoreError::NotFound {
        entity: E::TABLE,
        id: id.to_string(),
    }
}
