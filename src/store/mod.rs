//! Storage backends. Handlers only see [`Store`]; `PgStore` renders queries to SQL,
//! `MemoryStore` evaluates them in-process.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::ModelSchema;
use crate::error::ApiError;
use crate::query::Query;
use crate::record::Record;
use async_trait::async_trait;

/// Row access used by every handler. Unless `query.unscoped` is set, soft-deleted rows are
/// invisible to `find`, `count`, `update`, `delete` and `aggregate`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Rows matching the query, ordered and windowed.
    async fn find(&self, schema: &ModelSchema, query: &Query) -> Result<Vec<Record>, ApiError>;

    /// Number of rows matching the query's predicates; order and window are ignored.
    async fn count(&self, schema: &ModelSchema, query: &Query) -> Result<u64, ApiError>;

    /// Inserts every row in one statement and returns the stored rows, generated columns
    /// filled, in input order.
    async fn insert(&self, schema: &ModelSchema, rows: &[Record]) -> Result<Vec<Record>, ApiError>;

    /// Sets `values` on every matching row; returns the affected count.
    async fn update(&self, schema: &ModelSchema, query: &Query, values: &Record) -> Result<u64, ApiError>;

    /// Physically removes every matching row; returns the affected count.
    async fn delete(&self, schema: &ModelSchema, query: &Query) -> Result<u64, ApiError>;

    /// One row per group (a single row when ungrouped) holding the group columns and one
    /// entry per aggregate, keyed by [`crate::query::Aggregate::alias`].
    async fn aggregate(&self, schema: &ModelSchema, query: &Query) -> Result<Vec<Record>, ApiError>;

    async fn ping(&self) -> Result<(), ApiError>;

    async fn find_one(&self, schema: &ModelSchema, query: &Query) -> Result<Option<Record>, ApiError> {
        let mut q = query.clone();
        q.limit = Some(1);
        Ok(self.find(schema, &q).await?.into_iter().next())
    }
}
