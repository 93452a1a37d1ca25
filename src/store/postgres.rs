//! PostgreSQL store over a sqlx pool.

use super::Store;
use crate::config::{FieldKind, ModelSchema};
use crate::error::ApiError;
use crate::query::Query;
use crate::record::Record;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(PgStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn log(q: &QueryBuf, debug: bool) {
        if debug {
            tracing::info!(sql = %q.sql, params = ?q.params, "query");
        } else {
            tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        }
    }

    async fn fetch(&self, schema: &ModelSchema, q: &QueryBuf, debug: bool) -> Result<Vec<Record>, ApiError> {
        Self::log(q, debug);
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| row_to_record(schema, r)).collect())
    }

    async fn execute(&self, q: &QueryBuf, debug: bool) -> Result<u64, ApiError> {
        Self::log(q, debug);
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find(&self, schema: &ModelSchema, query: &Query) -> Result<Vec<Record>, ApiError> {
        self.fetch(schema, &sql::select(schema, query), query.debug).await
    }

    async fn count(&self, schema: &ModelSchema, query: &Query) -> Result<u64, ApiError> {
        let rows = self.fetch(schema, &sql::count(schema, query), query.debug).await?;
        let n = rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(n)
    }

    async fn insert(&self, schema: &ModelSchema, rows: &[Record]) -> Result<Vec<Record>, ApiError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch(schema, &sql::insert(schema, rows), false).await
    }

    async fn update(&self, schema: &ModelSchema, query: &Query, values: &Record) -> Result<u64, ApiError> {
        if !values.keys().any(|k| schema.has_column(k)) {
            return Ok(0);
        }
        self.execute(&sql::update(schema, query, values), query.debug).await
    }

    async fn delete(&self, schema: &ModelSchema, query: &Query) -> Result<u64, ApiError> {
        self.execute(&sql::delete(schema, query), query.debug).await
    }

    async fn aggregate(&self, schema: &ModelSchema, query: &Query) -> Result<Vec<Record>, ApiError> {
        self.fetch(schema, &sql::aggregate(schema, query), query.debug).await
    }

    async fn ping(&self) -> Result<(), ApiError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_record(schema: &ModelSchema, row: &PgRow) -> Record {
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        let v = match schema.field(name) {
            Some(field) => cell_by_kind(row, name, field.kind),
            None => cell_to_value(row, name),
        };
        map.insert(name.to_string(), v);
    }
    map
}

/// Decodes a model column by its declared kind, falling back to probing.
fn cell_by_kind(row: &PgRow, name: &str, kind: FieldKind) -> Value {
    let decoded = match kind {
        FieldKind::Json => row.try_get::<Option<Value>, _>(name).ok().map(|v| v.unwrap_or(Value::Null)),
        FieldKind::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .ok()
            .map(|v| v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null)),
        FieldKind::Bool => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null)),
        _ => None,
    };
    decoded.unwrap_or_else(|| cell_to_value(row, name))
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
