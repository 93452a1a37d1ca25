//! In-process store. Evaluates queries over rows held in memory; used by tests and demos
//! that run without a database.

use super::Store;
use crate::config::{FieldInfo, FieldKind, ModelSchema};
use crate::error::ApiError;
use crate::query::{Aggregate, AggregateFn, CompareOp, OrderBy, Predicate, Query};
use crate::record::{compare_values, is_zero, scalar_string, values_equal, Record};
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    sequences: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Every stored row of `table`, soft-deleted ones included.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock()
            .map(|t| t.rows.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, ApiError> {
        self.tables
            .lock()
            .map_err(|_| ApiError::Internal("memory store lock poisoned".into()))
    }
}

fn unsupported() -> ApiError {
    ApiError::Internal("raw predicates are not supported by the memory store".into())
}

fn is_live(schema: &ModelSchema, row: &Record) -> bool {
    let Some(marker) = &schema.soft_delete else {
        return true;
    };
    let v = row.get(&marker.column).unwrap_or(&Value::Null);
    match schema.field(&marker.column).map(|f| f.kind) {
        Some(FieldKind::Bool) => v != &Value::Bool(true),
        _ => v.is_null(),
    }
}

fn cell<'a>(row: &'a Record, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

fn matches(p: &Predicate, row: &Record) -> Result<bool, ApiError> {
    let get = |c: &str| cell(row, c);
    Ok(match p {
        Predicate::Compare { column, op, value } => {
            let Some(ord) = compare_values(get(column.as_str()), value) else {
                return Ok(false);
            };
            match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Neq => ord != Ordering::Equal,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Gte => ord != Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
            }
        }
        Predicate::In { column, values, negated } => {
            let v = get(column.as_str());
            if v.is_null() {
                return Ok(false);
            }
            values.iter().any(|x| values_equal(v, x)) != *negated
        }
        Predicate::Between { column, low, high } => {
            let v = get(column.as_str());
            matches!(compare_values(v, low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_values(v, high), Some(Ordering::Less | Ordering::Equal))
        }
        Predicate::Contains { column, needle } => {
            let v = get(column.as_str());
            !v.is_null() && scalar_string(v).contains(needle.as_str())
        }
        Predicate::Null { column, negated } => get(column.as_str()).is_null() == !*negated,
        Predicate::Search { column, text } => {
            let haystack = scalar_string(get(column.as_str())).to_lowercase();
            text.split_whitespace().all(|w| haystack.contains(&w.to_lowercase()))
        }
        Predicate::Raw { .. } => return Err(unsupported()),
    })
}

fn selected(schema: &ModelSchema, query: &Query, row: &Record) -> Result<bool, ApiError> {
    if !query.unscoped && !is_live(schema, row) {
        return Ok(false);
    }
    for p in &query.predicates {
        if !matches(p, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Match flags for every row, computed before anything is changed.
fn hits(schema: &ModelSchema, query: &Query, rows: &[Record]) -> Result<Vec<bool>, ApiError> {
    rows.iter().map(|row| selected(schema, query, row)).collect()
}

/// Nulls sort after every value, as in PostgreSQL's ascending order.
fn order_rows(rows: &mut [Record], order: &[OrderBy]) {
    rows.sort_by(|a, b| {
        for o in order {
            let (x, y) = (
                a.get(&o.column).unwrap_or(&Value::Null),
                b.get(&o.column).unwrap_or(&Value::Null),
            );
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ord = if o.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn window<T>(items: Vec<T>, query: &Query) -> Vec<T> {
    let offset = query.offset.unwrap_or(0) as usize;
    let iter = items.into_iter().skip(offset);
    match query.limit {
        Some(limit) => iter.take(limit as usize).collect(),
        None => iter.collect(),
    }
}

fn provided(field: &FieldInfo, row: &Record) -> bool {
    match row.get(&field.column) {
        Some(v) => !(field.is_generated() && is_zero(v)),
        None => false,
    }
}

fn number(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn aggregate_value(schema: &ModelSchema, agg: &Aggregate, rows: &[&Record]) -> Value {
    if agg.column == "*" {
        return Value::Number(rows.len().into());
    }
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|r| r.get(&agg.column))
        .filter(|v| !v.is_null())
        .collect();
    match agg.func {
        AggregateFn::Count => Value::Number(values.len().into()),
        AggregateFn::Sum | AggregateFn::Avg => {
            let nums: Vec<f64> = values.iter().filter_map(|v| as_f64(v)).collect();
            if nums.is_empty() {
                return Value::Null;
            }
            let sum: f64 = nums.iter().sum();
            if agg.func == AggregateFn::Sum {
                number(sum)
            } else {
                number(sum / nums.len() as f64)
            }
        }
        AggregateFn::Min | AggregateFn::Max => {
            let pick = values.into_iter().reduce(|best, v| {
                let ord = compare_values(v, best).unwrap_or(Ordering::Equal);
                let better = if agg.func == AggregateFn::Min {
                    ord == Ordering::Less
                } else {
                    ord == Ordering::Greater
                };
                if better {
                    v
                } else {
                    best
                }
            });
            pick.cloned().unwrap_or(Value::Null)
        }
        AggregateFn::First | AggregateFn::Last => {
            let mut ordered: Vec<Record> = rows.iter().map(|r| (*r).clone()).collect();
            let by_pk: Vec<OrderBy> = schema
                .primary_fields()
                .map(|f| OrderBy {
                    column: f.column.clone(),
                    descending: agg.func == AggregateFn::Last,
                })
                .collect();
            order_rows(&mut ordered, &by_pk);
            ordered
                .first()
                .and_then(|r| r.get(&agg.column))
                .cloned()
                .unwrap_or(Value::Null)
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, schema: &ModelSchema, query: &Query) -> Result<Vec<Record>, ApiError> {
        let tables = self.lock()?;
        let mut rows = Vec::new();
        for row in tables.rows.get(&schema.table).into_iter().flatten() {
            if selected(schema, query, row)? {
                rows.push(row.clone());
            }
        }
        drop(tables);
        order_rows(&mut rows, &query.order);
        let mut rows = window(rows, query);
        if !query.select.is_empty() {
            for row in rows.iter_mut() {
                row.retain(|k, _| query.select.iter().any(|c| c == k));
            }
        }
        Ok(rows)
    }

    async fn count(&self, schema: &ModelSchema, query: &Query) -> Result<u64, ApiError> {
        let tables = self.lock()?;
        let mut n = 0;
        for row in tables.rows.get(&schema.table).into_iter().flatten() {
            if selected(schema, query, row)? {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn insert(&self, schema: &ModelSchema, rows: &[Record]) -> Result<Vec<Record>, ApiError> {
        let mut tables = self.lock()?;
        let mut next = tables.sequences.get(&schema.table).copied().unwrap_or(0);
        let existing = tables.rows.get(&schema.table).cloned().unwrap_or_default();
        let pk = schema.primary_columns();
        let key_of = |r: &Record| pk.iter().map(|c| scalar_string(r.get(c).unwrap_or(&Value::Null))).collect::<Vec<_>>();

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let mut full = Record::new();
            for field in &schema.fields {
                let value = if provided(field, row) {
                    row.get(&field.column).cloned().unwrap_or(Value::Null)
                } else if field.auto_increment {
                    next += 1;
                    Value::Number(next.into())
                } else if let Some(default) = &field.default {
                    default.clone()
                } else {
                    Value::Null
                };
                if value.is_null() && !field.nullable {
                    return Err(ApiError::Internal(format!(
                        "null value in column {} of {} violates not-null constraint",
                        field.column, schema.table
                    )));
                }
                if field.auto_increment {
                    if let Some(n) = value.as_i64() {
                        next = next.max(n);
                    }
                }
                full.insert(field.column.clone(), value);
            }
            let key = key_of(&full);
            if existing.iter().chain(stored.iter()).any(|r| key_of(r) == key) {
                return Err(ApiError::Internal(format!(
                    "duplicate key value violates primary key of {}",
                    schema.table
                )));
            }
            stored.push(full);
        }
        tables.sequences.insert(schema.table.clone(), next);
        tables
            .rows
            .entry(schema.table.clone())
            .or_default()
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn update(&self, schema: &ModelSchema, query: &Query, values: &Record) -> Result<u64, ApiError> {
        let mut tables = self.lock()?;
        let rows = tables.rows.entry(schema.table.clone()).or_default();
        let hits = hits(schema, query, rows)?;
        for (row, _) in rows.iter_mut().zip(&hits).filter(|(_, hit)| **hit) {
            for (k, v) in values.iter().filter(|(k, _)| schema.has_column(k)) {
                row.insert(k.clone(), v.clone());
            }
        }
        Ok(hits.iter().filter(|h| **h).count() as u64)
    }

    async fn delete(&self, schema: &ModelSchema, query: &Query) -> Result<u64, ApiError> {
        let mut tables = self.lock()?;
        let rows = tables.rows.entry(schema.table.clone()).or_default();
        let hits = hits(schema, query, rows)?;
        let mut flags = hits.iter();
        rows.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(hits.iter().filter(|h| **h).count() as u64)
    }

    async fn aggregate(&self, schema: &ModelSchema, query: &Query) -> Result<Vec<Record>, ApiError> {
        let tables = self.lock()?;
        let mut matched = Vec::new();
        for row in tables.rows.get(&schema.table).into_iter().flatten() {
            if selected(schema, query, row)? {
                matched.push(row);
            }
        }

        let mut groups: Vec<(Vec<String>, Vec<&Record>)> = Vec::new();
        for row in matched {
            let key: Vec<String> = query
                .group_by
                .iter()
                .map(|c| scalar_string(row.get(c).unwrap_or(&Value::Null)))
                .collect();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        if groups.is_empty() && query.group_by.is_empty() {
            groups.push((Vec::new(), Vec::new()));
        }

        let mut out: Vec<Record> = groups
            .into_iter()
            .map(|(_, members)| {
                let mut rec = Record::new();
                for c in &query.group_by {
                    let v = members.first().and_then(|r| r.get(c)).cloned().unwrap_or(Value::Null);
                    rec.insert(c.clone(), v);
                }
                for agg in &query.aggregates {
                    rec.insert(agg.alias(), aggregate_value(schema, agg, &members));
                }
                rec
            })
            .collect();
        let group_order: Vec<OrderBy> = query
            .order
            .iter()
            .filter(|o| query.group_by.contains(&o.column))
            .cloned()
            .collect();
        order_rows(&mut out, &group_order);
        Ok(window(out, query))
    }

    async fn ping(&self) -> Result<(), ApiError> {
        self.lock().map(|_| ())
    }
}
