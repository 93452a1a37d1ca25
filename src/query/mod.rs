//! Store-neutral query model. Built from request parameters by [`builder`], executed by a
//! [`crate::store::Store`].

pub mod builder;
pub mod filter;
pub mod pagination;
pub mod preload;

pub use builder::{apply_filters, parse_group_by, parse_order_by, FieldFilter};
pub use filter::{parse_filters, FilterClause, Operator};
pub use pagination::Pagination;

use crate::config::ModelSchema;
use crate::error::ApiError;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
        }
    }

    /// Accepts SQL spellings as well as filter tokens; used for forced conditions.
    pub fn parse(op: &str) -> Option<CompareOp> {
        let op = match op.trim().to_lowercase().as_str() {
            "=" | "==" | "eq" => CompareOp::Eq,
            "!=" | "<>" | "neq" => CompareOp::Neq,
            ">" | "gt" => CompareOp::Gt,
            "<" | "lt" => CompareOp::Lt,
            ">=" | "gte" => CompareOp::Gte,
            "<=" | "lte" => CompareOp::Lte,
            _ => return None,
        };
        Some(op)
    }
}

/// One `WHERE` term. Values are always bound by the store, never spliced into SQL.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare { column: String, op: CompareOp, value: Value },
    In { column: String, values: Vec<Value>, negated: bool },
    Between { column: String, low: Value, high: Value },
    Contains { column: String, needle: String },
    /// `IS NULL`, or `IS NOT NULL` when negated.
    Null { column: String, negated: bool },
    /// Natural-language full-text match.
    Search { column: String, text: String },
    /// SQL fragment from a custom field filter; `?` marks each bound parameter.
    Raw { sql: String, params: Vec<Value> },
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Predicate::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    First,
    Last,
}

impl AggregateFn {
    pub fn parse(s: &str) -> Option<AggregateFn> {
        let f = match s.to_lowercase().as_str() {
            "count" => AggregateFn::Count,
            "sum" => AggregateFn::Sum,
            "min" => AggregateFn::Min,
            "max" => AggregateFn::Max,
            "avg" => AggregateFn::Avg,
            "first" => AggregateFn::First,
            "last" => AggregateFn::Last,
            _ => return None,
        };
        Some(f)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Avg => "avg",
            AggregateFn::First => "first",
            AggregateFn::Last => "last",
        }
    }
}

/// `column.func` select item; `column` is a known column or `*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aggregate {
    pub column: String,
    pub func: AggregateFn,
}

impl Aggregate {
    pub fn alias(&self) -> String {
        format!("{}.{}", self.column, self.func.name())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub order: Vec<OrderBy>,
    pub group_by: Vec<String>,
    /// Selected columns; empty selects every column.
    pub select: Vec<String>,
    /// Relation paths to preload, dot-separated for nested relations.
    pub preload: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    /// Include soft-deleted rows.
    pub unscoped: bool,
    /// Log statements at info level.
    pub debug: bool,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    /// Whether any `WHERE` term is present. The soft-delete scope does not count.
    pub fn has_where(&self) -> bool {
        !self.predicates.is_empty()
    }

    /// A fresh query carrying only this query's predicates and scope flags.
    pub fn scope_only(&self) -> Query {
        Query {
            predicates: self.predicates.clone(),
            unscoped: self.unscoped,
            debug: self.debug,
            ..Query::default()
        }
    }

    /// Equality on every primary key column, in declared order.
    pub fn by_primary_key(schema: &ModelSchema, values: &[Value]) -> Result<Query, ApiError> {
        let pks: Vec<_> = schema.primary_fields().collect();
        if pks.len() != values.len() {
            return Err(ApiError::BadRequest(format!(
                "expected {} primary key value(s), got {}",
                pks.len(),
                values.len()
            )));
        }
        let mut q = Query::new();
        for (field, value) in pks.into_iter().zip(values) {
            q.predicates.push(Predicate::eq(&field.column, value.clone()));
        }
        Ok(q)
    }

    /// Primary key equality built from a stored record.
    pub fn for_record(schema: &ModelSchema, record: &crate::record::Record) -> Result<Query, ApiError> {
        let values: Vec<Value> = schema
            .primary_fields()
            .map(|f| record.get(&f.column).cloned().unwrap_or(Value::Null))
            .collect();
        if values.iter().any(Value::is_null) {
            return Err(ApiError::Internal(format!(
                "record of {} has no primary key value",
                schema.table
            )));
        }
        Query::by_primary_key(schema, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldInfo, FieldKind};
    use serde_json::json;

    #[test]
    fn composite_primary_key_is_anded_in_declared_order() {
        let schema = ModelSchema::new("order_line")
            .with_field(FieldInfo::new("order_id", FieldKind::Int).primary_key())
            .with_field(FieldInfo::new("line_no", FieldKind::Int).primary_key())
            .with_field(FieldInfo::new("qty", FieldKind::Int));
        let q = Query::by_primary_key(&schema, &[json!(7), json!(2)]).unwrap();
        assert_eq!(
            q.predicates,
            vec![Predicate::eq("order_id", json!(7)), Predicate::eq("line_no", json!(2))]
        );
        assert!(Query::by_primary_key(&schema, &[json!(7)]).is_err());
    }

    #[test]
    fn compare_op_accepts_sql_and_tokens() {
        assert_eq!(CompareOp::parse(">="), Some(CompareOp::Gte));
        assert_eq!(CompareOp::parse("neq"), Some(CompareOp::Neq));
        assert_eq!(CompareOp::parse("like"), None);
    }
}
