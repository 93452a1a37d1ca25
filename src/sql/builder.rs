//! Renders a [`Query`] against a model into parameterized SELECT, INSERT, UPDATE, DELETE.
//! Identifiers come from the model only; values are always parameters.

use crate::config::{FieldInfo, FieldKind, ModelSchema};
use crate::query::{Aggregate, AggregateFn, Predicate, Query};
use crate::record::{is_zero, Record};
use serde_json::Value;

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Escapes `LIKE` wildcards so a needle only matches itself.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn qualified_table(schema: &ModelSchema) -> String {
    match &schema.schema_name {
        Some(ns) => format!("{}.{}", quoted(ns), quoted(&schema.table)),
        None => quoted(&schema.table),
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// `$n::type` for a value bound against `column`.
    fn placeholder(&mut self, schema: &ModelSchema, column: &str, v: Value) -> String {
        let n = self.push_param(v);
        match schema.field(column) {
            Some(f) => format!("${}::{}", n, f.pg_type),
            None => format!("${}::text", n),
        }
    }
}

/// Enum (schema-qualified) and numeric columns are read back as text.
fn reads_as_text(field: &FieldInfo) -> bool {
    field.kind == FieldKind::Decimal || field.pg_type.contains('.') || field.pg_type == "numeric"
}

fn column_expr(field: &FieldInfo) -> String {
    let q = quoted(&field.column);
    if reads_as_text(field) {
        format!("{}::text AS {}", q, q)
    } else {
        q
    }
}

fn select_column_list(schema: &ModelSchema, select: &[String]) -> String {
    let fields: Vec<&FieldInfo> = if select.is_empty() {
        schema.fields.iter().collect()
    } else {
        select.iter().filter_map(|c| schema.field(c)).collect()
    };
    if fields.is_empty() {
        return "*".into();
    }
    fields.into_iter().map(column_expr).collect::<Vec<_>>().join(", ")
}

fn soft_delete_scope(schema: &ModelSchema) -> Option<String> {
    let marker = schema.soft_delete.as_ref()?;
    let field = schema.field(&marker.column)?;
    Some(match field.kind {
        FieldKind::Bool => format!("{} IS NOT TRUE", quoted(&field.column)),
        _ => format!("{} IS NULL", quoted(&field.column)),
    })
}

fn predicate_sql(schema: &ModelSchema, p: &Predicate, q: &mut QueryBuf) -> String {
    match p {
        Predicate::Compare { column, op, value } => {
            let ph = q.placeholder(schema, column, value.clone());
            format!("{} {} {}", quoted(column), op.sql(), ph)
        }
        Predicate::In { column, values, negated } => {
            if values.is_empty() {
                return if *negated { "TRUE".into() } else { "FALSE".into() };
            }
            let list: Vec<String> = values.iter().map(|v| q.placeholder(schema, column, v.clone())).collect();
            let keyword = if *negated { "NOT IN" } else { "IN" };
            format!("{} {} ({})", quoted(column), keyword, list.join(", "))
        }
        Predicate::Between { column, low, high } => {
            let lo = q.placeholder(schema, column, low.clone());
            let hi = q.placeholder(schema, column, high.clone());
            format!("{} BETWEEN {} AND {}", quoted(column), lo, hi)
        }
        Predicate::Contains { column, needle } => {
            let n = q.push_param(Value::String(format!("%{}%", escape_like(needle))));
            format!("{}::text LIKE ${}::text ESCAPE '\\'", quoted(column), n)
        }
        Predicate::Null { column, negated } => {
            let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
            format!("{} {}", quoted(column), test)
        }
        Predicate::Search { column, text } => {
            let n = q.push_param(Value::String(text.clone()));
            format!("to_tsvector({}::text) @@ plainto_tsquery(${}::text)", quoted(column), n)
        }
        Predicate::Raw { sql, params } => {
            let mut out = String::with_capacity(sql.len());
            let mut values = params.iter();
            for c in sql.chars() {
                if c == '?' {
                    let n = q.push_param(values.next().cloned().unwrap_or(Value::Null));
                    out.push_str(&format!("${}", n));
                } else {
                    out.push(c);
                }
            }
            format!("({})", out)
        }
    }
}

fn where_clause(schema: &ModelSchema, query: &Query, q: &mut QueryBuf) -> String {
    let mut terms: Vec<String> = query.predicates.iter().map(|p| predicate_sql(schema, p, q)).collect();
    if !query.unscoped {
        if let Some(scope) = soft_delete_scope(schema) {
            terms.push(scope);
        }
    }
    if terms.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", terms.join(" AND "))
    }
}

fn order_clause(query: &Query, allowed: impl Fn(&str) -> bool) -> String {
    let items: Vec<String> = query
        .order
        .iter()
        .filter(|o| allowed(&o.column))
        .map(|o| format!("{} {}", quoted(&o.column), if o.descending { "DESC" } else { "ASC" }))
        .collect();
    if items.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", items.join(", "))
    }
}

fn window_clause(query: &Query) -> String {
    let mut s = String::new();
    if let Some(limit) = query.limit {
        s.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = query.offset {
        s.push_str(&format!(" OFFSET {}", offset));
    }
    s
}

pub fn select(schema: &ModelSchema, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = select_column_list(schema, &query.select);
    let filter = where_clause(schema, query, &mut q);
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        cols,
        qualified_table(schema),
        filter,
        order_clause(query, |c| schema.has_column(c)),
        window_clause(query)
    );
    q
}

pub fn count(schema: &ModelSchema, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let filter = where_clause(schema, query, &mut q);
    q.sql = format!("SELECT COUNT(*) AS \"count\" FROM {}{}", qualified_table(schema), filter);
    q
}

fn aggregate_expr(schema: &ModelSchema, agg: &Aggregate) -> String {
    let alias = quoted(&agg.alias());
    if agg.column == "*" {
        return format!("COUNT(*) AS {}", alias);
    }
    let col = quoted(&agg.column);
    let field = schema.field(&agg.column);
    let as_text = field.map(reads_as_text).unwrap_or(false);
    let order_by_pk = |dir: &str| {
        schema
            .primary_fields()
            .map(|f| format!("{} {}", quoted(&f.column), dir))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let expr = match agg.func {
        AggregateFn::Count => format!("COUNT({})", col),
        AggregateFn::Sum | AggregateFn::Avg => {
            let cast = if as_text { "text" } else { "double precision" };
            format!("({}({}))::{}", agg.func.name().to_uppercase(), col, cast)
        }
        AggregateFn::Min | AggregateFn::Max => {
            let e = format!("{}({})", agg.func.name().to_uppercase(), col);
            if as_text {
                format!("({})::text", e)
            } else {
                e
            }
        }
        AggregateFn::First | AggregateFn::Last => {
            let dir = if agg.func == AggregateFn::First { "ASC" } else { "DESC" };
            let e = format!("(array_agg({} ORDER BY {}))[1]", col, order_by_pk(dir));
            if as_text {
                format!("({})::text", e)
            } else {
                e
            }
        }
    };
    format!("{} AS {}", expr, alias)
}

/// Group columns followed by every aggregate; ordering is limited to group columns.
pub fn aggregate(schema: &ModelSchema, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut items: Vec<String> = query
        .group_by
        .iter()
        .filter_map(|c| schema.field(c))
        .map(column_expr)
        .collect();
    items.extend(query.aggregates.iter().map(|a| aggregate_expr(schema, a)));
    let filter = where_clause(schema, query, &mut q);
    let group = if query.group_by.is_empty() {
        String::new()
    } else {
        format!(
            " GROUP BY {}",
            query.group_by.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", ")
        )
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        items.join(", "),
        qualified_table(schema),
        filter,
        group,
        order_clause(query, |c| query.group_by.iter().any(|g| g == c)),
        window_clause(query)
    );
    q
}

/// Multi-row INSERT. Columns absent from a row, and zero-valued generated columns, take
/// their DEFAULT. Returns every column of the stored rows.
pub fn insert(schema: &ModelSchema, rows: &[Record]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let provided = |f: &FieldInfo, r: &Record| match r.get(&f.column) {
        Some(v) => !(f.is_generated() && is_zero(v)),
        None => false,
    };
    let mut columns: Vec<&FieldInfo> = schema
        .fields
        .iter()
        .filter(|f| rows.iter().any(|r| provided(f, r)))
        .collect();
    if columns.is_empty() {
        columns.extend(schema.primary_fields().take(1));
    }
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let values: Vec<String> = columns
            .iter()
            .map(|f| {
                if provided(f, row) {
                    let v = row.get(&f.column).cloned().unwrap_or(Value::Null);
                    q.placeholder(schema, &f.column, v)
                } else {
                    "DEFAULT".into()
                }
            })
            .collect();
        tuples.push(format!("({})", values.join(", ")));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES {} RETURNING {}",
        qualified_table(schema),
        columns.iter().map(|f| quoted(&f.column)).collect::<Vec<_>>().join(", "),
        tuples.join(", "),
        select_column_list(schema, &[])
    );
    q
}

/// UPDATE of every column in `values` that the model knows.
pub fn update(schema: &ModelSchema, query: &Query, values: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let sets: Vec<String> = schema
        .fields
        .iter()
        .filter_map(|f| values.get(&f.column).map(|v| (f, v)))
        .map(|(f, v)| {
            let ph = q.placeholder(schema, &f.column, v.clone());
            format!("{} = {}", quoted(&f.column), ph)
        })
        .collect();
    let filter = where_clause(schema, query, &mut q);
    q.sql = format!("UPDATE {} SET {}{}", qualified_table(schema), sets.join(", "), filter);
    q
}

pub fn delete(schema: &ModelSchema, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let filter = where_clause(schema, query, &mut q);
    q.sql = format!("DELETE FROM {}{}", qualified_table(schema), filter);
    q
}
