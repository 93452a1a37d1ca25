//! `GET /{table}/aggregate?fields=price.sum,*.count&group_by=category_id`.
//!
//! Aggregate function names cannot be bound as parameters, so every expression has to
//! pass the whitelist pattern and name a known column before it reaches the store.

use super::{build_query, gate, guard_unsafe};
use crate::app::Restify;
use crate::config::ModelSchema;
use crate::context::{Context, Permission};
use crate::error::ApiError;
use crate::query::{Aggregate, AggregateFn};
use crate::record::Record;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn expression_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^([a-z0-9_*\-]+)\.(count|sum|min|max|avg|first|last)$").expect("aggregate pattern")
    })
}

/// Valid `column.func` expressions of `raw`; anything else is skipped. `*` only counts.
pub fn parse_aggregates(raw: &str, schema: &ModelSchema) -> Vec<Aggregate> {
    raw.split(',')
        .filter_map(|token| {
            let caps = expression_regex().captures(token.trim())?;
            let column = caps.get(1)?.as_str();
            let func = AggregateFn::parse(caps.get(2)?.as_str())?;
            let known = if column == "*" {
                func == AggregateFn::Count
            } else {
                schema.has_column(column)
            };
            known.then(|| Aggregate {
                column: column.to_string(),
                func,
            })
        })
        .collect()
}

pub async fn aggregate(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::ViewAggregate, None)?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let mut query = build_query(app, ctx)?;
    query.aggregates = parse_aggregates(&ctx.request.query_str("fields"), schema);
    if query.aggregates.is_empty() {
        return Err(ApiError::BadRequest("no valid aggregate expression in fields".into()));
    }
    query.preload.clear();
    guard_unsafe(ctx, &query)?;

    let rows = app.store.aggregate(schema, &query).await?;
    if query.group_by.is_empty() {
        ctx.response.data = Value::Object(rows.into_iter().next().unwrap_or_else(Record::new));
    } else {
        ctx.response.set_rows(rows.into_iter().map(Value::Object).collect());
    }
    Ok(())
}
