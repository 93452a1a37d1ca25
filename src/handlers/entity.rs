//! Single-row and batch CRUD handlers, list, paginate and model info.

use super::{
    build_query, create_records, gate, guard_unsafe, key_query, parse_array, parse_object, primary_key_query,
};
use crate::app::Restify;
use crate::config::ModelSchema;
use crate::context::{Context, Permission};
use crate::error::ApiError;
use crate::query::preload::{ensure_join_columns, load_preloads};
use crate::query::{Pagination, Query};
use crate::record::{apply_override, is_zero, merge_non_zero, to_response, Record};
use crate::service::ValidationMode;
use serde_json::Value;
use std::slice;

pub async fn model_info(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::ModelInfo, None)?;
    ctx.response.data = serde_json::to_value(ctx.resource.info()).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(())
}

pub async fn create(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    let record = parse_object(app, ctx)?;
    gate(app, ctx, Permission::Create, Some(&record))?;
    let stored = create_records(app, ctx, vec![record])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("insert returned no row".into()))?;
    ctx.response.data = to_response(ctx.schema(), stored);
    Ok(())
}

pub async fn batch_create(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    let records = parse_array(app, ctx)?;
    gate(app, ctx, Permission::BatchCreate, None)?;
    let created = create_records(app, ctx, records).await?;
    let rows = created.into_iter().map(|r| to_response(ctx.schema(), r)).collect();
    ctx.response.set_rows(rows);
    Ok(())
}

async fn load_existing(app: &Restify, ctx: &Context, query: &Query) -> Result<Record, ApiError> {
    app.store
        .find_one(ctx.schema(), query)
        .await?
        .ok_or(ApiError::ObjectNotExist)
}

/// Reads a written row back by primary key, soft-deleted or not.
async fn reload(app: &Restify, schema: &ModelSchema, record: &Record, debug: bool) -> Result<Record, ApiError> {
    let mut query = Query::for_record(schema, record)?.unscoped();
    query.debug = debug;
    app.store.find_one(schema, &query).await?.ok_or(ApiError::ObjectNotExist)
}

fn keep_primary_key(schema: &ModelSchema, record: &mut Record, existing: &Record) {
    for column in schema.primary_columns() {
        if let Some(v) = existing.get(&column) {
            record.insert(column, v.clone());
        }
    }
}

/// PATCH: only non-zero body fields are written, then the full row is returned.
pub async fn update(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    let patch = parse_object(app, ctx)?;
    gate(app, ctx, Permission::Update, Some(&patch))?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let key = key_query(ctx)?;
    let existing = load_existing(app, ctx, &key).await?;

    let mut merged = existing.clone();
    merge_non_zero(&mut merged, &patch);
    keep_primary_key(schema, &mut merged, &existing);
    app.hooks.before_update(&mut merged, ctx, ValidationMode::NonZero)?;
    apply_override(&mut merged, ctx.override_.as_ref());

    let changes: Record = merged
        .iter()
        .filter(|(k, v)| schema.field(k).map(|f| !f.primary_key).unwrap_or(false) && existing.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !changes.is_empty() {
        app.store.update(schema, &key, &changes).await?;
    }
    let mut stored = reload(app, schema, &existing, ctx.debug).await?;
    app.hooks.after_update(&mut stored, ctx)?;
    ctx.response.data = to_response(schema, stored);
    Ok(())
}

/// PUT on a key: every non-key column is written, absent ones as null.
pub async fn replace(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    let mut record = parse_object(app, ctx)?;
    gate(app, ctx, Permission::Update, Some(&record))?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let key = key_query(ctx)?;
    let existing = load_existing(app, ctx, &key).await?;

    keep_primary_key(schema, &mut record, &existing);
    app.hooks.before_update(&mut record, ctx, ValidationMode::Full)?;
    apply_override(&mut record, ctx.override_.as_ref());

    let values: Record = schema
        .fields
        .iter()
        .filter(|f| !f.primary_key)
        .map(|f| (f.column.clone(), record.get(&f.column).cloned().unwrap_or(Value::Null)))
        .collect();
    app.store.update(schema, &key, &values).await?;
    let mut stored = reload(app, schema, &existing, ctx.debug).await?;
    app.hooks.after_update(&mut stored, ctx)?;
    ctx.response.data = to_response(schema, stored);
    Ok(())
}

/// Writes the non-zero body fields onto every row matching the filters.
pub async fn batch_update(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    let mut patch = parse_object(app, ctx)?;
    gate(app, ctx, Permission::BatchUpdate, Some(&patch))?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let query = build_query(app, ctx)?;
    guard_unsafe(ctx, &query)?;

    app.hooks.before_update(&mut patch, ctx, ValidationMode::NonZero)?;
    apply_override(&mut patch, ctx.override_.as_ref());
    let values: Record = patch
        .into_iter()
        .filter(|(k, v)| !is_zero(v) && schema.field(k).map(|f| !f.primary_key).unwrap_or(false))
        .collect();
    let affected = app.store.update(schema, &query.scope_only(), &values).await?;
    tracing::debug!(table = %schema.table, affected, "batch update");

    if ctx.request.flag("return") {
        let mut rows = app.store.find(schema, &query).await?;
        for row in rows.iter_mut() {
            app.hooks.after_update(row, ctx)?;
        }
        ctx.response.set_rows(rows.into_iter().map(|r| to_response(schema, r)).collect());
    }
    ctx.response.total = affected;
    Ok(())
}

/// Soft delete when the model has a deleted marker, otherwise a physical delete.
async fn remove(app: &Restify, schema: &ModelSchema, query: &Query) -> Result<u64, ApiError> {
    match schema.deleted_marker() {
        Some((column, marker)) => {
            let mut values = Record::new();
            values.insert(column, marker);
            app.store.update(schema, query, &values).await
        }
        None => app.store.delete(schema, query).await,
    }
}

pub async fn delete(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::Delete, None)?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let key = key_query(ctx)?;
    let mut existing = load_existing(app, ctx, &key).await?;
    app.hooks.before_delete(&mut existing, ctx)?;
    remove(app, schema, &key).await?;
    app.hooks.after_delete(&mut existing, ctx)?;
    ctx.response.data = Value::Null;
    Ok(())
}

pub async fn batch_delete(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::BatchDelete, None)?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let query = build_query(app, ctx)?;
    guard_unsafe(ctx, &query)?;

    let scope = query.scope_only();
    let mut rows = app.store.find(schema, &scope).await?;
    for row in rows.iter_mut() {
        app.hooks.before_delete(row, ctx)?;
    }
    let affected = remove(app, schema, &scope).await?;
    for row in rows.iter_mut() {
        app.hooks.after_delete(row, ctx)?;
    }
    tracing::debug!(table = %schema.table, affected, "batch delete");

    if ctx.request.flag("return") {
        ctx.response.set_rows(rows.into_iter().map(|r| to_response(schema, r)).collect());
    } else {
        ctx.response.data = Value::Null;
    }
    ctx.response.total = affected;
    Ok(())
}

/// Fetch, preload and after-get hooks shared by the read endpoints.
async fn read_rows(app: &Restify, ctx: &mut Context, mut query: Query) -> Result<Vec<Value>, ApiError> {
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    ensure_join_columns(schema, &mut query);
    let mut rows = app.store.find(schema, &query).await?;
    load_preloads(app.store.as_ref(), &app.catalog, schema, &mut rows, &query.preload, query.debug).await?;
    for row in rows.iter_mut() {
        app.hooks.after_get(row, ctx)?;
    }
    Ok(rows.into_iter().map(|r| to_response(schema, r)).collect())
}

pub async fn get(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::ViewGet, None)?;
    app.hooks.before_get(ctx)?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let mut query = build_query(app, ctx)?;
    let mut predicates = primary_key_query(ctx)?.predicates;
    predicates.append(&mut query.predicates);
    query.predicates = predicates;
    query.offset = None;
    query.limit = Some(1);
    ensure_join_columns(schema, &mut query);

    let mut row = app.store.find_one(schema, &query).await?.ok_or(ApiError::ObjectNotExist)?;
    load_preloads(
        app.store.as_ref(),
        &app.catalog,
        schema,
        slice::from_mut(&mut row),
        &query.preload,
        query.debug,
    )
    .await?;
    app.hooks.after_get(&mut row, ctx)?;
    ctx.response.data = to_response(schema, row);
    Ok(())
}

/// Every matching row; no implicit limit.
pub async fn all(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::ViewAll, None)?;
    app.hooks.before_get(ctx)?;
    let query = build_query(app, ctx)?;
    let rows = read_rows(app, ctx, query).await?;
    ctx.response.set_rows(rows);
    Ok(())
}

pub async fn paginate(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::ViewPagination, None)?;
    app.hooks.before_get(ctx)?;
    let mut query = build_query(app, ctx)?;
    let mut page = Pagination::new(ctx.request.query_int("size"), ctx.request.query_int("page"));
    let records = app.store.count(ctx.schema(), &query).await?;
    page.set_records(records);
    query.limit = Some(page.limit);
    query.offset = Some(page.offset());

    let rows = read_rows(app, ctx, query).await?;
    let envelope = &mut ctx.response;
    envelope.data = Value::Array(rows);
    envelope.total = page.records;
    envelope.total_pages = page.pages;
    envelope.current_page = page.page;
    envelope.size = page.limit;
    envelope.offset = page.offset();
    envelope.page_range = page.page_range;
    Ok(())
}
