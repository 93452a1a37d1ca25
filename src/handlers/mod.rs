//! Endpoint handlers. Each runs parse, authorize, before-hooks, override, store write,
//! after-hooks and response shaping in that order, stopping at the first error.

pub mod aggregate;
pub mod entity;
pub mod set;

#[cfg(test)]
mod tests;

use crate::app::Restify;
use crate::context::{Context, Permission};
use crate::error::ApiError;
use crate::permission;
use crate::query::{apply_filters, Predicate, Query};
use crate::record::{apply_override, coerce_array, coerce_body, parse_key, Record};
use crate::resource::EndpointKind;
use crate::service::sanitize_record;

/// Runs the handler for the context's endpoint.
pub async fn handle(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    match ctx.endpoint {
        EndpointKind::ModelInfo => entity::model_info(app, ctx).await,
        EndpointKind::Create => entity::create(app, ctx).await,
        EndpointKind::BatchCreate => entity::batch_create(app, ctx).await,
        EndpointKind::Update => entity::update(app, ctx).await,
        EndpointKind::Replace => entity::replace(app, ctx).await,
        EndpointKind::BatchUpdate => entity::batch_update(app, ctx).await,
        EndpointKind::Delete => entity::delete(app, ctx).await,
        EndpointKind::BatchDelete => entity::batch_delete(app, ctx).await,
        EndpointKind::Get => entity::get(app, ctx).await,
        EndpointKind::All => entity::all(app, ctx).await,
        EndpointKind::Paginate => entity::paginate(app, ctx).await,
        EndpointKind::Set => set::set(app, ctx).await,
        EndpointKind::Aggregate => aggregate::aggregate(app, ctx).await,
    }
}

fn gate(app: &Restify, ctx: &mut Context, permission: Permission, record: Option<&Record>) -> Result<(), ApiError> {
    permission::authorize(app.authorizer.as_deref(), permission, record, ctx)
}

fn build_query(app: &Restify, ctx: &Context) -> Result<Query, ApiError> {
    apply_filters(ctx, &app.catalog, app.config.association_depth)
}

/// Refuses mass mutations without any predicate unless `unsafe` is set.
fn guard_unsafe(ctx: &Context, query: &Query) -> Result<(), ApiError> {
    if query.has_where() || ctx.request.flag("unsafe") {
        Ok(())
    } else {
        tracing::debug!(table = %ctx.schema().table, endpoint = ?ctx.endpoint, "unsafe request refused");
        Err(ApiError::Unsafe)
    }
}

/// Primary key equality from the path segments.
fn primary_key_query(ctx: &Context) -> Result<Query, ApiError> {
    let schema = ctx.schema();
    let pks: Vec<_> = schema.primary_fields().collect();
    if pks.len() != ctx.request.params.len() {
        return Err(ApiError::BadRequest(format!(
            "expected {} primary key segment(s), got {}",
            pks.len(),
            ctx.request.params.len()
        )));
    }
    let values = pks
        .iter()
        .zip(&ctx.request.params)
        .map(|(field, raw)| parse_key(field, raw))
        .collect::<Result<Vec<_>, _>>()?;
    let mut query = Query::by_primary_key(schema, &values)?;
    query.debug = ctx.debug;
    Ok(query)
}

/// Primary key equality followed by the forced conditions.
fn key_query(ctx: &Context) -> Result<Query, ApiError> {
    let schema = ctx.schema();
    let mut query = primary_key_query(ctx)?;
    for condition in &ctx.conditions {
        if !schema.has_column(&condition.field) {
            return Err(ApiError::ColumnNotExist(condition.field.clone()));
        }
        query.predicates.push(Predicate::Compare {
            column: condition.field.clone(),
            op: condition.op,
            value: condition.value.clone(),
        });
    }
    Ok(query)
}

fn parse_object(app: &Restify, ctx: &Context) -> Result<Record, ApiError> {
    let mut record = coerce_body(ctx.schema(), ctx.request.json_body()?)?;
    if app.config.sanitize_input {
        sanitize_record(&ctx.schema().table, &mut record);
    }
    Ok(record)
}

fn parse_array(app: &Restify, ctx: &Context) -> Result<Vec<Record>, ApiError> {
    let mut records = coerce_array(ctx.schema(), ctx.request.json_body()?)?;
    if app.config.sanitize_input {
        for record in records.iter_mut() {
            sanitize_record(&ctx.schema().table, record);
        }
    }
    Ok(records)
}

/// Create chain for `records` in chunks of the configured batch size: before-hooks and
/// override for every record of a chunk, one insert, then after-hooks. A failure stops
/// at that chunk; earlier chunks stay written.
async fn create_records(app: &Restify, ctx: &mut Context, records: Vec<Record>) -> Result<Vec<Record>, ApiError> {
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let chunk_size = app.config.batch_size.max(1);
    let mut created = Vec::with_capacity(records.len());
    let mut pending = records.into_iter().peekable();
    while pending.peek().is_some() {
        let mut chunk: Vec<Record> = pending.by_ref().take(chunk_size).collect();
        for record in chunk.iter_mut() {
            app.hooks.before_create(record, ctx)?;
            apply_override(record, ctx.override_.as_ref());
        }
        let mut stored = app.store.insert(schema, &chunk).await?;
        for record in stored.iter_mut() {
            app.hooks.after_create(record, ctx)?;
        }
        tracing::debug!(table = %schema.table, count = stored.len(), "chunk inserted");
        created.extend(stored);
    }
    Ok(created)
}
