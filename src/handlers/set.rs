//! Set reconciliation: converge the rows in the filtered scope to the submitted array.
//!
//! Which rows to delete and which entries to create is decided once, up front, on the
//! loaded rows and the parsed body as they are. Hooks run afterwards, inside each pass, so
//! fields they change never affect membership. Soft-deleted rows in scope take part too,
//! so an entry matching one is kept rather than inserted again.

use super::{build_query, create_records, gate, guard_unsafe, parse_array};
use crate::app::Restify;
use crate::context::{Context, Permission};
use crate::error::ApiError;
use crate::query::Query;
use crate::record::{records_equivalent, to_response, Record};
use serde_json::json;

pub async fn set(app: &Restify, ctx: &mut Context) -> Result<(), ApiError> {
    gate(app, ctx, Permission::Set, None)?;
    let resource = ctx.resource.clone();
    let schema = &resource.schema;
    let query = build_query(app, ctx)?;
    guard_unsafe(ctx, &query)?;
    let submitted = parse_array(app, ctx)?;
    let existing = app.store.find(schema, &query.scope_only().unscoped()).await?;

    let policy = app.config.set_match;
    let (mut stale, kept): (Vec<Record>, Vec<Record>) = existing
        .into_iter()
        .partition(|row| !submitted.iter().any(|entry| records_equivalent(schema, row, entry, policy)));
    let fresh: Vec<Record> = submitted
        .into_iter()
        .filter(|entry| !kept.iter().any(|row| records_equivalent(schema, row, entry, policy)))
        .collect();

    for row in stale.iter_mut() {
        app.hooks.before_delete(row, ctx)?;
        let mut by_key = Query::for_record(schema, row)?.unscoped();
        by_key.debug = ctx.debug;
        app.store.delete(schema, &by_key).await?;
        app.hooks.after_delete(row, ctx)?;
    }
    let created = create_records(app, ctx, fresh).await?;
    tracing::info!(
        table = %schema.table,
        created = created.len(),
        deleted = stale.len(),
        "set reconciled"
    );

    if ctx.request.flag("return") {
        let rows = app.store.find(schema, &query.clone().unscoped()).await?;
        ctx.response.set_rows(rows.into_iter().map(|r| to_response(schema, r)).collect());
    } else {
        ctx.response.data = json!({ "created": created.len(), "deleted": stale.len() });
    }
    Ok(())
}
