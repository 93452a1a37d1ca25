//! Association preloading: one `IN` query per relation and level, attached under the
//! relation name.

use super::{Predicate, Query};
use crate::config::{Catalog, ModelSchema, RelationKind};
use crate::error::ApiError;
use crate::record::{scalar_string, to_response, Record};
use crate::store::Store;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Groups dotted paths by their first segment, keeping first-seen order.
fn path_tree(paths: &[String]) -> Vec<(String, Vec<String>)> {
    let mut tree: Vec<(String, Vec<String>)> = Vec::new();
    for path in paths {
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path.as_str(), None),
        };
        let idx = match tree.iter().position(|(name, _)| name == head) {
            Some(i) => i,
            None => {
                tree.push((head.to_string(), Vec::new()));
                tree.len() - 1
            }
        };
        if let Some(rest) = rest.filter(|r| !r.is_empty()) {
            tree[idx].1.push(rest.to_string());
        }
    }
    tree
}

/// With a narrowed select list, adds the primary key and every column a first-level
/// preload joins on, so related rows can still be matched.
pub fn ensure_join_columns(schema: &ModelSchema, query: &mut Query) {
    if query.select.is_empty() || query.preload.is_empty() {
        return;
    }
    let mut needed = schema.primary_columns();
    for (name, _) in path_tree(&query.preload) {
        if let Some(rel) = schema.relation(&name) {
            needed.push(rel.local_column.clone());
        }
    }
    for column in needed {
        if !query.select.contains(&column) {
            query.select.push(column);
        }
    }
}

/// Loads every relation path for `rows` and stores the result on each row: an object
/// (or null) for to-one relations, an array for has-many.
pub fn load_preloads<'a>(
    store: &'a dyn Store,
    catalog: &'a Catalog,
    schema: &'a ModelSchema,
    rows: &'a mut [Record],
    paths: &'a [String],
    debug: bool,
) -> BoxFuture<'a, Result<(), ApiError>> {
    Box::pin(async move {
        if rows.is_empty() {
            return Ok(());
        }
        for (name, children) in path_tree(paths) {
            let Some(rel) = schema.relation(&name) else {
                continue;
            };
            let target = catalog.get(&rel.target).ok_or_else(|| {
                ApiError::Internal(format!("relation {} targets unknown table {}", rel.name, rel.target))
            })?;

            let mut keys: Vec<Value> = Vec::new();
            for row in rows.iter() {
                if let Some(v) = row.get(&rel.local_column).filter(|v| !v.is_null()) {
                    if !keys.iter().any(|k| scalar_string(k) == scalar_string(v)) {
                        keys.push(v.clone());
                    }
                }
            }

            let mut related = if keys.is_empty() {
                Vec::new()
            } else {
                let mut q = Query::new().filter(Predicate::In {
                    column: rel.remote_column.clone(),
                    values: keys,
                    negated: false,
                });
                q.debug = debug;
                store.find(target, &q).await?
            };
            if !children.is_empty() && !related.is_empty() {
                load_preloads(store, catalog, target, &mut related, &children, debug).await?;
            }

            for row in rows.iter_mut() {
                let key = row.get(&rel.local_column).filter(|v| !v.is_null()).map(scalar_string);
                let mut matching = related.iter().filter(|r| {
                    key.as_deref()
                        .map(|k| r.get(&rel.remote_column).map(scalar_string).as_deref() == Some(k))
                        .unwrap_or(false)
                });
                let value = match rel.kind {
                    RelationKind::HasMany => {
                        Value::Array(matching.map(|r| to_response(target, r.clone())).collect())
                    }
                    RelationKind::BelongsTo | RelationKind::HasOne => matching
                        .next()
                        .map(|r| to_response(target, r.clone()))
                        .unwrap_or(Value::Null),
                };
                row.insert(rel.name.clone(), value);
            }
            tracing::debug!(table = %schema.table, relation = %rel.name, "preloaded");
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_group_under_first_segment() {
        let paths = vec!["author".to_string(), "comments.user".to_string(), "comments".to_string()];
        assert_eq!(
            path_tree(&paths),
            vec![
                ("author".to_string(), vec![]),
                ("comments".to_string(), vec!["user".to_string()]),
            ]
        );
    }
}
