//! Turns request parameters plus forced conditions into a [`Query`].

use crate::config::{Catalog, ModelSchema};
use crate::context::Context;
use crate::error::ApiError;
use crate::query::filter::{parse_filters, FilterClause, Operator};
use crate::query::{CompareOp, OrderBy, Predicate, Query};
use crate::record::value_from_str;
use crate::resource::EndpointKind;
use regex::Regex;
use std::sync::OnceLock;

/// Column-specific filtering that replaces the built-in operators for that column,
/// e.g. JSON path lookups. Implementations push predicates onto `query`.
pub trait FieldFilter: Send + Sync {
    fn apply(&self, clause: &FilterClause, ctx: &Context, query: &mut Query) -> Result<(), ApiError>;
}

impl<F> FieldFilter for F
where
    F: Fn(&FilterClause, &Context, &mut Query) -> Result<(), ApiError> + Send + Sync,
{
    fn apply(&self, clause: &FilterClause, ctx: &Context, query: &mut Query) -> Result<(), ApiError> {
        self(clause, ctx, query)
    }
}

fn group_column_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+$").expect("group column pattern"))
}

/// Group columns must be plain identifiers naming model columns.
pub fn parse_group_by(raw: &str, schema: &ModelSchema) -> Result<Vec<String>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| {
            if !group_column_regex().is_match(c) {
                return Err(ApiError::BadRequest(format!("invalid group_by column: {c}")));
            }
            if !schema.has_column(c) {
                return Err(ApiError::ColumnNotExist(c.to_string()));
            }
            Ok(c.to_string())
        })
        .collect()
}

/// Builds the query for the context's model in a fixed order: associations, ordering,
/// grouping, field selection, joins, filters then forced conditions, offset, limit.
pub fn apply_filters(ctx: &Context, catalog: &Catalog, max_depth: usize) -> Result<Query, ApiError> {
    let schema = ctx.schema();
    let req = &ctx.request;
    let mut query = Query {
        debug: ctx.debug,
        ..Query::default()
    };

    let associations = req.query_str("associations");
    match associations.as_str() {
        "" => {}
        "1" | "true" | "*" => query.preload.extend(schema.relations.iter().map(|r| r.name.clone())),
        "deep" => query.preload.extend(deep_associations(schema, catalog, max_depth)),
        list => push_preloads(&mut query, schema, catalog, list)?,
    }

    let order = req.query_str("order");
    if !order.is_empty() {
        query.order = parse_order_by(&order, schema);
    }

    // Only aggregates group rows; listings ignore `group_by`.
    if ctx.endpoint == EndpointKind::Aggregate {
        query.group_by = parse_group_by(&req.query_str("group_by"), schema)?;
    }

    // The aggregate endpoint reads `fields` as aggregate expressions.
    let fields = req.query_str("fields");
    if !fields.is_empty() && ctx.endpoint != EndpointKind::Aggregate {
        for column in fields.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if !schema.has_column(column) {
                return Err(ApiError::ColumnNotExist(column.to_string()));
            }
            query.select.push(column.to_string());
        }
    }

    let join = req.query_str("join");
    if !join.is_empty() {
        push_preloads(&mut query, schema, catalog, &join)?;
    }

    for clause in parse_filters(&req.raw_query)? {
        if let Some(custom) = ctx.resource.filters.get(&clause.column) {
            custom.apply(&clause, ctx, &mut query)?;
            continue;
        }
        let predicate = clause_predicate(schema, &clause)?;
        if matches!(clause.operator, Operator::IsNull | Operator::NotNull) && schema.is_soft_delete_column(&clause.column) {
            query.unscoped = true;
        }
        query.predicates.push(predicate);
    }

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

    let offset = req.query_int("offset");
    if offset > 0 {
        query.offset = Some(offset as u64);
    }
    let limit = req.query_int("limit");
    if limit > 0 {
        query.limit = Some(limit as u64);
    }
    Ok(query)
}

fn clause_predicate(schema: &ModelSchema, clause: &FilterClause) -> Result<Predicate, ApiError> {
    let field = schema
        .field(&clause.column)
        .ok_or_else(|| ApiError::ColumnNotExist(clause.column.clone()))?;
    let column = field.column.clone();
    let compare = |op| Predicate::Compare {
        column: column.clone(),
        op,
        value: value_from_str(field, &clause.value),
    };
    let predicate = match clause.operator {
        Operator::Eq => compare(CompareOp::Eq),
        Operator::Neq => compare(CompareOp::Neq),
        Operator::Gt => compare(CompareOp::Gt),
        Operator::Lt => compare(CompareOp::Lt),
        Operator::Gte => compare(CompareOp::Gte),
        Operator::Lte => compare(CompareOp::Lte),
        Operator::In | Operator::NotIn => Predicate::In {
            column: column.clone(),
            values: clause.list().into_iter().map(|v| value_from_str(field, v)).collect(),
            negated: clause.operator == Operator::NotIn,
        },
        Operator::Between => {
            let (low, high) = clause.between_bounds()?;
            Predicate::Between {
                column: column.clone(),
                low: low.into(),
                high: high.into(),
            }
        }
        Operator::Contains => Predicate::Contains {
            column: column.clone(),
            needle: clause.value.clone(),
        },
        Operator::IsNull | Operator::NotNull => Predicate::Null {
            column: column.clone(),
            negated: clause.operator == Operator::NotNull,
        },
        Operator::Search => Predicate::Search {
            column: column.clone(),
            text: clause.value.clone(),
        },
    };
    Ok(predicate)
}

/// `field.asc|desc` tokens, comma-separated. Tokens without a direction, with an unknown
/// direction or naming an unknown column are dropped; the rest keep their order.
pub fn parse_order_by(raw: &str, schema: &ModelSchema) -> Vec<OrderBy> {
    raw.split(',')
        .filter_map(|token| {
            let (column, direction) = token.trim().rsplit_once('.')?;
            let descending = match direction.to_lowercase().as_str() {
                "asc" => false,
                "desc" => true,
                _ => return None,
            };
            schema.has_column(column).then(|| OrderBy {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

fn push_preloads(query: &mut Query, schema: &ModelSchema, catalog: &Catalog, list: &str) -> Result<(), ApiError> {
    for path in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        resolve_path(schema, catalog, path)?;
        if !query.preload.iter().any(|p| p == path) {
            query.preload.push(path.to_string());
        }
    }
    Ok(())
}

/// Checks that every segment of a dotted relation path exists.
fn resolve_path(schema: &ModelSchema, catalog: &Catalog, path: &str) -> Result<(), ApiError> {
    let mut current = schema;
    for segment in path.split('.') {
        let relation = current
            .relation(segment)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown association: {path}")))?;
        current = catalog
            .get(&relation.target)
            .map(|s| s.as_ref())
            .ok_or_else(|| ApiError::BadRequest(format!("unknown association: {path}")))?;
    }
    Ok(())
}

/// Every relation path reachable from `schema`, at most `max_depth` segments long.
/// A relation leading back to a table already on the current path is skipped.
pub fn deep_associations(schema: &ModelSchema, catalog: &Catalog, max_depth: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut visited = vec![schema.table.clone()];
    walk_associations(schema, catalog, "", &mut visited, max_depth, &mut out);
    out
}

fn walk_associations(
    schema: &ModelSchema,
    catalog: &Catalog,
    prefix: &str,
    visited: &mut Vec<String>,
    depth_left: usize,
    out: &mut Vec<String>,
) {
    if depth_left == 0 {
        return;
    }
    for relation in &schema.relations {
        if visited.contains(&relation.target) {
            continue;
        }
        let path = if prefix.is_empty() {
            relation.name.clone()
        } else {
            format!("{prefix}.{}", relation.name)
        };
        out.push(path.clone());
        if let Some(target) = catalog.get(&relation.target) {
            visited.push(target.table.clone());
            walk_associations(target, catalog, &path, visited, depth_left - 1, out);
            visited.pop();
        }
    }
}
