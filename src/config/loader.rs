//! Resolve model configs into schema descriptors; load them from JSON; read runtime settings.

use crate::config::resolved::{FieldInfo, FieldKind, ModelSchema, Relation, RelationKind, SoftDelete};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Build resolved schemas from model configs (validates first).
pub fn resolve(models: &[ModelConfig]) -> Result<Vec<ModelSchema>, ConfigError> {
    validate(models)?;
    let pk_by_table: HashMap<&str, &str> = models
        .iter()
        .filter_map(|m| {
            m.fields
                .iter()
                .find(|f| f.primary_key)
                .map(|f| (m.table.as_str(), f.column.as_str()))
        })
        .collect();

    let mut out = Vec::with_capacity(models.len());
    for m in models {
        let mut fields = Vec::with_capacity(m.fields.len());
        for f in &m.fields {
            let ty = f.type_.name();
            let kind = FieldKind::from_type_name(ty).ok_or_else(|| ConfigError::UnknownType {
                column: f.column.clone(),
                ty: ty.to_string(),
            })?;
            fields.push(FieldInfo {
                name: f.name.clone().unwrap_or_else(|| f.column.clone()),
                column: f.column.clone(),
                kind,
                pg_type: column_pg_type_name(ty, kind),
                primary_key: f.primary_key,
                auto_increment: f.auto_increment || ty.to_lowercase().contains("serial"),
                nullable: f.nullable && !f.primary_key,
                default: f.default.clone(),
                hidden: f.hidden,
                validation: f.validation.clone(),
            });
        }

        let relations = m
            .relations
            .iter()
            .map(|r| match r.kind {
                RelationKindConfig::BelongsTo => {
                    let references = r
                        .references
                        .clone()
                        .unwrap_or_else(|| pk_by_table.get(r.table.as_str()).copied().unwrap_or("id").to_string());
                    Relation::belongs_to(&r.name, &r.table, &r.foreign_key, references)
                }
                RelationKindConfig::HasOne | RelationKindConfig::HasMany => {
                    let references = r
                        .references
                        .clone()
                        .unwrap_or_else(|| pk_by_table.get(m.table.as_str()).copied().unwrap_or("id").to_string());
                    let mut rel = Relation::has_many(&r.name, &r.table, &r.foreign_key, references);
                    if r.kind == RelationKindConfig::HasOne {
                        rel.kind = RelationKind::HasOne;
                    }
                    rel
                }
            })
            .collect();

        out.push(ModelSchema {
            name: m.name.clone().unwrap_or_else(|| m.table.clone()),
            table: m.table.clone(),
            schema_name: m.schema.clone(),
            fields,
            relations,
            features: m.features.clone(),
            soft_delete: m.soft_delete.as_ref().map(|s| SoftDelete { column: s.column.clone() }),
        });
    }
    Ok(out)
}

/// Cast target for bound parameters. Timestamp flavours and schema-qualified enums keep
/// their declared name; everything else uses the kind's canonical type.
fn column_pg_type_name(name: &str, kind: FieldKind) -> String {
    let lower = name.to_lowercase();
    if lower == "timestamp" || lower.starts_with("timestamp without") {
        "timestamp".into()
    } else if name.contains('.') {
        name.to_string()
    } else {
        kind.default_pg_type().to_string()
    }
}

/// Load model configs from a JSON file holding an array of model documents.
pub async fn load_models_from_path(path: impl AsRef<Path>) -> Result<Vec<ModelConfig>, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading model config");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// How Set reconciliation decides whether a stored row and a submitted entry are the same.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetMatch {
    /// Fields that are zero on either side never count as a mismatch.
    IgnoreZero,
    /// Every non-nested field present in the submitted entry must match exactly.
    PresentFields,
}

impl std::str::FromStr for SetMatch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore_zero" | "" => Ok(SetMatch::IgnoreZero),
            "present_fields" | "strict" => Ok(SetMatch::PresentFields),
            other => Err(ConfigError::Validation(format!("unknown set match policy: {other}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RestConfig {
    pub prefix: String,
    pub batch_size: usize,
    pub set_match: SetMatch,
    pub max_body_bytes: usize,
    pub sanitize_input: bool,
    pub association_depth: usize,
}

impl Default for RestConfig {
    fn default() -> Self {
        RestConfig {
            prefix: "/admin/rest".into(),
            batch_size: 100,
            set_match: SetMatch::IgnoreZero,
            max_body_bytes: 2 * 1024 * 1024,
            sanitize_input: false,
            association_depth: 4,
        }
    }
}

impl RestConfig {
    /// Settings from `RESTIFY_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RestConfig::default();
        let prefix = std::env::var("RESTIFY_PREFIX").unwrap_or_else(|_| defaults.prefix.clone());
        let batch_size = env_number("RESTIFY_BATCH_SIZE", defaults.batch_size)?;
        let max_body_bytes = env_number("RESTIFY_MAX_BODY_BYTES", defaults.max_body_bytes)?;
        let set_match = std::env::var("RESTIFY_SET_MATCH")
            .unwrap_or_else(|_| "ignore_zero".into())
            .parse()?;
        let sanitize_input = std::env::var("RESTIFY_SANITIZE")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.sanitize_input);
        Ok(RestConfig {
            prefix: normalize_prefix(&prefix),
            batch_size: batch_size.max(1),
            set_match,
            max_body_bytes,
            sanitize_input,
            association_depth: defaults.association_depth,
        })
    }
}

fn env_number(key: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{key} must be a positive integer, got {v:?}"))),
        Err(_) => Ok(default),
    }
}

/// Leading slash, no trailing slash; "/" becomes empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
