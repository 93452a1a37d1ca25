//! Resolved schema descriptors: model configs validated and flattened for runtime use.
//! Immutable once built; one per registered model.

use crate::config::{FeatureConfig, ValidationRule};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage kind of a column; drives value coercion, zero tests and SQL casts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    Float,
    Decimal,
    Bool,
    String,
    Uuid,
    Timestamp,
    Date,
    Json,
}

impl FieldKind {
    /// Infers the kind from a PostgreSQL-style type name.
    pub fn from_type_name(name: &str) -> Option<FieldKind> {
        let lower = name.to_lowercase();
        let kind = if lower.contains("uuid") {
            FieldKind::Uuid
        } else if lower.contains("serial") || lower.contains("int") {
            FieldKind::Int
        } else if lower.starts_with("bool") {
            FieldKind::Bool
        } else if lower.contains("timestamp") || lower == "datetime" {
            FieldKind::Timestamp
        } else if lower == "date" {
            FieldKind::Date
        } else if lower.contains("numeric") || lower.contains("decimal") {
            FieldKind::Decimal
        } else if lower.contains("float") || lower.contains("double") || lower == "real" {
            FieldKind::Float
        } else if lower.starts_with("json") {
            FieldKind::Json
        } else if lower.contains("char") || lower == "text" || lower == "string" || name.contains('.') {
            FieldKind::String
        } else {
            return None;
        };
        Some(kind)
    }

    /// PostgreSQL type every bound parameter for this kind is cast to.
    pub fn default_pg_type(&self) -> &'static str {
        match self {
            FieldKind::Int => "bigint",
            FieldKind::Float => "double precision",
            FieldKind::Decimal => "numeric",
            FieldKind::Bool => "boolean",
            FieldKind::String => "text",
            FieldKind::Uuid => "uuid",
            FieldKind::Timestamp => "timestamptz",
            FieldKind::Date => "date",
            FieldKind::Json => "jsonb",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Decimal => "decimal",
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Uuid => "uuid",
            FieldKind::Timestamp => "time",
            FieldKind::Date => "date",
            FieldKind::Json => "json",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub column: String,
    pub kind: FieldKind,
    /// PostgreSQL type for parameter casts (e.g. "timestamptz", "sample.order_status").
    pub pg_type: String,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub default: Option<Value>,
    pub hidden: bool,
    pub validation: ValidationRule,
}

impl FieldInfo {
    pub fn new(column: impl Into<String>, kind: FieldKind) -> Self {
        let column = column.into();
        FieldInfo {
            name: column.clone(),
            column,
            kind,
            pg_type: kind.default_pg_type().to_string(),
            primary_key: false,
            auto_increment: false,
            nullable: true,
            default: None,
            hidden: false,
            validation: ValidationRule::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn validate(mut self, rule: ValidationRule) -> Self {
        self.validation = rule;
        self
    }

    pub fn pg_type(mut self, pg_type: impl Into<String>) -> Self {
        self.pg_type = pg_type.into();
        self
    }

    /// Whether the store fills this column when the client leaves it out.
    pub fn is_generated(&self) -> bool {
        self.auto_increment || self.default.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// A declared association. Related rows are those where
/// `target.remote_column == self.local_column`.
#[derive(Clone, Debug, Serialize)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    pub local_column: String,
    pub remote_column: String,
}

impl Relation {
    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        Relation {
            name: name.into(),
            kind: RelationKind::BelongsTo,
            target: target.into(),
            local_column: foreign_key.into(),
            remote_column: references.into(),
        }
    }

    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        Relation {
            name: name.into(),
            kind: RelationKind::HasMany,
            target: target.into(),
            local_column: references.into(),
            remote_column: foreign_key.into(),
        }
    }

    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        Relation {
            kind: RelationKind::HasOne,
            ..Relation::has_many(name, target, foreign_key, references)
        }
    }
}

/// Settable "deleted" marker: a timestamp (set to now) or a boolean (set to true).
#[derive(Clone, Debug)]
pub struct SoftDelete {
    pub column: String,
}

pub type Features = FeatureConfig;

#[derive(Clone, Debug)]
pub struct ModelSchema {
    pub name: String,
    pub table: String,
    pub schema_name: Option<String>,
    pub fields: Vec<FieldInfo>,
    pub relations: Vec<Relation>,
    pub features: Features,
    pub soft_delete: Option<SoftDelete>,
}

impl ModelSchema {
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        ModelSchema {
            name: table.clone(),
            table,
            schema_name: None,
            fields: Vec::new(),
            relations: Vec::new(),
            features: Features::default(),
            soft_delete: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    pub fn with_field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn with_soft_delete(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = Some(SoftDelete { column: column.into() });
        self
    }

    pub fn field(&self, column: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.field(column).is_some()
    }

    pub fn primary_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    pub fn primary_columns(&self) -> Vec<String> {
        self.primary_fields().map(|f| f.column.clone()).collect()
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_soft_delete_column(&self, column: &str) -> bool {
        self.soft_delete.as_ref().map(|s| s.column == column).unwrap_or(false)
    }

    /// Column and value that mark a row as deleted, when the model supports soft delete.
    pub fn deleted_marker(&self) -> Option<(String, Value)> {
        let marker = self.soft_delete.as_ref()?;
        let field = self.field(&marker.column)?;
        let value = match field.kind {
            FieldKind::Bool => Value::Bool(true),
            _ => Value::String(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        };
        Some((marker.column.clone(), value))
    }
}

/// Every registered schema keyed by table; read-only after start-up.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    by_table: HashMap<String, Arc<ModelSchema>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    pub fn insert(&mut self, schema: Arc<ModelSchema>) {
        self.by_table.insert(schema.table.clone(), schema);
    }

    pub fn get(&self, table: &str) -> Option<&Arc<ModelSchema>> {
        self.by_table.get(table)
    }

    pub fn len(&self) -> usize {
        self.by_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_kind_from_type_names() {
        assert_eq!(FieldKind::from_type_name("bigserial"), Some(FieldKind::Int));
        assert_eq!(FieldKind::from_type_name("varchar"), Some(FieldKind::String));
        assert_eq!(FieldKind::from_type_name("timestamptz"), Some(FieldKind::Timestamp));
        assert_eq!(FieldKind::from_type_name("numeric"), Some(FieldKind::Decimal));
        assert_eq!(FieldKind::from_type_name("jsonb"), Some(FieldKind::Json));
        assert_eq!(FieldKind::from_type_name("sample.order_status"), Some(FieldKind::String));
        assert_eq!(FieldKind::from_type_name("geometry"), None);
    }

    #[test]
    fn deleted_marker_follows_field_kind() {
        let schema = ModelSchema::new("article")
            .with_field(FieldInfo::new("article_id", FieldKind::Int).primary_key())
            .with_field(FieldInfo::new("archived", FieldKind::Bool))
            .with_soft_delete("archived");
        assert_eq!(
            schema.deleted_marker(),
            Some(("archived".to_string(), Value::Bool(true)))
        );
        assert!(ModelSchema::new("plain").deleted_marker().is_none());
    }
}
