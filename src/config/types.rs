//! Raw model config documents (JSON), resolved into schema descriptors by the loader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub table: String,
    /// Display name of the model. Defaults to the table name.
    #[serde(default)]
    pub name: Option<String>,
    /// PostgreSQL schema the table lives in. Unqualified when omitted.
    #[serde(default)]
    pub schema: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub soft_delete: Option<SoftDeleteConfig>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Logical (display) name. Defaults to the column name.
    #[serde(default)]
    pub name: Option<String>,
    pub column: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Never exposed in API responses (e.g. password hashes, secrets).
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub validation: ValidationRule,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKindConfig {
    BelongsTo,
    HasOne,
    HasMany,
}

/// `belongs_to`: our `foreign_key` points at the target's `references` (default: target pk).
/// `has_one`/`has_many`: the target's `foreign_key` points at our `references` (default: our pk).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub kind: RelationKindConfig,
    pub table: String,
    pub foreign_key: String,
    #[serde(default)]
    pub references: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_true")]
    pub api: bool,
    #[serde(default)]
    pub disable_create: bool,
    #[serde(default)]
    pub disable_update: bool,
    #[serde(default)]
    pub disable_list: bool,
    #[serde(default)]
    pub disable_delete: bool,
    #[serde(default)]
    pub disable_set: bool,
    #[serde(default)]
    pub disable_aggregate: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            api: true,
            disable_create: false,
            disable_update: false,
            disable_list: false,
            disable_delete: false,
            disable_set: false,
            disable_aggregate: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftDeleteConfig {
    pub column: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// One of `email`, `uuid`, `alpha`, `alphanumeric`, `numeric`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ValidationRule {
    pub fn is_empty(&self) -> bool {
        *self == ValidationRule::default()
    }
}
