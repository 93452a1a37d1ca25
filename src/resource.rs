//! Resources: a registered model with its generated endpoints and optional capabilities.

use crate::config::{FieldKind, Features, ModelSchema, RelationKind};
use crate::hooks::{ModelHooks, NoHooks};
use crate::permission::Authorizer;
use crate::query::FieldFilter;
use axum::http::Method;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    ModelInfo,
    Set,
    All,
    Paginate,
    Aggregate,
    Get,
    Create,
    BatchCreate,
    BatchUpdate,
    Update,
    Replace,
    BatchDelete,
    Delete,
}

fn serialize_method<S: Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

#[derive(Clone, Debug, Serialize)]
pub struct Endpoint {
    pub name: String,
    #[serde(skip)]
    pub kind: EndpointKind,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    /// Path below the table segment: empty, a static word, or `:pk` params.
    #[serde(skip)]
    pub segments: Vec<String>,
    pub pk_url: bool,
    #[serde(rename = "url")]
    pub absolute_uri: String,
    pub description: String,
    pub batch: bool,
    pub accept_data: bool,
    pub filterable: bool,
    pub pagination: bool,
}

struct EndpointSpec {
    name: &'static str,
    kind: EndpointKind,
    method: Method,
    url: &'static str,
    pk_url: bool,
    batch: bool,
    accept_data: bool,
    filterable: bool,
    pagination: bool,
    description: &'static str,
}

impl EndpointSpec {
    fn new(name: &'static str, kind: EndpointKind, method: Method, url: &'static str, description: &'static str) -> Self {
        EndpointSpec {
            name,
            kind,
            method,
            url,
            pk_url: false,
            batch: false,
            accept_data: false,
            filterable: false,
            pagination: false,
            description,
        }
    }

    fn pk(mut self) -> Self {
        self.pk_url = true;
        self
    }

    fn batch(mut self) -> Self {
        self.batch = true;
        self
    }

    fn body(mut self) -> Self {
        self.accept_data = true;
        self
    }

    fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    fn paginated(mut self) -> Self {
        self.pagination = true;
        self
    }
}

/// Endpoint list in registration order, honouring the model's feature flags.
fn endpoint_specs(features: &Features) -> Vec<EndpointSpec> {
    use EndpointKind::*;
    let mut specs = Vec::new();
    if !features.api {
        return specs;
    }
    specs.push(EndpointSpec::new("MODEL INFO", ModelInfo, Method::GET, "", "return information of the model"));
    if !features.disable_set {
        specs.push(
            EndpointSpec::new("SET", Set, Method::POST, "set", "set objects in database")
                .body()
                .batch()
                .filterable(),
        );
    }
    if !features.disable_list {
        specs.push(EndpointSpec::new("ALL", All, Method::GET, "all", "return all objects in one call").filterable());
        specs.push(
            EndpointSpec::new("PAGINATE", Paginate, Method::GET, "paginate", "paginate objects")
                .filterable()
                .paginated(),
        );
    }
    if !features.disable_aggregate {
        specs.push(
            EndpointSpec::new("AGGREGATE", Aggregate, Method::GET, "aggregate", "aggregate objects using field.function pairs")
                .filterable(),
        );
    }
    if !features.disable_list {
        specs.push(EndpointSpec::new("GET", Get, Method::GET, "", "get single object using primary key").pk());
    }
    if !features.disable_create {
        specs.push(EndpointSpec::new("CREATE", Create, Method::PUT, "", "create an object using given values").body());
        specs.push(
            EndpointSpec::new("BATCH.CREATE", BatchCreate, Method::PUT, "batch", "create a batch of objects")
                .body()
                .batch(),
        );
    }
    if !features.disable_update {
        specs.push(
            EndpointSpec::new("BATCH.UPDATE", BatchUpdate, Method::PATCH, "batch", "update batch objects")
                .body()
                .filterable(),
        );
        specs.push(
            EndpointSpec::new("UPDATE", Update, Method::PATCH, "", "update single object select using primary key")
                .body()
                .pk(),
        );
        specs.push(
            EndpointSpec::new("REPLACE", Replace, Method::PUT, "", "replace every field of a single object select using primary key")
                .body()
                .pk(),
        );
    }
    if !features.disable_delete {
        specs.push(
            EndpointSpec::new("BATCH.DELETE", BatchDelete, Method::DELETE, "batch", "batch delete objects").filterable(),
        );
        specs.push(EndpointSpec::new("DELETE", Delete, Method::DELETE, "", "delete existing object using primary key").pk());
    }
    specs
}

/// `BATCH.CREATE` -> `BatchCreate`, `MODEL INFO` -> `ModelInfo`.
fn camel_name(name: &str) -> String {
    name.split(|c: char| c == '.' || c == ' ' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let lower = w.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// A registered model. Built once during start-up and shared read-only afterwards.
pub struct Resource {
    pub schema: Arc<ModelSchema>,
    pub endpoints: Vec<Endpoint>,
    pub hooks: Arc<dyn ModelHooks>,
    /// Model permission hook; when set the global authorizer is never consulted.
    pub authorizer: Option<Arc<dyn Authorizer>>,
    /// Columns whose filter terms are handled by custom code instead of built-in operators.
    pub filters: HashMap<String, Arc<dyn FieldFilter>>,
}

impl Resource {
    pub fn new(schema: ModelSchema) -> Self {
        let mut resource = Resource {
            schema: Arc::new(schema),
            endpoints: Vec::new(),
            hooks: Arc::new(NoHooks),
            authorizer: None,
            filters: HashMap::new(),
        };
        resource.generate_endpoints("");
        resource
    }

    pub fn with_hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    pub fn with_filter(mut self, column: impl Into<String>, filter: impl FieldFilter + 'static) -> Self {
        self.filters.insert(column.into(), Arc::new(filter));
        self
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    /// Rebuilds the endpoint list under `prefix` (already normalised).
    pub(crate) fn generate_endpoints(&mut self, prefix: &str) {
        let pk_segments: Vec<String> = self.schema.primary_fields().map(|f| format!(":{}", f.column)).collect();
        let mut endpoints = Vec::new();
        for spec in endpoint_specs(&self.schema.features) {
            let mut segments: Vec<String> = Vec::new();
            if !spec.url.is_empty() {
                segments.push(spec.url.to_string());
            }
            if spec.pk_url {
                segments.extend(pk_segments.iter().cloned());
            }
            let mut absolute_uri = format!("{}/{}", prefix, self.schema.table);
            for s in &segments {
                absolute_uri.push('/');
                absolute_uri.push_str(s);
            }
            let mut endpoint = Endpoint {
                name: camel_name(spec.name),
                kind: spec.kind,
                method: spec.method,
                segments,
                pk_url: spec.pk_url,
                absolute_uri,
                description: String::new(),
                batch: spec.batch,
                accept_data: spec.accept_data,
                filterable: spec.filterable,
                pagination: spec.pagination,
            };
            endpoint.description = self.describe(&endpoint, spec.description);
            endpoints.push(endpoint);
        }
        self.endpoints = endpoints;
    }

    pub fn endpoint(&self, kind: EndpointKind) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.kind == kind)
    }

    /// Markdown help text for one endpoint.
    fn describe(&self, endpoint: &Endpoint, summary: &str) -> String {
        let mut lines = vec![summary.to_string(), "---".to_string()];
        if endpoint.accept_data {
            lines.push("- Accepts body in `application/json` format.".into());
        }
        if endpoint.batch {
            lines.push("- Supports batch operations: send a JSON array of objects as the request body.".into());
        }
        if endpoint.pagination {
            lines.push(
                "- Supports pagination. Specify the page number and size using query parameters: `page` and `size`.".into(),
            );
        }
        if endpoint.filterable {
            lines.push("- Supports filtering using query parameters: `field[op]=value`.".into());
        }
        if endpoint.pk_url {
            lines.push(format!(
                "- This endpoint requires a primary key in the URL as following format {}",
                endpoint.absolute_uri
            ));
        }
        if endpoint.accept_data {
            lines.push("---".into());
            lines.push("### Acceptable fields and their types:".into());
            lines.push("| Field | Type | Description | Validation |".into());
            lines.push("| ------ | ------ | ------ | ------ |".into());
            for field in self.schema.fields.iter().filter(|f| !f.hidden) {
                let mut additional = Vec::new();
                if field.primary_key {
                    additional.push("`Primary Key`".to_string());
                }
                if field.auto_increment {
                    additional.push("`AutoIncrement`".to_string());
                }
                if let Some(default) = &field.default {
                    additional.push(format!("`Default:{}`", default));
                }
                if field.nullable {
                    additional.push("`Accept Null`".to_string());
                }
                let validation = if field.validation.is_empty() {
                    "`none`".to_string()
                } else {
                    format!(
                        "`{}`",
                        serde_json::to_string(&field.validation).unwrap_or_default()
                    )
                };
                lines.push(format!(
                    "| `{}` | {} | {} | {} |",
                    field.column,
                    field.kind.name(),
                    additional.join(","),
                    validation
                ));
            }
        }
        if endpoint.filterable && !self.schema.relations.is_empty() {
            lines.push("---".into());
            lines.push("### Loadable Associations:".into());
            lines.push("| Association | Type | URL Pattern |".into());
            lines.push("| ------ | ------ | ------ |".into());
            for rel in &self.schema.relations {
                let kind = match rel.kind {
                    RelationKind::BelongsTo => "belongs to",
                    RelationKind::HasOne => "has one",
                    RelationKind::HasMany => "has many",
                };
                lines.push(format!("| {} | `{}` | associations={} |", rel.name, kind, rel.name));
            }
        }
        lines.join("\n")
    }

    /// Payload of the model info endpoint.
    pub fn info(&self) -> ModelInfo<'_> {
        ModelInfo {
            name: &self.schema.name,
            id: &self.schema.table,
            fields: self
                .schema
                .fields
                .iter()
                .filter(|f| !f.hidden)
                .map(|f| FieldSummary {
                    name: &f.name,
                    db_name: &f.column,
                    kind: f.kind,
                    default: f.default.as_ref(),
                    pk: f.primary_key,
                })
                .collect(),
            endpoints: &self.endpoints,
        }
    }

    /// Entry of the `/models` listing.
    pub fn summary(&self) -> ResourceSummary<'_> {
        ResourceSummary {
            table: &self.schema.table,
            model: &self.schema.name,
            path: &self.schema.table,
            primary_key: self.schema.primary_columns(),
            feature: &self.schema.features,
            actions: &self.endpoints,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FieldSummary<'a> {
    pub name: &'a str,
    pub db_name: &'a str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'a serde_json::Value>,
    pub pk: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub fields: Vec<FieldSummary<'a>>,
    pub endpoints: &'a [Endpoint],
}

#[derive(Debug, Serialize)]
pub struct ResourceSummary<'a> {
    pub table: &'a str,
    pub model: &'a str,
    pub path: &'a str,
    pub primary_key: Vec<String>,
    pub feature: &'a Features,
    pub actions: &'a [Endpoint],
}
