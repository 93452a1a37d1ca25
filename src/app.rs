//! Resource registry and request dispatcher.
//!
//! Everything is registered through [`RestifyBuilder`] before serving starts; a built
//! [`Restify`] is only read, so it can be shared across requests behind an `Arc`.

use crate::config::{Catalog, ModelSchema, RestConfig};
use crate::context::{Context, RestRequest};
use crate::error::{ApiError, ConfigError};
use crate::handlers;
use crate::hooks::{HookEvent, HookRegistry};
use crate::permission::Authorizer;
use crate::record::Record;
use crate::resource::{EndpointKind, Resource};
use crate::response::{Envelope, Reply};
use crate::store::Store;
use axum::http::{Method, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Restify {
    pub(crate) config: RestConfig,
    pub(crate) catalog: Catalog,
    resources: HashMap<String, Arc<Resource>>,
    /// Tables in registration order.
    order: Vec<String>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) hooks: HookRegistry,
    pub(crate) authorizer: Option<Arc<dyn Authorizer>>,
}

impl Restify {
    pub fn builder(store: impl Store + 'static) -> RestifyBuilder {
        RestifyBuilder::new(Arc::new(store))
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn resource(&self, table: &str) -> Option<&Arc<Resource>> {
        self.resources.get(table)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.order.iter().filter_map(|t| self.resources.get(t))
    }

    /// Serves one request whose path is relative to the REST prefix.
    pub async fn dispatch(&self, request: RestRequest) -> Reply {
        let method = request.method.clone();
        let path = request.path.clone();
        tracing::debug!(method = %method, path = %path, "rest request");
        match self.serve(request).await {
            Ok(envelope) => Reply {
                status: StatusCode::OK,
                envelope: envelope.prepare(),
            },
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    tracing::error!(method = %method, path = %path, error = %err, "request failed");
                } else {
                    tracing::debug!(method = %method, path = %path, status = status.as_u16(), error = %err, "request rejected");
                }
                let mut envelope = Envelope::default();
                envelope.fail(&err);
                Reply {
                    status,
                    envelope: envelope.prepare(),
                }
            }
        }
    }

    async fn serve(&self, mut request: RestRequest) -> Result<Envelope, ApiError> {
        let segments: Vec<String> = request
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let Some((table, rest)) = segments.split_first() else {
            return Err(ApiError::HandlerNotFound);
        };

        let Some(resource) = self.resources.get(table).cloned() else {
            if table == "models" && rest.is_empty() && request.method == Method::GET {
                return Ok(self.list_models());
            }
            return Err(ApiError::HandlerNotFound);
        };
        let (kind, params) = match_endpoint(&resource, &request.method, rest).ok_or(ApiError::HandlerNotFound)?;
        request.params = params;
        let mut ctx = Context::new(request, resource, kind);
        handlers::handle(self, &mut ctx).await?;
        Ok(ctx.response)
    }

    fn list_models(&self) -> Envelope {
        let mut envelope = Envelope::default();
        let models: Vec<Value> = self
            .resources()
            .filter_map(|r| serde_json::to_value(r.summary()).ok())
            .collect();
        envelope.set_rows(models);
        envelope
    }
}

/// Endpoint for `method` and the segments after the table. Segments must match in number;
/// static words beat `:param` placeholders. Returns the placeholder values in order.
fn match_endpoint(resource: &Resource, method: &Method, rest: &[String]) -> Option<(EndpointKind, Vec<String>)> {
    resource
        .endpoints
        .iter()
        .filter(|e| &e.method == method && e.segments.len() == rest.len())
        .filter_map(|e| {
            let mut statics = 0;
            let mut params = Vec::new();
            for (pattern, actual) in e.segments.iter().zip(rest) {
                if pattern.starts_with(':') {
                    params.push(actual.clone());
                } else if pattern == actual {
                    statics += 1;
                } else {
                    return None;
                }
            }
            Some((statics, e.kind, params))
        })
        .max_by_key(|(statics, _, _)| *statics)
        .map(|(_, kind, params)| (kind, params))
}

pub struct RestifyBuilder {
    config: RestConfig,
    resources: Vec<Resource>,
    hooks: HookRegistry,
    authorizer: Option<Arc<dyn Authorizer>>,
    store: Arc<dyn Store>,
}

impl RestifyBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        RestifyBuilder {
            config: RestConfig::default(),
            resources: Vec::new(),
            hooks: HookRegistry::new(),
            authorizer: None,
            store,
        }
    }

    pub fn config(mut self, config: RestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Registers a model with default behaviour.
    pub fn model(self, schema: ModelSchema) -> Self {
        self.register(Resource::new(schema))
    }

    pub fn models(self, schemas: impl IntoIterator<Item = ModelSchema>) -> Self {
        schemas.into_iter().fold(self, |b, s| b.model(s))
    }

    /// Global callback for every model.
    pub fn on<F>(mut self, event: HookEvent, callback: F) -> Self
    where
        F: Fn(&mut Record, &mut Context) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.hooks.on(event, callback);
        self
    }

    /// Default permission handler, used for models without their own authorizer.
    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    pub fn build(self) -> Result<Restify, ConfigError> {
        let mut catalog = Catalog::new();
        let mut resources = HashMap::new();
        let mut order = Vec::new();
        for mut resource in self.resources {
            let table = resource.table().to_string();
            if resources.contains_key(&table) {
                return Err(ConfigError::DuplicateTable(table));
            }
            if resource.schema.primary_fields().next().is_none() {
                return Err(ConfigError::MissingPrimaryKey { table });
            }
            resource.generate_endpoints(&self.config.prefix);
            catalog.insert(resource.schema.clone());
            order.push(table.clone());
            resources.insert(table, Arc::new(resource));
        }
        for resource in resources.values() {
            for relation in &resource.schema.relations {
                if catalog.get(&relation.target).is_none() {
                    return Err(ConfigError::MissingReference {
                        kind: "table",
                        id: relation.target.clone(),
                    });
                }
            }
        }
        tracing::info!(models = order.len(), prefix = %self.config.prefix, "rest resources registered");
        Ok(Restify {
            config: self.config,
            catalog,
            resources,
            order,
            store: self.store,
            hooks: self.hooks,
            authorizer: self.authorizer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldInfo, FieldKind};

    fn order_line() -> Resource {
        Resource::new(
            ModelSchema::new("order_line")
                .with_field(FieldInfo::new("order_id", FieldKind::Int).primary_key())
                .with_field(FieldInfo::new("line_no", FieldKind::Int).primary_key()),
        )
    }

    fn segs(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn static_segments_win_over_placeholders() {
        let r = order_line();
        assert_eq!(
            match_endpoint(&r, &Method::GET, &segs(&["all"])),
            Some((EndpointKind::All, vec![]))
        );
        assert_eq!(
            match_endpoint(&r, &Method::GET, &segs(&["7", "2"])),
            Some((EndpointKind::Get, segs(&["7", "2"])))
        );
        assert_eq!(
            match_endpoint(&r, &Method::PATCH, &segs(&["batch"])),
            Some((EndpointKind::BatchUpdate, vec![]))
        );
        assert_eq!(match_endpoint(&r, &Method::GET, &segs(&[])).map(|m| m.0), Some(EndpointKind::ModelInfo));
        assert_eq!(match_endpoint(&r, &Method::POST, &segs(&["7"])), None);
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let built = Restify::builder(crate::store::MemoryStore::new())
            .register(order_line())
            .register(order_line())
            .build();
        assert!(matches!(built, Err(ConfigError::DuplicateTable(t)) if t == "order_line"));
    }
}
