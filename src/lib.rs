//! Restify: convention-driven REST endpoints (CRUD, batch, set, pagination, filtering and
//! aggregation) generated from model descriptors.

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod permission;
pub mod query;
pub mod record;
pub mod resource;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use app::{Restify, RestifyBuilder};
pub use config::{
    load_models_from_path, resolve, Catalog, FieldInfo, FieldKind, ModelConfig, ModelSchema, Relation, RestConfig,
    SetMatch,
};
pub use context::{Context, Permission, Permissions, RestRequest};
pub use error::{ApiError, ConfigError, FieldError};
pub use hooks::{HookEvent, HookRegistry, ModelHooks};
pub use permission::Authorizer;
pub use query::{FieldFilter, FilterClause, Predicate, Query};
pub use record::Record;
pub use resource::{Endpoint, EndpointKind, Resource};
pub use response::{Envelope, Reply};
pub use routes::{common_routes, common_routes_with_ready, rest_routes};
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Store};
