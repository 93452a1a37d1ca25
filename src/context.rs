//! Per-request state threaded through the handler pipeline.

use crate::config::ModelSchema;
use crate::error::ApiError;
use crate::query::CompareOp;
use crate::record::Record;
use crate::resource::{EndpointKind, Resource};
use crate::response::Envelope;
use axum::body::Bytes;
use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Transport-neutral view of an inbound request.
#[derive(Clone, Debug)]
pub struct RestRequest {
    pub method: Method,
    /// Path below the REST prefix, e.g. `/product/7`.
    pub path: String,
    /// Primary key path segments, filled in by the dispatcher.
    pub params: Vec<String>,
    pub raw_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Values set by upstream middleware (authenticated user, tenant, ...).
    pub extensions: Extensions,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        RestRequest {
            method,
            path: path.into(),
            params: Vec::new(),
            raw_query: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            extensions: Extensions::new(),
        }
    }

    pub fn with_query(mut self, raw_query: impl Into<String>) -> Self {
        self.raw_query = raw_query.into();
        self
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = Bytes::from(body.to_string());
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(v) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), v);
        }
        self
    }

    /// First value of a query parameter, URL-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        form_urlencoded::parse(self.raw_query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn query_str(&self, key: &str) -> String {
        self.query(key).unwrap_or_default()
    }

    /// Integer query parameter; 0 when absent or malformed.
    pub fn query_int(&self, key: &str) -> i64 {
        self.query(key).and_then(|v| v.trim().parse().ok()).unwrap_or(0)
    }

    /// Opt-in flag such as `unsafe=1`: present, non-empty and not `0`/`false`.
    pub fn flag(&self, key: &str) -> bool {
        self.query(key)
            .map(|v| !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false")))
            .unwrap_or(false)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(axum::http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }

    pub fn json_body(&self) -> Result<Value, ApiError> {
        if self.body.is_empty() {
            return Err(ApiError::BadRequest("request body is empty".into()));
        }
        serde_json::from_slice(&self.body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
    }
}

/// Code-forced predicate, appended by authorization logic. Always applied after user filters.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

/// Operation identifiers checked by authorizers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    ModelInfo,
    Create,
    Update,
    BatchCreate,
    BatchUpdate,
    Delete,
    BatchDelete,
    ViewGet,
    ViewAll,
    ViewAggregate,
    ViewPagination,
    Set,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ModelInfo => "VIEW+MODEL_INFO",
            Permission::Create => "CREATE",
            Permission::Update => "UPDATE",
            Permission::BatchCreate => "BATCH+CREATE",
            Permission::BatchUpdate => "BATCH+UPDATE",
            Permission::Delete => "DELETE",
            Permission::BatchDelete => "BATCH+DELETE",
            Permission::ViewGet => "VIEW+GET",
            Permission::ViewAll => "VIEW+ALL",
            Permission::ViewAggregate => "VIEW+AGGREGATE",
            Permission::ViewPagination => "VIEW+PAGINATION",
            Permission::Set => "SET",
        }
    }

    pub fn tokens(&self) -> Permissions {
        Permissions::parse(self.as_str())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A composite permission split into its `+`-separated tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn parse(composite: &str) -> Self {
        Permissions(
            composite
                .split('+')
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    /// True when any of `tokens` is part of this permission (case-insensitive).
    pub fn has(&self, tokens: &[&str]) -> bool {
        tokens.iter().any(|t| self.0.iter().any(|p| p.eq_ignore_ascii_case(t)))
    }

    /// True when every one of `tokens` is part of this permission.
    pub fn has_all(&self, tokens: &[&str]) -> bool {
        tokens.iter().all(|t| self.0.iter().any(|p| p.eq_ignore_ascii_case(t)))
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }
}

/// Unit of work for one request. Never shared across requests.
pub struct Context {
    pub request: RestRequest,
    pub resource: Arc<Resource>,
    pub endpoint: EndpointKind,
    pub conditions: Vec<Condition>,
    pub override_: Option<Record>,
    pub response: Envelope,
    /// `language` header, else the `l10n-language` cookie.
    pub language: Option<String>,
    /// `debug=restify`: statements are logged at info level.
    pub debug: bool,
}

impl Context {
    pub fn new(request: RestRequest, resource: Arc<Resource>, endpoint: EndpointKind) -> Self {
        let language = request
            .header("language")
            .map(str::to_string)
            .or_else(|| request.cookie("l10n-language"));
        let debug = request.query("debug").as_deref() == Some("restify");
        Context {
            request,
            resource,
            endpoint,
            conditions: Vec::new(),
            override_: None,
            response: Envelope::default(),
            language,
            debug,
        }
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.resource.schema
    }

    /// Forces `field op value` onto every query this request builds.
    pub fn add_condition(&mut self, field: impl Into<String>, op: CompareOp, value: Value) {
        self.conditions.push(Condition {
            field: field.into(),
            op,
            value,
        });
    }

    /// Fields that replace client input right before every write of this request.
    pub fn set_override(&mut self, record: Record) {
        self.override_ = Some(record);
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.request.extensions.get::<T>()
    }
}
