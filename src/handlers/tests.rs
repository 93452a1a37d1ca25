//! End-to-end handler tests: requests go through `Restify::dispatch` against a memory store.

use crate::app::{Restify, RestifyBuilder};
use crate::config::{FieldInfo, FieldKind, ModelSchema, Relation, RestConfig, ValidationRule};
use crate::context::{Context, Permissions, RestRequest};
use crate::error::ApiError;
use crate::hooks::HookEvent;
use crate::query::CompareOp;
use crate::record::Record;
use crate::resource::Resource;
use crate::response::Reply;
use crate::store::{MemoryStore, Store};
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn supplier() -> ModelSchema {
    ModelSchema::new("supplier")
        .with_field(FieldInfo::new("supplier_id", FieldKind::Int).primary_key().auto_increment())
        .with_field(FieldInfo::new("company", FieldKind::String).validate(ValidationRule {
            required: Some(true),
            max_length: Some(20),
            ..Default::default()
        }))
        .with_field(FieldInfo::new("email", FieldKind::String).validate(ValidationRule {
            format: Some("email".into()),
            ..Default::default()
        }))
        .with_relation(Relation::has_many("products", "product", "supplier_id", "supplier_id"))
}

fn product() -> ModelSchema {
    ModelSchema::new("product")
        .with_field(FieldInfo::new("product_id", FieldKind::Int).primary_key().auto_increment())
        .with_field(FieldInfo::new("name", FieldKind::String))
        .with_field(FieldInfo::new("unit_price", FieldKind::Float))
        .with_field(FieldInfo::new("supplier_id", FieldKind::Int))
        .with_field(FieldInfo::new("owner_id", FieldKind::Int))
        .with_field(FieldInfo::new("deleted_at", FieldKind::Timestamp))
        .with_soft_delete("deleted_at")
        .with_relation(Relation::belongs_to("supplier", "supplier", "supplier_id", "supplier_id"))
}

fn product_tag() -> ModelSchema {
    ModelSchema::new("product_tag")
        .with_field(FieldInfo::new("product_id", FieldKind::Int).primary_key())
        .with_field(FieldInfo::new("tag", FieldKind::String).primary_key())
        .with_field(FieldInfo::new("weight", FieldKind::Int))
}

fn builder(store: &Arc<MemoryStore>) -> RestifyBuilder {
    RestifyBuilder::new(store.clone())
}

fn shop(store: &Arc<MemoryStore>) -> Restify {
    builder(store)
        .model(supplier())
        .model(product())
        .model(product_tag())
        .build()
        .unwrap()
}

async fn seed(store: &MemoryStore, schema: &ModelSchema, rows: Value) {
    let rows: Vec<Record> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_object().cloned().unwrap())
        .collect();
    store.insert(schema, &rows).await.unwrap();
}

async fn send(app: &Restify, method: Method, path: &str, query: &str, body: Option<Value>) -> Reply {
    let mut request = RestRequest::new(method, path).with_query(query);
    if let Some(body) = body {
        request = request.with_json(&body);
    }
    app.dispatch(request).await
}

fn names(reply: &Reply) -> Vec<String> {
    reply
        .envelope
        .data
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

async fn seed_products(store: &MemoryStore) {
    seed(
        store,
        &product(),
        json!([
            { "name": "Milk Chocolate", "unit_price": 60.0, "supplier_id": 1, "owner_id": 7 },
            { "name": "Milk", "unit_price": 20.0, "supplier_id": 1, "owner_id": 8 },
            { "name": "Oat Milk", "unit_price": 75.0, "supplier_id": 2, "owner_id": 7 },
            { "name": "Bread", "unit_price": 80.0, "supplier_id": 2, "owner_id": 8 }
        ]),
    )
    .await;
}

#[tokio::test]
async fn list_applies_filters_and_order() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed_products(&store).await;

    let reply = send(&app, Method::GET, "/product/all", "unit_price[gte]=50&name[contains]=Milk", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(names(&reply), vec!["Milk Chocolate", "Oat Milk"]);
    assert_eq!(reply.envelope.total, 2);

    let reply = send(&app, Method::GET, "/product/all", "order=unit_price.desc&limit=2", None).await;
    assert_eq!(names(&reply), vec!["Bread", "Oat Milk"]);

    let reply = send(&app, Method::GET, "/product/all", "name[like]=Milk", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(!reply.envelope.success);
    assert!(reply.envelope.data.is_null());

    let reply = send(&app, Method::GET, "/product/all", "colour[eq]=red", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    assert_eq!(send(&app, Method::GET, "/nothing/all", "", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::POST, "/product/7", "", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::GET, "/product_tag/1", "", None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_patch_and_replace_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);

    let created = send(&app, Method::PUT, "/product", "", Some(json!({ "name": "Tea", "unit_price": 3.5, "supplier_id": 4 }))).await;
    assert_eq!(created.status, StatusCode::OK);
    assert_eq!(created.envelope.data["product_id"], json!(1));

    let patched = send(&app, Method::PATCH, "/product/1", "", Some(json!({ "unit_price": 4.0, "name": "" }))).await;
    assert_eq!(patched.status, StatusCode::OK);
    assert_eq!(patched.envelope.data["name"], json!("Tea"));
    assert_eq!(patched.envelope.data["unit_price"], json!(4.0));

    let fetched = send(&app, Method::GET, "/product/1", "", None).await;
    assert_eq!(fetched.envelope.data, patched.envelope.data);

    let replaced = send(&app, Method::PUT, "/product/1", "", Some(json!({ "name": "Green tea" }))).await;
    assert_eq!(replaced.status, StatusCode::OK);
    assert_eq!(replaced.envelope.data["name"], json!("Green tea"));
    assert!(replaced.envelope.data["unit_price"].is_null());
    assert!(replaced.envelope.data["supplier_id"].is_null());

    let missing = send(&app, Method::PATCH, "/product/9", "", Some(json!({ "name": "x" }))).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    let bad_key = send(&app, Method::GET, "/product/abc", "", None).await;
    assert_eq!(bad_key.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn override_wins_over_client_values() {
    let store = Arc::new(MemoryStore::new());
    let app = builder(&store)
        .authorizer(|p: &Permissions, _: Option<&Record>, ctx: &mut Context| {
            if p.has(&["CREATE", "UPDATE"]) {
                let mut forced = Record::new();
                forced.insert("owner_id".into(), json!(7));
                ctx.set_override(forced);
            }
            true
        })
        .model(supplier())
        .model(product())
        .build()
        .unwrap();

    let created = send(&app, Method::PUT, "/product", "", Some(json!({ "name": "Tea", "owner_id": 99 }))).await;
    assert_eq!(created.envelope.data["owner_id"], json!(7));

    let patched = send(&app, Method::PATCH, "/product/1", "", Some(json!({ "owner_id": 55, "name": "Black tea" }))).await;
    assert_eq!(patched.envelope.data["owner_id"], json!(7));
    assert_eq!(patched.envelope.data["name"], json!("Black tea"));
    assert_eq!(store.rows("product")[0]["owner_id"], json!(7));
}

#[tokio::test]
async fn model_authorizer_replaces_global_and_forces_conditions() {
    let store = Arc::new(MemoryStore::new());
    let global_calls = Arc::new(AtomicUsize::new(0));
    let counter = global_calls.clone();
    let app = builder(&store)
        .authorizer(move |_: &Permissions, _: Option<&Record>, _: &mut Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .model(supplier())
        .register(Resource::new(product()).with_authorizer(
            |p: &Permissions, _: Option<&Record>, ctx: &mut Context| {
                if p.has(&["DELETE"]) {
                    return false;
                }
                ctx.add_condition("owner_id", CompareOp::Eq, json!(7));
                true
            },
        ))
        .build()
        .unwrap();
    seed_products(&store).await;

    let reply = send(&app, Method::GET, "/product/all", "", None).await;
    assert_eq!(names(&reply), vec!["Milk Chocolate", "Oat Milk"]);
    assert_eq!(send(&app, Method::GET, "/product/2", "", None).await.status, StatusCode::NOT_FOUND);

    let denied = send(&app, Method::DELETE, "/product/1", "", None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    let denied = send(&app, Method::DELETE, "/product/batch", "unsafe=1", None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert!(store.rows("product").iter().all(|r| r["deleted_at"].is_null()));
    assert_eq!(global_calls.load(Ordering::SeqCst), 0);

    assert_eq!(send(&app, Method::GET, "/supplier/all", "", None).await.status, StatusCode::OK);
    assert_eq!(global_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn validation_reports_every_field_and_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);

    let reply = send(&app, Method::PUT, "/supplier", "", Some(json!({ "company": "", "email": "nope" }))).await;
    assert_eq!(reply.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(reply.envelope.code, 412);
    let fields: Vec<_> = reply.envelope.validation_error.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["company", "email"]);
    assert!(store.rows("supplier").is_empty());

    let ok = send(&app, Method::PUT, "/supplier", "", Some(json!({ "company": "Acme", "email": "sales@acme.io" }))).await;
    assert_eq!(ok.status, StatusCode::OK);
    let patch = send(&app, Method::PATCH, "/supplier/1", "", Some(json!({ "email": "ops@acme.io" }))).await;
    assert_eq!(patch.status, StatusCode::OK);
}

#[tokio::test]
async fn hooks_can_reject_and_decorate() {
    let store = Arc::new(MemoryStore::new());
    let app = builder(&store)
        .on(HookEvent::BeforeCreate, |record, _| {
            if record.get("name") == Some(&json!("forbidden")) {
                return Err(ApiError::Status {
                    status: StatusCode::UNPROCESSABLE_ENTITY,
                    message: "name is reserved".into(),
                });
            }
            Ok(())
        })
        .on(HookEvent::AfterGet, |record, _| {
            let label = format!("#{}", record.get("product_id").cloned().unwrap_or(Value::Null));
            record.insert("label".into(), json!(label));
            Ok(())
        })
        .model(supplier())
        .model(product())
        .build()
        .unwrap();

    let rejected = send(&app, Method::PUT, "/product", "", Some(json!({ "name": "forbidden" }))).await;
    assert_eq!(rejected.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(rejected.envelope.error, "name is reserved");
    assert!(store.rows("product").is_empty());

    send(&app, Method::PUT, "/product", "", Some(json!({ "name": "Tea" }))).await;
    let fetched = send(&app, Method::GET, "/product/1", "", None).await;
    assert_eq!(fetched.envelope.data["label"], json!("#1"));
}

#[tokio::test]
async fn batch_create_stops_at_the_failing_chunk() {
    let store = Arc::new(MemoryStore::new());
    let app = builder(&store)
        .config(RestConfig {
            batch_size: 2,
            ..RestConfig::default()
        })
        .model(product_tag())
        .build()
        .unwrap();

    let body = json!([
        { "product_id": 1, "tag": "a" },
        { "product_id": 1, "tag": "b" },
        { "product_id": 1, "tag": "c" },
        { "product_id": 1, "tag": "a" }
    ]);
    let reply = send(&app, Method::PUT, "/product_tag/batch", "", Some(body)).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let tags: Vec<_> = store.rows("product_tag").iter().map(|r| r["tag"].clone()).collect();
    assert_eq!(tags, vec![json!("a"), json!("b")]);

    let reply = send(&app, Method::PUT, "/product_tag/batch", "", Some(json!([{ "product_id": 2, "tag": "x" }]))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.envelope.total, 1);
}

#[tokio::test]
async fn batch_create_keeps_chunks_before_a_rejecting_hook() {
    let store = Arc::new(MemoryStore::new());
    let app = builder(&store)
        .config(RestConfig {
            batch_size: 2,
            ..RestConfig::default()
        })
        .on(HookEvent::BeforeCreate, |record, _| {
            if record.get("tag") == Some(&json!("c")) {
                return Err(ApiError::Status {
                    status: StatusCode::CONFLICT,
                    message: "tag c is retired".into(),
                });
            }
            Ok(())
        })
        .model(product_tag())
        .build()
        .unwrap();

    let body = json!([
        { "product_id": 1, "tag": "a" },
        { "product_id": 1, "tag": "b" },
        { "product_id": 1, "tag": "c" },
        { "product_id": 1, "tag": "d" }
    ]);
    let reply = send(&app, Method::PUT, "/product_tag/batch", "", Some(body)).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.envelope.error, "tag c is retired");
    let tags: Vec<_> = store.rows("product_tag").iter().map(|r| r["tag"].clone()).collect();
    assert_eq!(tags, vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn mass_mutations_need_a_filter_or_unsafe() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed_products(&store).await;

    let refused = send(&app, Method::DELETE, "/product/batch", "", None).await;
    assert_eq!(refused.status, StatusCode::BAD_REQUEST);
    let refused = send(&app, Method::PATCH, "/product/batch", "", Some(json!({ "unit_price": 1.0 }))).await;
    assert_eq!(refused.status, StatusCode::BAD_REQUEST);
    assert!(store.rows("product").iter().all(|r| r["deleted_at"].is_null()));

    let updated = send(
        &app,
        Method::PATCH,
        "/product/batch",
        "supplier_id[eq]=1&return=1",
        Some(json!({ "unit_price": 9.5, "name": "" })),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.envelope.total, 2);
    assert_eq!(names(&updated), vec!["Milk Chocolate", "Milk"]);
    assert!(updated.envelope.data.as_array().unwrap().iter().all(|r| r["unit_price"] == json!(9.5)));

    let deleted = send(&app, Method::DELETE, "/product/batch", "unsafe=1", None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.envelope.total, 4);
    assert!(store.rows("product").iter().all(|r| !r["deleted_at"].is_null()));
}

#[tokio::test]
async fn soft_deleted_rows_leave_default_listings() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed_products(&store).await;

    let deleted = send(&app, Method::DELETE, "/product/1", "", None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert!(deleted.envelope.data.is_null());
    assert_eq!(store.rows("product").len(), 4);

    assert_eq!(send(&app, Method::GET, "/product/1", "", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::DELETE, "/product/1", "", None).await.status, StatusCode::NOT_FOUND);
    let live = send(&app, Method::GET, "/product/all", "", None).await;
    assert_eq!(live.envelope.total, 3);
    let trash = send(&app, Method::GET, "/product/all", "deleted_at[notnull]", None).await;
    assert_eq!(names(&trash), vec!["Milk Chocolate"]);
}

#[tokio::test]
async fn set_converges_scope_and_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed(
        &store,
        &product_tag(),
        json!([
            { "product_id": 1, "tag": "a" },
            { "product_id": 1, "tag": "b" },
            { "product_id": 1, "tag": "c" },
            { "product_id": 2, "tag": "a" }
        ]),
    )
    .await;
    let body = json!([
        { "product_id": 1, "tag": "b" },
        { "product_id": 1, "tag": "c" },
        { "product_id": 1, "tag": "d" }
    ]);

    let refused = send(&app, Method::POST, "/product_tag/set", "", Some(body.clone())).await;
    assert_eq!(refused.status, StatusCode::BAD_REQUEST);

    let first = send(&app, Method::POST, "/product_tag/set", "product_id[eq]=1", Some(body.clone())).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.envelope.data, json!({ "created": 1, "deleted": 1 }));

    let second = send(&app, Method::POST, "/product_tag/set", "product_id[eq]=1&return=1", Some(body)).await;
    assert_eq!(second.envelope.total, 3);
    let mut tags: Vec<_> = second
        .envelope
        .data
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["tag"].as_str().unwrap().to_string())
        .collect();
    tags.sort();
    assert_eq!(tags, vec!["b", "c", "d"]);

    let rows = store.rows("product_tag");
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().any(|r| r["product_id"] == json!(2) && r["tag"] == json!("a")));
}

#[tokio::test]
async fn set_membership_ignores_hook_changes() {
    let store = Arc::new(MemoryStore::new());
    let deletions = Arc::new(AtomicUsize::new(0));
    let seen = deletions.clone();
    let app = builder(&store)
        .on(HookEvent::BeforeCreate, |record, _| {
            let tag = record.get("tag").and_then(Value::as_str).unwrap_or_default().to_uppercase();
            record.insert("tag".into(), json!(tag));
            Ok(())
        })
        .on(HookEvent::BeforeDelete, move |record, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            record.insert("weight".into(), json!(99));
            Ok(())
        })
        .model(product_tag())
        .build()
        .unwrap();
    seed(
        &store,
        &product_tag(),
        json!([
            { "product_id": 1, "tag": "a", "weight": 1 },
            { "product_id": 1, "tag": "b", "weight": 2 },
            { "product_id": 1, "tag": "c", "weight": 3 }
        ]),
    )
    .await;

    let body = json!([
        { "product_id": 1, "tag": "b", "weight": 2 },
        { "product_id": 1, "tag": "c", "weight": 3 },
        { "product_id": 1, "tag": "d", "weight": 4 }
    ]);
    let reply = send(&app, Method::POST, "/product_tag/set", "product_id[eq]=1", Some(body)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.envelope.data, json!({ "created": 1, "deleted": 1 }));
    assert_eq!(deletions.load(Ordering::SeqCst), 1);

    let mut tags: Vec<_> = store
        .rows("product_tag")
        .iter()
        .map(|r| r["tag"].as_str().unwrap().to_string())
        .collect();
    tags.sort();
    assert_eq!(tags, vec!["D", "b", "c"]);
}

#[tokio::test]
async fn set_keeps_soft_deleted_members() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed(
        &store,
        &product(),
        json!([
            { "product_id": 1, "name": "Cocoa", "supplier_id": 1, "deleted_at": "2024-01-02T03:04:05Z" },
            { "product_id": 2, "name": "Sugar", "supplier_id": 1 }
        ]),
    )
    .await;

    let body = json!([
        { "product_id": 1, "name": "Cocoa", "supplier_id": 1 },
        { "product_id": 2, "name": "Sugar", "supplier_id": 1 }
    ]);
    let reply = send(&app, Method::POST, "/product/set", "supplier_id[eq]=1&return=1", Some(body)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.envelope.total, 2);

    let rows = store.rows("product");
    assert_eq!(rows.len(), 2);
    assert!(!rows[0]["deleted_at"].is_null());
    assert_eq!(send(&app, Method::GET, "/product/all", "", None).await.envelope.total, 1);
}

#[tokio::test]
async fn paginate_reports_page_metadata() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    let rows: Vec<Value> = (1..=25).map(|i| json!({ "name": format!("p{i}"), "unit_price": i as f64 })).collect();
    seed(&store, &product(), Value::Array(rows)).await;

    let reply = send(&app, Method::GET, "/product/paginate", "size=10&page=2&order=product_id.asc", None).await;
    let env = &reply.envelope;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(env.data.as_array().unwrap().len(), 10);
    assert_eq!(env.data[0]["product_id"], json!(11));
    assert_eq!(env.total, 25);
    assert_eq!(env.total_pages, 3);
    assert_eq!(env.current_page, 2);
    assert_eq!(env.size, 10);
    assert_eq!(env.offset, 10);
    assert_eq!(env.page_range, vec![1, 2, 3]);

    let small = send(&app, Method::GET, "/product/paginate", "size=3", None).await;
    assert_eq!(small.envelope.size, 10);
    assert_eq!(small.envelope.current_page, 1);

    let far = send(&app, Method::GET, "/product/paginate", "page=9223372036854775807&size=100", None).await;
    assert_eq!(far.status, StatusCode::OK);
    assert!(far.envelope.data.as_array().unwrap().is_empty());
    assert_eq!(far.envelope.total, 25);
    assert!(far.envelope.offset <= i64::MAX as u64);
}

#[tokio::test]
async fn aggregates_group_and_whitelist() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed_products(&store).await;

    let grouped = send(
        &app,
        Method::GET,
        "/product/aggregate",
        "fields=unit_price.sum,*.count&group_by=supplier_id&order=supplier_id.desc&unsafe=1",
        None,
    )
    .await;
    assert_eq!(grouped.status, StatusCode::OK);
    assert_eq!(
        grouped.envelope.data,
        json!([
            { "supplier_id": 2, "unit_price.sum": 155.0, "*.count": 2 },
            { "supplier_id": 1, "unit_price.sum": 80.0, "*.count": 2 }
        ])
    );

    let single = send(&app, Method::GET, "/product/aggregate", "fields=unit_price.max&name[contains]=Milk", None).await;
    assert_eq!(single.envelope.data, json!({ "unit_price.max": 75.0 }));

    let unsafe_read = send(&app, Method::GET, "/product/aggregate", "fields=unit_price.max", None).await;
    assert_eq!(unsafe_read.status, StatusCode::BAD_REQUEST);
    let nothing_valid = send(&app, Method::GET, "/product/aggregate", "fields=name.median&unsafe=1", None).await;
    assert_eq!(nothing_valid.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn composite_keys_address_single_rows() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed(&store, &product_tag(), json!([{ "product_id": 1, "tag": "a", "weight": 3 }])).await;

    let found = send(&app, Method::GET, "/product_tag/1/a", "", None).await;
    assert_eq!(found.envelope.data["weight"], json!(3));
    assert_eq!(send(&app, Method::GET, "/product_tag/1/zz", "", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::GET, "/product_tag/x/a", "", None).await.status, StatusCode::BAD_REQUEST);

    let patched = send(&app, Method::PATCH, "/product_tag/1/a", "", Some(json!({ "weight": 5, "tag": "b" }))).await;
    assert_eq!(patched.envelope.data, json!({ "product_id": 1, "tag": "a", "weight": 5 }));
}

#[tokio::test]
async fn associations_are_preloaded() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);
    seed(&store, &supplier(), json!([{ "company": "Acme" }, { "company": "Globex" }])).await;
    seed(
        &store,
        &product(),
        json!([
            { "name": "Tea", "supplier_id": 1 },
            { "name": "Coffee", "supplier_id": 1 },
            { "name": "Salt", "supplier_id": 2 },
            { "name": "Orphan" }
        ]),
    )
    .await;

    let products = send(&app, Method::GET, "/product/all", "associations=supplier&order=product_id.asc", None).await;
    let data = &products.envelope.data;
    assert_eq!(data[0]["supplier"]["company"], json!("Acme"));
    assert_eq!(data[2]["supplier"]["company"], json!("Globex"));
    assert!(data[3]["supplier"].is_null());

    let acme = send(&app, Method::GET, "/supplier/1", "associations=products", None).await;
    assert_eq!(acme.envelope.data["products"].as_array().unwrap().len(), 2);

    let narrow = send(&app, Method::GET, "/product/all", "fields=name&join=supplier", None).await;
    let first = narrow.envelope.data[0].as_object().unwrap();
    assert!(first.contains_key("product_id"));
    assert!(!first.contains_key("unit_price"));
    assert_eq!(first["supplier"]["company"], json!("Acme"));

    let unknown = send(&app, Method::GET, "/product/all", "associations=warehouse", None).await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn model_info_and_listing() {
    let store = Arc::new(MemoryStore::new());
    let app = shop(&store);

    let info = send(&app, Method::GET, "/product", "", None).await;
    assert_eq!(info.envelope.data["id"], json!("product"));
    assert_eq!(info.envelope.data["endpoints"].as_array().unwrap().len(), 13);

    let models = send(&app, Method::GET, "/models", "", None).await;
    assert_eq!(models.status, StatusCode::OK);
    assert_eq!(models.envelope.total, 3);
    assert_eq!(models.envelope.data[0]["table"], json!("supplier"));
    assert_eq!(models.envelope.data[2]["primary_key"], json!(["product_id", "tag"]));
}
