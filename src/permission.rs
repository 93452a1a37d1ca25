//! Permission gate. A model's own authorizer replaces the global one outright; with
//! neither configured every operation is allowed.

use crate::context::{Context, Permission, Permissions};
use crate::error::ApiError;
use crate::record::Record;

/// Decides whether an operation may run. May append conditions or set an override on
/// the context as a side effect.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, permissions: &Permissions, record: Option<&Record>, ctx: &mut Context) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(&Permissions, Option<&Record>, &mut Context) -> bool + Send + Sync,
{
    fn authorize(&self, permissions: &Permissions, record: Option<&Record>, ctx: &mut Context) -> bool {
        self(permissions, record, ctx)
    }
}

/// Runs the gate for `permission`, resolving which authorizer applies.
pub fn authorize(
    global: Option<&dyn Authorizer>,
    permission: Permission,
    record: Option<&Record>,
    ctx: &mut Context,
) -> Result<(), ApiError> {
    let permissions = permission.tokens();
    let model = ctx.resource.authorizer.clone();
    let allowed = match (model, global) {
        (Some(model), _) => model.authorize(&permissions, record, ctx),
        (None, Some(global)) => global.authorize(&permissions, record, ctx),
        (None, None) => true,
    };
    if allowed {
        Ok(())
    } else {
        tracing::debug!(
            table = %ctx.schema().table,
            permission = %permission,
            "permission denied"
        );
        Err(ApiError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldInfo, FieldKind, ModelSchema};
    use crate::context::RestRequest;
    use crate::query::CompareOp;
    use crate::resource::{EndpointKind, Resource};
    use axum::http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn schema() -> ModelSchema {
        ModelSchema::new("note").with_field(FieldInfo::new("note_id", FieldKind::Int).primary_key())
    }

    fn ctx(resource: Resource) -> Context {
        Context::new(
            RestRequest::new(Method::GET, "/note/all"),
            Arc::new(resource),
            EndpointKind::All,
        )
    }

    #[test]
    fn default_is_allow() {
        let mut c = ctx(Resource::new(schema()));
        assert!(authorize(None, Permission::ViewAll, None, &mut c).is_ok());
    }

    #[test]
    fn model_authorizer_replaces_global() {
        let global_calls = Arc::new(AtomicUsize::new(0));
        let counter = global_calls.clone();
        let global = move |_: &Permissions, _: Option<&Record>, _: &mut Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        };
        let resource = Resource::new(schema()).with_authorizer(
            |p: &Permissions, _: Option<&Record>, ctx: &mut Context| {
                ctx.add_condition("owner_id", CompareOp::Eq, json!(5));
                p.has(&["VIEW"])
            },
        );
        let mut c = ctx(resource);
        assert!(authorize(Some(&global), Permission::ViewAll, None, &mut c).is_ok());
        assert!(matches!(
            authorize(Some(&global), Permission::Delete, None, &mut c),
            Err(ApiError::PermissionDenied)
        ));
        assert_eq!(global_calls.load(Ordering::SeqCst), 0);
        assert_eq!(c.conditions.len(), 2);
    }

    #[test]
    fn global_authorizer_applies_without_model_hook() {
        let global = |p: &Permissions, _: Option<&Record>, _: &mut Context| !p.has(&["DELETE"]);
        let mut c = ctx(Resource::new(schema()));
        assert!(authorize(Some(&global), Permission::ViewGet, None, &mut c).is_ok());
        let err = authorize(Some(&global), Permission::BatchDelete, None, &mut c).unwrap_err();
        assert_eq!(err.status().as_u16(), 403);
    }
}
