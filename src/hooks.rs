//! Lifecycle hooks: optional per-model hooks plus global callbacks registered at start-up.
//!
//! Before-chains run model hook, model validation hook, field validation, global callbacks
//! for the phase, then the shared "save" step (model, then global) for create and update.
//! The first error aborts the chain. After-chains run only once the write has succeeded.

use crate::context::Context;
use crate::error::ApiError;
use crate::record::Record;
use crate::service::validation::{validate_record, ValidationMode};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-model lifecycle capability. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait ModelHooks: Send + Sync {
    fn before_create(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn validate_create(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn before_update(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn validate_update(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn before_save(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn before_delete(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    /// Runs before list, paginate and get load anything.
    fn before_get(&self, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn after_create(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn after_update(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn after_save(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn after_delete(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
    fn after_get(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Models without hooks.
pub struct NoHooks;

impl ModelHooks for NoHooks {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeCreate,
    BeforeUpdate,
    BeforeSave,
    BeforeDelete,
    AfterCreate,
    AfterUpdate,
    AfterSave,
    AfterDelete,
    AfterGet,
}

pub type Callback = Arc<dyn Fn(&mut Record, &mut Context) -> Result<(), ApiError> + Send + Sync>;

/// Global callbacks, appended during start-up and only read while serving.
#[derive(Clone, Default)]
pub struct HookRegistry {
    callbacks: HashMap<HookEvent, Vec<Callback>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.callbacks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HookRegistry").field("callbacks", &counts).finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    /// Appends a callback for every model; callbacks run in registration order.
    pub fn on<F>(&mut self, event: HookEvent, callback: F)
    where
        F: Fn(&mut Record, &mut Context) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.callbacks.entry(event).or_default().push(Arc::new(callback));
    }

    fn run(&self, event: HookEvent, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        for callback in self.callbacks.get(&event).into_iter().flatten() {
            callback(record, ctx)?;
        }
        Ok(())
    }

    pub fn before_create(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.before_create(record, ctx)?;
        hooks.validate_create(record, ctx)?;
        validate_record(ctx.schema(), record, ValidationMode::Full)?;
        self.run(HookEvent::BeforeCreate, record, ctx)?;
        hooks.before_save(record, ctx)?;
        self.run(HookEvent::BeforeSave, record, ctx)
    }

    /// `mode` is `NonZero` for partial updates so untouched fields are not re-validated.
    pub fn before_update(&self, record: &mut Record, ctx: &mut Context, mode: ValidationMode) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.before_update(record, ctx)?;
        hooks.validate_update(record, ctx)?;
        validate_record(ctx.schema(), record, mode)?;
        self.run(HookEvent::BeforeUpdate, record, ctx)?;
        hooks.before_save(record, ctx)?;
        self.run(HookEvent::BeforeSave, record, ctx)
    }

    pub fn before_delete(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.before_delete(record, ctx)?;
        self.run(HookEvent::BeforeDelete, record, ctx)
    }

    pub fn before_get(&self, ctx: &mut Context) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.before_get(ctx)
    }

    pub fn after_create(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.after_create(record, ctx)?;
        self.run(HookEvent::AfterCreate, record, ctx)?;
        hooks.after_save(record, ctx)?;
        self.run(HookEvent::AfterSave, record, ctx)
    }

    pub fn after_update(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.after_update(record, ctx)?;
        self.run(HookEvent::AfterUpdate, record, ctx)?;
        hooks.after_save(record, ctx)?;
        self.run(HookEvent::AfterSave, record, ctx)
    }

    pub fn after_delete(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.after_delete(record, ctx)?;
        self.run(HookEvent::AfterDelete, record, ctx)
    }

    pub fn after_get(&self, record: &mut Record, ctx: &mut Context) -> Result<(), ApiError> {
        let hooks = ctx.resource.hooks.clone();
        hooks.after_get(record, ctx)?;
        self.run(HookEvent::AfterGet, record, ctx)
    }
}
