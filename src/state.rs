//! Shared state for the axum routes.

use crate::app::Restify;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<Restify>,
}

impl AppState {
    pub fn new(app: Restify) -> Self {
        AppState { app: Arc::new(app) }
    }
}
