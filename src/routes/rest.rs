//! Catch-all router handing every request under the prefix to the dispatcher.

use crate::context::RestRequest;
use crate::error::ApiError;
use crate::response::Reply;
use crate::state::AppState;
use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::StatusCode,
    routing::any,
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

async fn serve_rest(State(state): State<AppState>, request: Request) -> Result<Reply, ApiError> {
    let config = state.app.config();
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, config.max_body_bytes).await.map_err(|_| ApiError::Status {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        message: "request body too large".into(),
    })?;
    let full_path = parts.uri.path();
    let path = full_path.strip_prefix(config.prefix.as_str()).unwrap_or(full_path).to_string();
    let request = RestRequest {
        method: parts.method,
        path,
        params: Vec::new(),
        raw_query: parts.uri.query().unwrap_or_default().to_string(),
        headers: parts.headers,
        body,
        extensions: parts.extensions,
    };
    Ok(state.app.dispatch(request).await)
}

/// Every generated endpoint under the configured prefix, bodies capped at `max_body_bytes`.
pub fn rest_routes(state: AppState) -> Router {
    let config = state.app.config();
    let limit = config.max_body_bytes;
    Router::new()
        .route(&format!("{}/*path", config.prefix), any(serve_rest))
        .layer(RequestBodyLimitLayer::new(limit))
        .with_state(state)
}
