//! Demo server: REST endpoints for the models in a JSON config file.
//!
//! Run from repo root: `cargo run --example server`
//! Environment: `DATABASE_URL`, `CONFIG_PATH` (default `demos/models.json`), `RESTIFY_*`.

use restify::{common_routes_with_ready, load_models_from_path, resolve, rest_routes, AppState, PgStore, RestConfig, Restify};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("restify=info")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/shop".into());
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "demos/models.json".into());
    let config = RestConfig::from_env()?;
    let models = load_models_from_path(&config_path).await?;
    let schemas = resolve(&models)?;
    let store = PgStore::connect(&database_url, 5).await?;

    let app = Restify::builder(store).config(config).models(schemas).build()?;
    let prefix = app.config().prefix.clone();
    let state = AppState::new(app);
    let router = common_routes_with_ready(state.clone()).merge(rest_routes(state));

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("listening on http://0.0.0.0:{}{}", port, prefix);
    axum::serve(listener, router).await?;
    Ok(())
}
