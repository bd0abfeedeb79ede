//! Example server: loads table models from `MODELS_PATH` (or a built-in widget model) and mounts
//! CRUD routes for each. Uses PostgreSQL when `DATABASE_URL` is set, an in-memory store otherwise.

use axum::Router;
use crud_builder::{
    add_field, load_models_from_file, ColumnDef, CrudBuilder, CrudOptions, HeaderTokenCheck,
    InMemoryCache, MemoryStore, Operation, PgSessionFactory, SemanticType, SessionFactory,
    TableModel,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn widget_model() -> TableModel {
    TableModel::new("Widget")
        .table("widgets")
        .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
        .column(ColumnDef::new("name", SemanticType::Text).not_null().unique())
        .column(ColumnDef::new("weight", SemanticType::Float))
        .column(ColumnDef::new("created_at", SemanticType::Timestamp).with_default())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crud_builder=info".parse()?))
        .init();

    let models = match std::env::var("MODELS_PATH") {
        Ok(path) => load_models_from_file(&path).await?,
        Err(_) => vec![widget_model()],
    };

    let sessions: Arc<dyn SessionFactory> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await?;
            Arc::new(PgSessionFactory::new(pool))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let cache = Arc::new(InMemoryCache::new());
    let api_key = std::env::var("API_KEY").ok();

    let mut api = Router::new();
    for model in models {
        let mut builder = CrudBuilder::new(model, sessions.clone())
            .options(CrudOptions::from_env())
            .cache(cache.clone())
            .infer_create(true)
            .infer_update(true)
            .allow_delete(true)
            .postprocessor(add_field("_links", json!({})));
        if let Some(key) = &api_key {
            builder = builder.security(
                Operation::Delete,
                Arc::new(HeaderTokenCheck::new("x-api-key", key.clone())),
            );
        }
        let crud = builder.build()?;
        for r in crud.routes() {
            tracing::info!(method = %r.method, path = %r.path, "{}", r.summary);
        }
        api = crud.mount(api);
    }

    let app = Router::new().nest("/api/v1", api);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
