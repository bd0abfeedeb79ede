//! CRUD builder: REST routers generated from declared table models.

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod joins;
pub mod routes;
pub mod schema;
pub mod security;
pub mod service;
pub mod session;
pub mod sql;
pub mod state;

pub use cache::{derive_key, CacheClient, CacheKeyDeriver, InMemoryCache};
pub use config::{
    load_models_from_file, models_from_json, reflect, ColumnDef, CrudOptions, ReflectedModel,
    RelationshipDef, RelationshipKind, SemanticType, TableModel, ValidationRule,
};
pub use error::{AppError, ConfigError};
pub use joins::{plan_joins, EagerLoad};
pub use routes::{CrudBuilder, CrudRouter, MountedRoute, RouteKind};
pub use schema::{create_schema, response_schema, update_schema, SchemaDescriptor};
pub use security::{HeaderTokenCheck, Operation, SecurityCheck};
pub use service::{add_field, CrudEngine, ListParams, Payload, Postprocessor};
pub use session::{DataSession, MemoryStore, PgSessionFactory, SessionFactory};
pub use state::CrudState;
