//! Route generation for one table model.
//!
//! `CrudBuilder` reflects the model once, synthesizes its schemas and mounts:
//! `GET {prefix}/:item_id` and `GET {prefix}` always, `POST {prefix}` when a create schema exists,
//! `PUT {prefix}/:item_id` when an update schema exists, and both DELETE routes when delete is
//! allowed.

use crate::cache::CacheClient;
use crate::config::{reflect, CrudOptions, TableModel};
use crate::error::ConfigError;
use crate::handlers::entity::{create_one, delete_all, delete_one, read_all, read_one, update_one};
use crate::schema::SchemaDescriptor;
use crate::security::{enforce, Operation, SecurityCheck, SecurityChecks};
use crate::service::{CrudEngine, Postprocessor};
use crate::session::SessionFactory;
use crate::state::CrudState;
use axum::http::Method;
use axum::middleware;
use axum::routing::{delete, get, post, put, MethodRouter};
use axum::Router;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::openapi::schema::Schema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteKind {
    ReadOne,
    ReadAll,
    CreateOne,
    UpdateOne,
    DeleteOne,
    DeleteAll,
}

impl RouteKind {
    pub fn operation(&self) -> Operation {
        match self {
            RouteKind::ReadOne | RouteKind::ReadAll => Operation::Read,
            RouteKind::CreateOne => Operation::Create,
            RouteKind::UpdateOne => Operation::Update,
            RouteKind::DeleteOne | RouteKind::DeleteAll => Operation::Delete,
        }
    }
}

/// One route mounted by a [`CrudRouter`].
#[derive(Clone, Debug, PartialEq)]
pub struct MountedRoute {
    pub method: Method,
    pub path: String,
    pub kind: RouteKind,
    pub summary: String,
    pub description: String,
}

pub struct CrudBuilder {
    model: TableModel,
    sessions: Arc<dyn SessionFactory>,
    options: CrudOptions,
    cache: Option<Arc<dyn CacheClient>>,
    create_schema: Option<SchemaDescriptor>,
    update_schema: Option<SchemaDescriptor>,
    postprocessors: Vec<Postprocessor>,
    security: SecurityChecks,
}

impl CrudBuilder {
    pub fn new(model: TableModel, sessions: Arc<dyn SessionFactory>) -> Self {
        CrudBuilder {
            model,
            sessions,
            options: CrudOptions::default(),
            cache: None,
            create_schema: None,
            update_schema: None,
            postprocessors: Vec::new(),
            security: SecurityChecks::default(),
        }
    }

    /// Replace all options at once (e.g. from [`CrudOptions::from_env`]).
    pub fn options(mut self, options: CrudOptions) -> Self {
        self.options = options;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = Some(prefix.into());
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_expiry_seconds(mut self, seconds: u64) -> Self {
        self.options.cache_expiry_seconds = seconds;
        self
    }

    pub fn infer_create(mut self, yes: bool) -> Self {
        self.options.infer_create = yes;
        self
    }

    pub fn infer_update(mut self, yes: bool) -> Self {
        self.options.infer_update = yes;
        self
    }

    pub fn allow_delete(mut self, yes: bool) -> Self {
        self.options.allow_delete = yes;
        self
    }

    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .exclude_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn create_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.create_schema = Some(schema);
        self
    }

    pub fn update_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.update_schema = Some(schema);
        self
    }

    pub fn postprocessor(mut self, p: Postprocessor) -> Self {
        self.postprocessors.push(p);
        self
    }

    pub fn security(mut self, op: Operation, check: Arc<dyn SecurityCheck>) -> Self {
        self.security.set(op, check);
        self
    }

    /// Reflect the model and assemble the router. Fails on an invalid model (e.g. no primary key).
    pub fn build(self) -> Result<CrudRouter, ConfigError> {
        let reflected = reflect(&self.model)?;
        let prefix = normalize_prefix(
            self.options
                .prefix
                .clone()
                .unwrap_or_else(|| format!("/{}", reflected.name().to_lowercase())),
        );
        let body_limit = self.options.body_limit_bytes;

        let mut engine = CrudEngine::new(reflected, self.sessions, self.options)?;
        if let Some(cache) = self.cache {
            engine = engine.with_cache(cache);
        }
        if let Some(schema) = self.create_schema {
            engine = engine.with_create_schema(schema)?;
        }
        if let Some(schema) = self.update_schema {
            engine = engine.with_update_schema(schema)?;
        }
        for p in self.postprocessors {
            engine = engine.with_postprocessor(p);
        }

        let routes = plan_routes(&engine, &prefix);
        tracing::info!(
            model = %engine.model().name(),
            prefix = %prefix,
            routes = routes.len(),
            "mounted crud routes"
        );
        Ok(CrudRouter {
            prefix,
            routes,
            body_limit,
            state: CrudState {
                engine: Arc::new(engine),
                security: Arc::new(self.security),
            },
        })
    }
}

/// Leading slash, no trailing slash; the empty prefix stays empty.
fn normalize_prefix(prefix: String) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn plan_routes(engine: &CrudEngine, prefix: &str) -> Vec<MountedRoute> {
    let name = engine.model().name();
    let collection = if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix.to_string()
    };
    let item = format!("{}/:item_id", prefix);
    let route = |method: Method, path: &str, kind: RouteKind, summary: String, description: String| {
        MountedRoute {
            method,
            path: path.to_string(),
            kind,
            summary,
            description,
        }
    };

    let mut routes = vec![
        route(
            Method::GET,
            &item,
            RouteKind::ReadOne,
            format!("Read one {} item", name),
            format!("Read one {} item by primary key", name),
        ),
        route(
            Method::GET,
            &collection,
            RouteKind::ReadAll,
            format!("Read all {} items", name),
            format!("Read all {} items", name),
        ),
    ];
    if engine.create_schema().is_some() {
        routes.push(route(
            Method::POST,
            &collection,
            RouteKind::CreateOne,
            format!("Create one {} item", name),
            format!("Create one {} item", name),
        ));
    }
    if engine.update_schema().is_some() {
        routes.push(route(
            Method::PUT,
            &item,
            RouteKind::UpdateOne,
            format!("Update one {} item", name),
            format!("Update one {} item by primary key", name),
        ));
    }
    if engine.options().allow_delete {
        routes.push(route(
            Method::DELETE,
            &item,
            RouteKind::DeleteOne,
            format!("Delete one {} item", name),
            format!("Delete one {} item by primary key", name),
        ));
        routes.push(route(
            Method::DELETE,
            &collection,
            RouteKind::DeleteAll,
            format!("Delete all {} items", name),
            format!("Delete all {} items", name),
        ));
    }
    routes
}

fn method_router(kind: RouteKind) -> MethodRouter<CrudState> {
    match kind {
        RouteKind::ReadOne => get(read_one),
        RouteKind::ReadAll => get(read_all),
        RouteKind::CreateOne => post(create_one),
        RouteKind::UpdateOne => put(update_one),
        RouteKind::DeleteOne => delete(delete_one),
        RouteKind::DeleteAll => delete(delete_all),
    }
}

/// Routes generated for one model, ready to serve or merge into an application router.
pub struct CrudRouter {
    prefix: String,
    routes: Vec<MountedRoute>,
    body_limit: usize,
    state: CrudState,
}

impl CrudRouter {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn routes(&self) -> &[MountedRoute] {
        &self.routes
    }

    pub fn engine(&self) -> &Arc<CrudEngine> {
        &self.state.engine
    }

    /// Synthesized schemas rendered as OpenAPI components, keyed by schema name.
    pub fn openapi_schemas(&self) -> Vec<(String, Schema)> {
        let engine = &self.state.engine;
        std::iter::once(engine.response_schema())
            .chain(engine.create_schema())
            .chain(engine.update_schema())
            .map(|s| (s.name.clone(), s.to_openapi()))
            .collect()
    }

    pub fn into_router(self) -> Router {
        let mut router: Router<CrudState> = Router::new();
        let mut paths: Vec<&str> = Vec::new();
        for r in &self.routes {
            if !paths.contains(&r.path.as_str()) {
                paths.push(r.path.as_str());
            }
        }
        for path in paths {
            let mut methods: Option<MethodRouter<CrudState>> = None;
            for r in self.routes.iter().filter(|r| r.path == path) {
                let mut next = method_router(r.kind);
                let op = r.kind.operation();
                if self.state.security.for_operation(op).is_some() {
                    next = next.route_layer(middleware::from_fn_with_state(
                        (self.state.security.clone(), op),
                        enforce,
                    ));
                }
                methods = Some(match methods {
                    Some(m) => m.merge(next),
                    None => next,
                });
            }
            if let Some(m) = methods {
                router = router.route(path, m);
            }
        }
        router
            .layer(RequestBodyLimitLayer::new(self.body_limit))
            .with_state(self.state)
    }

    /// Merge these routes into an existing router.
    pub fn mount(self, router: Router) -> Router {
        router.merge(self.into_router())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDef, SemanticType};
    use crate::schema::{FieldSpec, FieldType};
    use crate::session::MemoryStore;

    fn widget() -> TableModel {
        TableModel::new("Widget")
            .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
            .column(ColumnDef::new("name", SemanticType::Text).not_null())
    }

    fn builder() -> CrudBuilder {
        CrudBuilder::new(widget(), Arc::new(MemoryStore::new()))
            .infer_create(true)
            .infer_update(true)
    }

    #[test]
    fn four_routes_without_delete_six_with() {
        let without = builder().build().unwrap();
        assert_eq!(without.routes().len(), 4);
        let with = builder().allow_delete(true).build().unwrap();
        assert_eq!(with.routes().len(), 6);
    }

    #[test]
    fn read_routes_are_always_mounted() {
        let r = CrudBuilder::new(widget(), Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        let kinds: Vec<_> = r.routes().iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![RouteKind::ReadOne, RouteKind::ReadAll]);
        assert_eq!(r.routes()[0].path, "/widget/:item_id");
        assert_eq!(r.routes()[1].summary, "Read all Widget items");
    }

    #[test]
    fn prefix_is_normalized() {
        let r = builder().prefix("api/widgets/").build().unwrap();
        assert_eq!(r.prefix(), "/api/widgets");
        let root = builder().prefix("").build().unwrap();
        assert_eq!(root.routes()[1].path, "/");
        assert_eq!(root.routes()[0].path, "/:item_id");
    }

    #[test]
    fn model_without_primary_key_fails_to_build() {
        let model = TableModel::new("Loose").column(ColumnDef::new("a", SemanticType::Text));
        let err = CrudBuilder::new(model, Arc::new(MemoryStore::new()))
            .build()
            .err();
        assert!(matches!(err, Some(ConfigError::MissingPrimaryKey { .. })));
    }

    #[test]
    fn openapi_lists_synthesized_schemas() {
        let names: Vec<_> = builder()
            .build()
            .unwrap()
            .openapi_schemas()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["Widget", "WidgetCreate", "WidgetUpdate"]);
    }

    #[test]
    fn explicit_schema_with_non_column_field_fails_to_build() {
        let mut schema = crate::schema::create_schema(&reflect(&widget()).unwrap(), &Default::default());
        schema.fields.push(FieldSpec {
            name: "nickname".into(),
            field_type: FieldType::Scalar(SemanticType::Text),
            optional: false,
            nullable: false,
            default: None,
        });
        let err = builder().create_schema(schema).build().err();
        assert!(matches!(
            err,
            Some(ConfigError::UnknownSchemaField { ref field, .. }) if field == "nickname"
        ));
    }
}
