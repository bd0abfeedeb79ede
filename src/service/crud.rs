//! CRUD engine for one mounted model: cache-aside reads, transactional writes, postprocessing.

use crate::cache::{CacheClient, CacheKeyDeriver};
use crate::config::{CrudOptions, ReflectedModel};
use crate::error::{AppError, ConfigError};
use crate::joins::{joins_qualifier, parse_relationship_list, plan_joins, EagerLoad};
use crate::schema::{create_schema, response_schema, update_schema, SchemaDescriptor};
use crate::service::postprocess::{run_postprocessors, Payload, Postprocessor};
use crate::service::RequestValidator;
use crate::session::{DataSession, EqualsFilter, ListQuery, SessionFactory, SortDirection, SortOrder};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Query parameters of the list route.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub sort_field: Option<String>,
    #[serde(default)]
    pub sort_desc: bool,
    pub equals_field: Option<String>,
    pub equals_value: Option<String>,
    /// Comma-separated relationship names to eager-load.
    pub relationships: Option<String>,
}

pub struct CrudEngine {
    model: ReflectedModel,
    response_schema: SchemaDescriptor,
    create_schema: Option<SchemaDescriptor>,
    update_schema: Option<SchemaDescriptor>,
    sessions: Arc<dyn SessionFactory>,
    cache: Option<Arc<dyn CacheClient>>,
    keys: CacheKeyDeriver,
    options: CrudOptions,
    postprocessors: Vec<Postprocessor>,
    validator: RequestValidator,
}

/// Canonical text of a key value for cache keys.
fn key_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A write schema may only name columns; anything else would be dropped on persist.
fn check_write_schema(model: &ReflectedModel, schema: &SchemaDescriptor) -> Result<(), ConfigError> {
    match schema.field_names().find(|f| model.column(f).is_none()) {
        Some(field) => Err(ConfigError::UnknownSchemaField {
            schema: schema.name.clone(),
            table: model.name().to_string(),
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

fn clamp_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl CrudEngine {
    /// Engine for `model` with schemas synthesized per `options` (`infer_create`, `infer_update`,
    /// `exclude_fields`).
    pub fn new(
        model: ReflectedModel,
        sessions: Arc<dyn SessionFactory>,
        options: CrudOptions,
    ) -> Result<Self, ConfigError> {
        let exclude = &options.exclude_fields;
        let response_schema = response_schema(&model, exclude);
        let create_schema = options.infer_create.then(|| create_schema(&model, exclude));
        let update_schema = options.infer_update.then(|| update_schema(&model, exclude));
        let validator = RequestValidator::from_model(&model)?;
        Ok(CrudEngine {
            keys: CacheKeyDeriver::new(options.cache_key_suffix.clone()),
            model,
            response_schema,
            create_schema,
            update_schema,
            sessions,
            cache: None,
            options,
            postprocessors: Vec::new(),
            validator,
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Explicit create schema; takes precedence over an inferred one. Every field must be a column.
    pub fn with_create_schema(mut self, schema: SchemaDescriptor) -> Result<Self, ConfigError> {
        check_write_schema(&self.model, &schema)?;
        self.create_schema = Some(schema);
        Ok(self)
    }

    pub fn with_update_schema(mut self, schema: SchemaDescriptor) -> Result<Self, ConfigError> {
        check_write_schema(&self.model, &schema)?;
        self.update_schema = Some(schema);
        Ok(self)
    }

    pub fn with_postprocessor(mut self, p: Postprocessor) -> Self {
        self.postprocessors.push(p);
        self
    }

    pub fn model(&self) -> &ReflectedModel {
        &self.model
    }

    pub fn options(&self) -> &CrudOptions {
        &self.options
    }

    pub fn response_schema(&self) -> &SchemaDescriptor {
        &self.response_schema
    }

    pub fn create_schema(&self) -> Option<&SchemaDescriptor> {
        self.create_schema.as_ref()
    }

    pub fn update_schema(&self) -> Option<&SchemaDescriptor> {
        self.update_schema.as_ref()
    }

    pub fn cache_keys(&self) -> &CacheKeyDeriver {
        &self.keys
    }

    /// Cache key of one entity, with optional relationship qualifier.
    pub fn entity_key(&self, id: &Value, qualifier: Option<&str>) -> String {
        self.keys
            .derive(&self.model.cache_prefix(), &key_text(id), qualifier)
    }

    pub async fn read_one(&self, raw_id: &str, relationships: Option<&str>) -> Result<Value, AppError> {
        let names = parse_relationship_list(relationships);
        tracing::info!(model = %self.model.name(), id = raw_id, relationships = ?names, "read one");
        let id = self.parse_id(raw_id)?;
        let loads = plan_joins(&self.model, &names);
        let key = self.entity_key(&id, joins_qualifier(&loads).as_deref());

        if let Some(hit) = self.cache_get(&key).await? {
            return Ok(hit);
        }

        let mut session = self.sessions.session().await?;
        let row = session
            .get(&self.model, &id, &loads)
            .await?
            .ok_or_else(|| self.not_found(raw_id))?;
        let out = self.postprocess(Payload::Single(self.response_schema.project(&row)));
        self.cache_set(&key, &out).await?;
        Ok(out)
    }

    pub async fn read_all(&self, params: &ListParams) -> Result<Value, AppError> {
        tracing::info!(
            model = %self.model.name(),
            limit = ?params.limit,
            skip = ?params.skip,
            sort_field = ?params.sort_field,
            sort_desc = params.sort_desc,
            equals_field = ?params.equals_field,
            equals_value = ?params.equals_value,
            relationships = ?params.relationships,
            "read all"
        );
        let (query, qualifier) = self.list_query(params)?;
        let key = self
            .keys
            .derive(&self.model.cache_prefix(), "all", qualifier.as_deref());

        if let Some(hit) = self.cache_get(&key).await? {
            return Ok(hit);
        }

        let out = self.list_uncached(&query).await?;
        if out.as_array().is_some_and(|a| !a.is_empty()) {
            self.cache_set(&key, &out).await?;
        }
        Ok(out)
    }

    pub async fn create_one(&self, payload: Value) -> Result<Value, AppError> {
        tracing::info!(model = %self.model.name(), "create one");
        let schema = self
            .create_schema
            .as_ref()
            .ok_or_else(|| AppError::BadRequest(format!("create is not enabled for {}", self.model.name())))?;
        let values = schema.validate(&payload)?;
        self.validator.validate(&values)?;

        let mut session = self.sessions.session().await?;
        let result = session.insert(&self.model, &values).await;
        let row = self.finish(session, result).await?;
        Ok(self.postprocess(Payload::Single(self.response_schema.project(&row))))
    }

    pub async fn update_one(&self, raw_id: &str, payload: Value) -> Result<Value, AppError> {
        tracing::info!(model = %self.model.name(), id = raw_id, "update one");
        let schema = self
            .update_schema
            .as_ref()
            .ok_or_else(|| AppError::BadRequest(format!("update is not enabled for {}", self.model.name())))?;
        let id = self.parse_id(raw_id)?;
        let values = schema.validate(&payload)?;
        self.validator.validate_partial(&values)?;

        let mut session = self.sessions.session().await?;
        let result = match session.update(&self.model, &id, &values).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(self.not_found(raw_id)),
            Err(e) => Err(e),
        };
        let row = self.finish(session, result).await?;
        self.invalidate(vec![self.entity_key(&id, None)]).await?;
        Ok(self.postprocess(Payload::Single(self.response_schema.project(&row))))
    }

    pub async fn delete_one(&self, raw_id: &str) -> Result<Value, AppError> {
        tracing::info!(model = %self.model.name(), id = raw_id, "delete one");
        self.ensure_delete_allowed()?;
        let id = self.parse_id(raw_id)?;

        let mut session = self.sessions.session().await?;
        let result = match session.delete(&self.model, &id).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => Err(self.not_found(raw_id)),
            Err(e) => Err(e),
        };
        let row = self.finish(session, result).await?;
        self.invalidate(vec![self.entity_key(&id, None)]).await?;
        Ok(self.postprocess(Payload::Single(self.response_schema.project(&row))))
    }

    /// Delete every row, then return the (empty) listing read back from the store.
    pub async fn delete_all(&self) -> Result<Value, AppError> {
        tracing::info!(model = %self.model.name(), "delete all");
        self.ensure_delete_allowed()?;

        let mut session = self.sessions.session().await?;
        let result = session.bulk_delete(&self.model).await;
        let removed = self.finish(session, result).await?;
        tracing::info!(model = %self.model.name(), count = removed.len(), "deleted rows");

        let (query, _) = self.list_query(&ListParams::default())?;
        let out = self.list_uncached(&query).await?;

        let mut keys: Vec<String> = removed.iter().map(|id| self.entity_key(id, None)).collect();
        keys.push(self.keys.derive(&self.model.cache_prefix(), "all", None));
        self.invalidate(keys).await?;
        Ok(out)
    }

    /// Build the store query and the cache-key qualifier for a list request.
    ///
    /// Qualifier segments, in order: `{field}_{value}` for the filter, `{field}_{asc|desc}` for a
    /// non-default sort, `limit{n}` / `skip{n}` for non-default paging, then the relationship names.
    fn list_query(&self, params: &ListParams) -> Result<(ListQuery, Option<String>), AppError> {
        let pk = self.model.primary_key();
        let limit = params
            .limit
            .unwrap_or(self.options.default_limit)
            .min(self.options.max_limit);
        let skip = params.skip.unwrap_or(0);
        let mut segments = Vec::new();

        let filter = match (&params.equals_field, &params.equals_value) {
            (Some(field), Some(raw)) if !raw.is_empty() => {
                let col = self
                    .model
                    .column(field)
                    .ok_or_else(|| AppError::Validation(format!("equals_field: unknown column '{}'", field)))?;
                let value = col.semantic_type.parse_param(raw).ok_or_else(|| {
                    AppError::Validation(format!("equals_value: expected {} for {}", col.semantic_type, field))
                })?;
                segments.push(format!("{}_{}", field, raw));
                Some(EqualsFilter {
                    field: field.clone(),
                    value,
                })
            }
            _ => None,
        };

        let sort_field = match &params.sort_field {
            Some(f) => {
                if self.model.column(f).is_none() {
                    return Err(AppError::Validation(format!("sort_field: unknown column '{}'", f)));
                }
                f.clone()
            }
            None => pk.name.clone(),
        };
        let direction = if params.sort_desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        if sort_field != pk.name || direction != SortDirection::Asc {
            segments.push(format!("{}_{}", sort_field, direction.as_str()));
        }
        if limit != self.options.default_limit {
            segments.push(format!("limit{}", limit));
        }
        if skip != 0 {
            segments.push(format!("skip{}", skip));
        }

        let names = parse_relationship_list(params.relationships.as_deref());
        let loads: Vec<EagerLoad> = plan_joins(&self.model, &names);
        if let Some(q) = joins_qualifier(&loads) {
            segments.push(q);
        }

        let query = ListQuery {
            filter,
            order: SortOrder {
                field: sort_field,
                direction,
            },
            limit: clamp_u32(limit),
            skip: clamp_u32(skip),
            loads,
        };
        let qualifier = (!segments.is_empty()).then(|| segments.join("_"));
        Ok((query, qualifier))
    }

    async fn list_uncached(&self, query: &ListQuery) -> Result<Value, AppError> {
        let mut session = self.sessions.session().await?;
        let rows = session.query(&self.model, query).await?;
        let items = rows
            .iter()
            .map(|r| self.response_schema.project(r))
            .collect();
        Ok(self.postprocess(Payload::Many(items)))
    }

    /// Commit on success; roll back and return the operation error on failure.
    async fn finish<T: Send>(
        &self,
        mut session: Box<dyn DataSession>,
        result: Result<T, AppError>,
    ) -> Result<T, AppError> {
        match result {
            Ok(v) => {
                session.commit().await?;
                Ok(v)
            }
            Err(e) => {
                tracing::warn!(model = %self.model.name(), error = %e, "rolling back");
                if let Err(rb) = session.rollback().await {
                    tracing::warn!(model = %self.model.name(), error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn postprocess(&self, payload: Payload) -> Value {
        run_postprocessors(&self.postprocessors, payload).into_value()
    }

    fn parse_id(&self, raw: &str) -> Result<Value, AppError> {
        let pk = self.model.primary_key();
        pk.semantic_type.parse_param(raw).ok_or_else(|| {
            AppError::Validation(format!("{}: expected {}, got '{}'", pk.name, pk.semantic_type, raw))
        })
    }

    fn not_found(&self, raw_id: &str) -> AppError {
        AppError::NotFound(format!("{} {}", self.model.name(), raw_id))
    }

    fn ensure_delete_allowed(&self) -> Result<(), AppError> {
        if self.options.allow_delete {
            Ok(())
        } else {
            Err(AppError::BadRequest(format!("delete is not enabled for {}", self.model.name())))
        }
    }

    async fn cache_get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        // An empty list is never served from cache.
        let hit = cache
            .get(key)
            .await?
            .filter(|v| v.as_array().map_or(true, |a| !a.is_empty()));
        if hit.is_some() {
            tracing::info!(key, "cache hit");
        } else {
            tracing::info!(key, "cache miss");
        }
        Ok(hit)
    }

    async fn cache_set(&self, key: &str, value: &Value) -> Result<(), AppError> {
        if let Some(cache) = &self.cache {
            cache
                .set(key, value, self.options.cache_expiry_seconds)
                .await?;
        }
        Ok(())
    }

    async fn invalidate(&self, keys: Vec<String>) -> Result<(), AppError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        tracing::info!(keys = ?keys, "cache invalidate");
        match keys.as_slice() {
            [] => Ok(()),
            [one] => cache.delete(one).await,
            many => cache.delete_many(many).await,
        }
    }
}
