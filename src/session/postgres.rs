//! PostgreSQL data access over a `sqlx` pool.
//!
//! Reads run on the pool unless a transaction is open; the first write opens one, and
//! `commit`/`rollback` end it.

use crate::config::{ReflectedModel, SemanticType};
use crate::error::AppError;
use crate::joins::EagerLoad;
use crate::session::{DataSession, ListQuery, Row, SessionFactory};
use crate::sql::{delete_all, delete_by_id, insert, select_by_id, select_list, update, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::{Row as _, Transaction};

#[derive(Clone)]
pub struct PgSessionFactory {
    pool: PgPool,
}

impl PgSessionFactory {
    pub fn new(pool: PgPool) -> Self {
        PgSessionFactory { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    async fn session(&self) -> Result<Box<dyn DataSession>, AppError> {
        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            tx: None,
        }))
    }
}

pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

/// Constraint violations become [`AppError::Integrity`] carrying the database message.
fn classify(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if matches!(
            db.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ) {
            return AppError::Integrity(db.message().to_string());
        }
    }
    AppError::Db(e)
}

fn bind_all(q: &QueryBuf) -> Result<sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>, AppError> {
    let mut query = sqlx::query(&q.sql);
    for (v, ty) in q.params.iter().zip(&q.types) {
        query = PgBindValue::from_json(v, *ty)?.bind_to(query);
    }
    Ok(query)
}

impl PgSession {
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, AppError> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::Db(sqlx::Error::PoolClosed))
    }

    async fn read_rows(&mut self, q: &QueryBuf) -> Result<Vec<PgRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let query = bind_all(q)?;
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        };
        rows.map_err(classify)
    }

    async fn write_rows(&mut self, q: &QueryBuf) -> Result<Vec<PgRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let query = bind_all(q)?;
        let tx = self.tx().await?;
        query.fetch_all(&mut **tx).await.map_err(classify)
    }
}

fn cell_to_value(row: &PgRow, name: &str, ty: SemanticType) -> Result<Value, sqlx::Error> {
    let v = match ty {
        SemanticType::Integer | SemanticType::BigInt => row
            .try_get::<Option<i64>, _>(name)?
            .map(|n| Value::Number(n.into())),
        SemanticType::Float => row
            .try_get::<Option<f64>, _>(name)?
            .and_then(Number::from_f64)
            .map(Value::Number),
        SemanticType::Boolean => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        SemanticType::Text => row.try_get::<Option<String>, _>(name)?.map(Value::String),
        SemanticType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)?
            .map(|u| Value::String(u.to_string())),
        SemanticType::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
            .map(|d| Value::String(d.to_rfc3339())),
        SemanticType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        SemanticType::Json => row.try_get::<Option<Value>, _>(name)?,
    };
    Ok(v.unwrap_or(Value::Null))
}

fn row_to_json(model: &ReflectedModel, loads: &[EagerLoad], row: &PgRow) -> Result<Row, AppError> {
    let mut map = Row::new();
    for c in model.columns() {
        map.insert(c.name.clone(), cell_to_value(row, &c.name, c.semantic_type)?);
    }
    for load in loads {
        let name = load.name();
        let v = row.try_get::<Option<Value>, _>(name)?.unwrap_or(Value::Null);
        map.insert(name.to_string(), v);
    }
    Ok(map)
}

#[async_trait]
impl DataSession for PgSession {
    async fn get(
        &mut self,
        model: &ReflectedModel,
        id: &Value,
        loads: &[EagerLoad],
    ) -> Result<Option<Row>, AppError> {
        let q = select_by_id(model, id, loads);
        let rows = self.read_rows(&q).await?;
        rows.first().map(|r| row_to_json(model, loads, r)).transpose()
    }

    async fn query(&mut self, model: &ReflectedModel, query: &ListQuery) -> Result<Vec<Row>, AppError> {
        let q = select_list(model, query);
        let rows = self.read_rows(&q).await?;
        rows.iter()
            .map(|r| row_to_json(model, &query.loads, r))
            .collect()
    }

    async fn insert(&mut self, model: &ReflectedModel, values: &Row) -> Result<Row, AppError> {
        let q = insert(model, values);
        let rows = self.write_rows(&q).await?;
        let row = rows
            .first()
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))?;
        row_to_json(model, &[], row)
    }

    async fn update(
        &mut self,
        model: &ReflectedModel,
        id: &Value,
        values: &Row,
    ) -> Result<Option<Row>, AppError> {
        let q = update(model, id, values);
        let rows = self.write_rows(&q).await?;
        rows.first().map(|r| row_to_json(model, &[], r)).transpose()
    }

    async fn delete(&mut self, model: &ReflectedModel, id: &Value) -> Result<Option<Row>, AppError> {
        let q = delete_by_id(model, id);
        let rows = self.write_rows(&q).await?;
        rows.first().map(|r| row_to_json(model, &[], r)).transpose()
    }

    async fn bulk_delete(&mut self, model: &ReflectedModel) -> Result<Vec<Value>, AppError> {
        let q = delete_all(model);
        let rows = self.write_rows(&q).await?;
        let pk = model.primary_key();
        rows.iter()
            .map(|r| cell_to_value(r, &pk.name, pk.semantic_type).map_err(AppError::from))
            .collect()
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(classify)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
