//! Data-access collaborator contract and its implementations.
//!
//! The engine opens one [`DataSession`] per request. Reads need no explicit end; every
//! mutating request finishes with exactly one `commit` or `rollback`.

mod memory;
mod postgres;

pub use memory::{MemorySession, MemoryStore};
pub use postgres::{PgSession, PgSessionFactory};

use crate::config::ReflectedModel;
use crate::error::AppError;
use crate::joins::EagerLoad;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// One entity as the store returns it: column values plus any eager-loaded relationships.
pub type Row = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

/// Single-column equality filter; the value is already coerced to the column's type.
#[derive(Clone, Debug, PartialEq)]
pub struct EqualsFilter {
    pub field: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    pub filter: Option<EqualsFilter>,
    pub order: SortOrder,
    pub limit: u32,
    pub skip: u32,
    pub loads: Vec<EagerLoad>,
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn session(&self) -> Result<Box<dyn DataSession>, AppError>;
}

/// Unit of work against the store. Constraint violations surface as [`AppError::Integrity`].
#[async_trait]
pub trait DataSession: Send {
    async fn get(
        &mut self,
        model: &ReflectedModel,
        id: &Value,
        loads: &[EagerLoad],
    ) -> Result<Option<Row>, AppError>;

    async fn query(&mut self, model: &ReflectedModel, query: &ListQuery) -> Result<Vec<Row>, AppError>;

    /// Add a new entity and return it refreshed with store-filled values.
    async fn insert(&mut self, model: &ReflectedModel, values: &Row) -> Result<Row, AppError>;

    /// Set only the given columns on an existing entity. `None` when no entity has that key.
    async fn update(
        &mut self,
        model: &ReflectedModel,
        id: &Value,
        values: &Row,
    ) -> Result<Option<Row>, AppError>;

    /// Delete one entity and return it as it was. `None` when no entity has that key.
    async fn delete(&mut self, model: &ReflectedModel, id: &Value) -> Result<Option<Row>, AppError>;

    /// Remove every row of the entity type; returns the primary keys removed.
    async fn bulk_delete(&mut self, model: &ReflectedModel) -> Result<Vec<Value>, AppError>;

    async fn commit(&mut self) -> Result<(), AppError>;

    async fn rollback(&mut self) -> Result<(), AppError>;
}

/// Equality that treats `1` and `1.0` as the same value.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

/// Total order over scalar JSON values. Null sorts after everything, as PostgreSQL does for ASC.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(n), Value::Number(m)) => n
            .as_f64()
            .partial_cmp(&m.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(s), Value::String(t)) => s.cmp(t),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_loosely() {
        assert!(loose_eq(&json!(1), &json!(1.0)));
        assert!(!loose_eq(&json!("1"), &json!(1)));
    }

    #[test]
    fn nulls_sort_last() {
        let mut v = vec![json!(null), json!(3), json!(1)];
        v.sort_by(compare_values);
        assert_eq!(v, vec![json!(1), json!(3), json!(null)]);
    }
}
