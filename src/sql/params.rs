//! Convert serde_json::Value to typed values that sqlx can bind.

use crate::config::{types::parse_timestamp, SemanticType};
use crate::error::AppError;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A value ready to bind to a PostgreSQL query, already converted to the column's type.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Uuid(uuid::Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(Value),
}

fn mismatch(ty: SemanticType, v: &Value) -> AppError {
    AppError::Validation(format!("expected {} value, got {}", ty, v))
}

impl PgBindValue {
    pub fn from_json(v: &Value, ty: SemanticType) -> Result<Self, AppError> {
        if v.is_null() {
            return Ok(PgBindValue::Null);
        }
        Ok(match ty {
            SemanticType::Integer | SemanticType::BigInt => {
                PgBindValue::I64(v.as_i64().ok_or_else(|| mismatch(ty, v))?)
            }
            SemanticType::Float => PgBindValue::F64(v.as_f64().ok_or_else(|| mismatch(ty, v))?),
            SemanticType::Boolean => PgBindValue::Bool(v.as_bool().ok_or_else(|| mismatch(ty, v))?),
            SemanticType::Text => match v {
                Value::String(s) => PgBindValue::String(s.clone()),
                other => PgBindValue::String(other.to_string()),
            },
            SemanticType::Uuid => v
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .map(PgBindValue::Uuid)
                .ok_or_else(|| mismatch(ty, v))?,
            SemanticType::Timestamp => v
                .as_str()
                .and_then(parse_timestamp)
                .map(|naive| PgBindValue::Timestamp(Utc.from_utc_datetime(&naive)))
                .ok_or_else(|| mismatch(ty, v))?,
            SemanticType::Date => v
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(PgBindValue::Date)
                .ok_or_else(|| mismatch(ty, v))?,
            SemanticType::Json => PgBindValue::Json(v.clone()),
        })
    }

    /// Bind onto a query. Nulls bind as untyped text; the placeholder cast gives them their type.
    pub fn bind_to<'q>(
        self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            PgBindValue::Null => query.bind(None::<String>),
            PgBindValue::Bool(b) => query.bind(b),
            PgBindValue::I64(n) => query.bind(n),
            PgBindValue::F64(n) => query.bind(n),
            PgBindValue::String(s) => query.bind(s),
            PgBindValue::Uuid(u) => query.bind(u),
            PgBindValue::Timestamp(t) => query.bind(t),
            PgBindValue::Date(d) => query.bind(d),
            PgBindValue::Json(v) => query.bind(sqlx::types::Json(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_by_semantic_type() {
        assert_eq!(
            PgBindValue::from_json(&json!(7), SemanticType::BigInt).unwrap(),
            PgBindValue::I64(7)
        );
        assert_eq!(
            PgBindValue::from_json(&json!(null), SemanticType::Uuid).unwrap(),
            PgBindValue::Null
        );
        assert!(matches!(
            PgBindValue::from_json(&json!("2024-03-01T12:00:00Z"), SemanticType::Timestamp),
            Ok(PgBindValue::Timestamp(_))
        ));
        assert!(PgBindValue::from_json(&json!("x"), SemanticType::Integer).is_err());
    }
}
