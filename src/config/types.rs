//! Declared table models: columns, relationships and per-column validation rules.
//!
//! Models are either built in Rust with the builder methods below or deserialized from JSON
//! (see [`crate::config::loader`]).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;

/// Semantic type of a column, independent of the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SemanticType {
    Integer,
    BigInt,
    Float,
    Text,
    Boolean,
    Uuid,
    Timestamp,
    Date,
    Json,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Integer => "integer",
            SemanticType::BigInt => "bigint",
            SemanticType::Float => "float",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
            SemanticType::Uuid => "uuid",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Date => "date",
            SemanticType::Json => "json",
        }
    }

    /// PostgreSQL type used to cast parameters and selected columns.
    pub fn pg_cast(&self) -> &'static str {
        match self {
            SemanticType::Integer | SemanticType::BigInt => "int8",
            SemanticType::Float => "float8",
            SemanticType::Text => "text",
            SemanticType::Boolean => "bool",
            SemanticType::Uuid => "uuid",
            SemanticType::Timestamp => "timestamptz",
            SemanticType::Date => "date",
            SemanticType::Json => "jsonb",
        }
    }

    /// Whether a non-null JSON value is acceptable for a column of this type.
    pub fn accepts(&self, v: &Value) -> bool {
        match self {
            SemanticType::Integer | SemanticType::BigInt => v.is_i64() || v.is_u64(),
            SemanticType::Float => v.is_number(),
            SemanticType::Text => v.is_string(),
            SemanticType::Boolean => v.is_boolean(),
            SemanticType::Uuid => v.as_str().is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            SemanticType::Timestamp => v.as_str().is_some_and(|s| parse_timestamp(s).is_some()),
            SemanticType::Date => v
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            SemanticType::Json => true,
        }
    }

    /// Coerce a raw path or query string into a JSON value of this type.
    pub fn parse_param(&self, s: &str) -> Option<Value> {
        match self {
            SemanticType::Integer | SemanticType::BigInt => {
                s.trim().parse::<i64>().ok().map(|n| Value::Number(n.into()))
            }
            SemanticType::Float => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            SemanticType::Boolean => {
                if s.eq_ignore_ascii_case("true") {
                    Some(Value::Bool(true))
                } else if s.eq_ignore_ascii_case("false") {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }
            SemanticType::Uuid => uuid::Uuid::parse_str(s)
                .ok()
                .map(|u| Value::String(u.to_string())),
            SemanticType::Timestamp => parse_timestamp(s).map(|_| Value::String(s.to_string())),
            SemanticType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|_| Value::String(s.to_string())),
            SemanticType::Text => Some(Value::String(s.to_string())),
            SemanticType::Json => {
                Some(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string())))
            }
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, SemanticType::Integer | SemanticType::BigInt)
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticType {
    type Err = String;

    /// Accepts the canonical names plus common SQL spellings (`varchar(32)`, `serial`, `timestamptz`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();
        let ty = match base {
            "integer" | "int" | "int4" | "smallint" | "int2" | "serial" => SemanticType::Integer,
            "bigint" | "int8" | "bigserial" => SemanticType::BigInt,
            "float" | "float4" | "float8" | "real" | "double" | "double precision" | "numeric"
            | "decimal" => SemanticType::Float,
            "text" | "string" | "varchar" | "character varying" | "char" => SemanticType::Text,
            "boolean" | "bool" => SemanticType::Boolean,
            "uuid" => SemanticType::Uuid,
            "timestamp" | "timestamptz" | "timestamp with time zone" | "datetime" => {
                SemanticType::Timestamp
            }
            "date" => SemanticType::Date,
            "json" | "jsonb" => SemanticType::Json,
            _ => return Err(format!("unknown column type '{}'", s)),
        };
        Ok(ty)
    }
}

impl TryFrom<String> for SemanticType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SemanticType> for String {
    fn from(t: SemanticType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// The store fills the column when a write omits it (server default, sequence, ...).
    #[serde(default)]
    pub has_default: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub validation: Option<ValidationRule>,
}

fn default_true() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        ColumnDef {
            name: name.into(),
            semantic_type,
            nullable: true,
            primary_key: false,
            has_default: false,
            unique: false,
            validation: None,
        }
    }

    /// Marks the column as primary key. Primary keys are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.validation = Some(rule);
        self
    }
}

/// Direction of a relationship: to_one (we hold the key to them) or to_many (they hold a key to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    ToOne,
    ToMany,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    pub kind: RelationshipKind,
    /// Table holding the related rows.
    pub target_table: String,
    #[serde(default)]
    pub target_schema: Option<String>,
    /// Our column used in the join (our FK for to_one; usually our PK for to_many).
    pub local_column: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub remote_column: String,
}

impl RelationshipDef {
    pub fn to_one(
        name: impl Into<String>,
        target_table: impl Into<String>,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        RelationshipDef {
            name: name.into(),
            kind: RelationshipKind::ToOne,
            target_table: target_table.into(),
            target_schema: None,
            local_column: local_column.into(),
            remote_column: remote_column.into(),
        }
    }

    pub fn to_many(
        name: impl Into<String>,
        target_table: impl Into<String>,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        RelationshipDef {
            kind: RelationshipKind::ToMany,
            ..RelationshipDef::to_one(name, target_table, local_column, remote_column)
        }
    }
}

/// One relational entity: its name, backing table, columns and relationships.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableModel {
    pub name: String,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl TableModel {
    pub fn new(name: impl Into<String>) -> Self {
        TableModel {
            name: name.into(),
            table_name: None,
            schema: None,
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Backing table name; defaults to the lowercased model name.
    pub fn resolved_table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| self.name.to_lowercase())
    }
}
