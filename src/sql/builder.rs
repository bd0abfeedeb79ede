//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a reflected model.
//!
//! Identifiers come only from the model; values are always parameters. Every placeholder and
//! every selected column carries an explicit cast so row decoding can go by semantic type.

use crate::config::{ReflectedModel, RelationshipKind, SemanticType};
use crate::joins::EagerLoad;
use crate::session::{ListQuery, Row, SortDirection};
use serde_json::Value;

const MAIN_ALIAS: &str = "main";

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quoted(s), quoted(table)),
        None => quoted(table),
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    /// Semantic type of each parameter, index-aligned with `params`.
    pub types: Vec<SemanticType>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    /// Push a parameter and return its cast placeholder (`$n::type`).
    fn push_param(&mut self, v: Value, ty: SemanticType) -> String {
        self.params.push(v);
        self.types.push(ty);
        format!("${}::{}", self.params.len(), ty.pg_cast())
    }
}

fn model_table(model: &ReflectedModel) -> String {
    qualified_table(model.schema(), model.table_name())
}

/// SELECT list of declared columns, each cast to its semantic type and aliased to its own name.
fn select_column_list(model: &ReflectedModel, alias: Option<&str>) -> String {
    model
        .columns()
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            let expr = match alias {
                Some(a) => format!("{}.{}", a, q),
                None => q.clone(),
            };
            format!("{}::{} AS {}", expr, c.semantic_type.pg_cast(), q)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// One scalar subquery per eager load: `row_to_json` for to_one, `json_agg` for to_many.
fn include_subqueries(loads: &[EagerLoad]) -> Vec<String> {
    loads
        .iter()
        .map(|load| {
            let rel = &load.relationship;
            let rel_table = qualified_table(rel.target_schema.as_deref(), &rel.target_table);
            let sub_from = format!(
                "{} WHERE {} = {}.{}",
                rel_table,
                quoted(&rel.remote_column),
                MAIN_ALIAS,
                quoted(&rel.local_column)
            );
            let subquery = match rel.kind {
                RelationshipKind::ToOne => format!(
                    "(SELECT row_to_json(sub) FROM (SELECT * FROM {} LIMIT 1) sub)",
                    sub_from
                ),
                RelationshipKind::ToMany => format!(
                    "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT * FROM {}) sub)",
                    sub_from
                ),
            };
            format!("{} AS {}", subquery, quoted(&rel.name))
        })
        .collect()
}

fn select_parts(model: &ReflectedModel, loads: &[EagerLoad]) -> String {
    let mut parts = vec![select_column_list(model, Some(MAIN_ALIAS))];
    parts.extend(include_subqueries(loads));
    parts.join(", ")
}

/// SELECT one row by primary key, with eager loads.
pub fn select_by_id(model: &ReflectedModel, id: &Value, loads: &[EagerLoad]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = model.primary_key();
    let ph = q.push_param(id.clone(), pk.semantic_type);
    q.sql = format!(
        "SELECT {} FROM {} {} WHERE {}.{} = {}",
        select_parts(model, loads),
        model_table(model),
        MAIN_ALIAS,
        MAIN_ALIAS,
        quoted(&pk.name),
        ph
    );
    q
}

/// SELECT list with optional equality filter, ORDER BY, LIMIT/OFFSET and eager loads.
/// Filter and sort columns unknown to the model are ignored.
pub fn select_list(model: &ReflectedModel, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_clause = String::new();
    if let Some(f) = &query.filter {
        if let Some(col) = model.column(&f.field) {
            let ph = q.push_param(f.value.clone(), col.semantic_type);
            where_clause = format!(" WHERE {}.{} = {}", MAIN_ALIAS, quoted(&col.name), ph);
        }
    }
    let sort_column = model
        .column(&query.order.field)
        .unwrap_or_else(|| model.primary_key());
    let direction = match query.order.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    q.sql = format!(
        "SELECT {} FROM {} {}{} ORDER BY {}.{} {} LIMIT {} OFFSET {}",
        select_parts(model, &query.loads),
        model_table(model),
        MAIN_ALIAS,
        where_clause,
        MAIN_ALIAS,
        quoted(&sort_column.name),
        direction,
        query.limit,
        query.skip
    );
    q
}

/// INSERT of the given columns, RETURNING the full row. Columns the body omits are left to the
/// database (default or NULL).
pub fn insert(model: &ReflectedModel, values: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in model.columns() {
        let Some(v) = values.get(&c.name) else { continue };
        if c.primary_key && v.is_null() {
            continue;
        }
        placeholders.push(q.push_param(v.clone(), c.semantic_type));
        cols.push(quoted(&c.name));
    }
    let returning = select_column_list(model, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", model_table(model), returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            model_table(model),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only the non-key columns present in `values`. With nothing to set this is
/// a plain SELECT by id so the caller still learns whether the row exists.
pub fn update(model: &ReflectedModel, id: &Value, values: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = model.primary_key();
    let mut sets = Vec::new();
    for c in model.columns() {
        if c.primary_key {
            continue;
        }
        let Some(v) = values.get(&c.name) else { continue };
        let ph = q.push_param(v.clone(), c.semantic_type);
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    let id_ph = q.push_param(id.clone(), pk.semantic_type);
    let returning = select_column_list(model, None);
    q.sql = if sets.is_empty() {
        format!(
            "SELECT {} FROM {} WHERE {} = {}",
            returning,
            model_table(model),
            quoted(&pk.name),
            id_ph
        )
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            model_table(model),
            sets.join(", "),
            quoted(&pk.name),
            id_ph,
            returning
        )
    };
    q
}

/// DELETE by id, RETURNING the deleted row.
pub fn delete_by_id(model: &ReflectedModel, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = model.primary_key();
    let ph = q.push_param(id.clone(), pk.semantic_type);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        model_table(model),
        quoted(&pk.name),
        ph,
        select_column_list(model, None)
    );
    q
}

/// DELETE every row, RETURNING the removed primary keys.
pub fn delete_all(model: &ReflectedModel) -> QueryBuf {
    let pk = model.primary_key();
    let mut q = QueryBuf::new();
    q.sql = format!(
        "DELETE FROM {} RETURNING {}::{} AS {}",
        model_table(model),
        quoted(&pk.name),
        pk.semantic_type.pg_cast(),
        quoted(&pk.name)
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{reflect, ColumnDef, RelationshipDef, TableModel};
    use crate::joins::plan_joins;
    use crate::session::{EqualsFilter, SortOrder};
    use serde_json::json;

    fn widget() -> ReflectedModel {
        reflect(
            &TableModel::new("Widget")
                .table("widgets")
                .schema("app")
                .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
                .column(ColumnDef::new("name", SemanticType::Text))
                .column(ColumnDef::new("owner_id", SemanticType::Uuid))
                .relationship(RelationshipDef::to_one("owner", "owners", "owner_id", "id"))
                .relationship(RelationshipDef::to_many("parts", "parts", "id", "widget_id")),
        )
        .unwrap()
    }

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => Row::new(),
        }
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quoted("na\"me"), "\"na\"\"me\"");
        assert_eq!(qualified_table(Some("app"), "widgets"), "\"app\".\"widgets\"");
        assert_eq!(qualified_table(None, "widgets"), "\"widgets\"");
    }

    #[test]
    fn select_by_id_casts_and_includes() {
        let model = widget();
        let q = select_by_id(&model, &json!(5), &plan_joins(&model, &["owner", "parts"]));
        assert!(q.sql.starts_with("SELECT main.\"id\"::int8 AS \"id\", main.\"name\"::text AS \"name\""));
        assert!(q.sql.contains("FROM \"app\".\"widgets\" main WHERE main.\"id\" = $1::int8"));
        assert!(q.sql.contains(
            "(SELECT row_to_json(sub) FROM (SELECT * FROM \"owners\" WHERE \"id\" = main.\"owner_id\" LIMIT 1) sub) AS \"owner\""
        ));
        assert!(q.sql.contains("COALESCE(json_agg(row_to_json(sub)), '[]'::json)"));
        assert_eq!(q.params, vec![json!(5)]);
        assert_eq!(q.types, vec![SemanticType::Integer]);
    }

    #[test]
    fn select_list_filters_orders_and_pages() {
        let model = widget();
        let q = select_list(
            &model,
            &ListQuery {
                filter: Some(EqualsFilter {
                    field: "name".into(),
                    value: json!("bolt"),
                }),
                order: SortOrder {
                    field: "name".into(),
                    direction: SortDirection::Desc,
                },
                limit: 10,
                skip: 20,
                loads: vec![],
            },
        );
        assert!(q.sql.ends_with(
            "WHERE main.\"name\" = $1::text ORDER BY main.\"name\" DESC LIMIT 10 OFFSET 20"
        ));
        assert_eq!(q.params, vec![json!("bolt")]);
    }

    #[test]
    fn insert_skips_missing_and_null_key() {
        let model = widget();
        let q = insert(&model, &row(json!({"id": null, "name": "bolt"})));
        assert!(q.sql.starts_with("INSERT INTO \"app\".\"widgets\" (\"name\") VALUES ($1::text) RETURNING"));
        let empty = insert(&model, &Row::new());
        assert!(empty.sql.contains("DEFAULT VALUES"));
    }

    #[test]
    fn update_sets_only_given_columns() {
        let model = widget();
        let q = update(&model, &json!(3), &row(json!({"name": "nut", "id": 9})));
        assert!(q.sql.starts_with(
            "UPDATE \"app\".\"widgets\" SET \"name\" = $1::text WHERE \"id\" = $2::int8 RETURNING"
        ));
        assert_eq!(q.params, vec![json!("nut"), json!(3)]);
        let noop = update(&model, &json!(3), &Row::new());
        assert!(noop.sql.starts_with("SELECT"));
    }

    #[test]
    fn delete_all_returns_keys() {
        let q = delete_all(&widget());
        assert_eq!(q.sql, "DELETE FROM \"app\".\"widgets\" RETURNING \"id\"::int8 AS \"id\"");
        assert!(q.params.is_empty());
    }
}
