//! In-process store: tables of JSON rows with staged, all-or-nothing commits.
//!
//! Enforces primary-key and `unique` uniqueness and NOT NULL on columns without a store default.
//! Integer primary keys come from a per-table sequence (never reused, like a database sequence),
//! uuid keys are v4. A session records its writes and replays them against the committed tables
//! at commit, under the store lock; a write that no longer applies fails the whole commit with an
//! integrity error and nothing is kept.

use crate::config::{ColumnDef, RelationshipKind, ReflectedModel, SemanticType};
use crate::error::AppError;
use crate::joins::EagerLoad;
use crate::session::{
    compare_values, loose_eq, DataSession, ListQuery, Row, SessionFactory, SortDirection,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    /// Last integer key handed out per table.
    sequences: HashMap<String, i64>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

fn table_key(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", s, table),
        None => table.to_string(),
    }
}

fn model_key(model: &ReflectedModel) -> String {
    table_key(model.schema(), model.table_name())
}

fn max_int_key(pk: &ColumnDef, rows: &[Row]) -> i64 {
    rows.iter()
        .filter_map(|r| r.get(&pk.name).and_then(Value::as_i64))
        .max()
        .unwrap_or(0)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to a table without constraint checks. Non-object values are skipped.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.tables.lock().await;
        let target = tables.rows.entry(table.to_string()).or_default();
        target.extend(rows.into_iter().filter_map(|v| match v {
            Value::Object(m) => Some(m),
            _ => None,
        }));
    }

    /// Committed rows of a table.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .await
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn begin(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            staged: HashMap::new(),
            log: Vec::new(),
        }
    }

    /// Next generated key for `table`, above every committed key and above `floor`.
    async fn next_key(&self, table: &str, pk: &ColumnDef, floor: i64) -> Option<Value> {
        match pk.semantic_type {
            SemanticType::Integer | SemanticType::BigInt => {
                let mut tables = self.tables.lock().await;
                let committed = tables.rows.get(table).map_or(0, |rows| max_int_key(pk, rows));
                let seq = tables.sequences.entry(table.to_string()).or_insert(0);
                let next = (*seq).max(committed).max(floor) + 1;
                *seq = next;
                Some(Value::Number(next.into()))
            }
            SemanticType::Uuid => Some(Value::String(uuid::Uuid::new_v4().to_string())),
            _ => None,
        }
    }
}

#[async_trait]
impl SessionFactory for MemoryStore {
    async fn session(&self) -> Result<Box<dyn DataSession>, AppError> {
        Ok(Box::new(self.begin()))
    }
}

/// One recorded write, replayed against the committed table at commit.
enum StagedOp {
    Insert(Row),
    /// Non-key column values to overwrite on the row with this key.
    Update { id: Value, values: Row },
    Delete(Value),
    Clear,
}

/// Session over a [`MemoryStore`]. Writes go to private copies of the touched tables (so the
/// session reads its own writes) and to a log that commit replays.
pub struct MemorySession {
    store: MemoryStore,
    staged: HashMap<String, Vec<Row>>,
    log: Vec<(ReflectedModel, StagedOp)>,
}

impl MemorySession {
    async fn snapshot(&self, key: &str) -> Vec<Row> {
        match self.staged.get(key) {
            Some(rows) => rows.clone(),
            None => self.store.rows(key).await,
        }
    }

    async fn staged_table(&mut self, key: &str) -> &mut Vec<Row> {
        if !self.staged.contains_key(key) {
            let rows = self.store.rows(key).await;
            self.staged.insert(key.to_string(), rows);
        }
        self.staged.entry(key.to_string()).or_default()
    }

    /// Apply `op` to the staged copy and record it for commit.
    async fn stage(&mut self, model: &ReflectedModel, op: StagedOp) -> Result<(), AppError> {
        let table = self.staged_table(&model_key(model)).await;
        apply(model, &op, table)?;
        self.log.push((model.clone(), op));
        Ok(())
    }

    async fn attach(&self, mut row: Row, loads: &[EagerLoad]) -> Row {
        for load in loads {
            let rel = &load.relationship;
            let related = self
                .snapshot(&table_key(rel.target_schema.as_deref(), &rel.target_table))
                .await;
            let local = row.get(&rel.local_column).cloned().unwrap_or(Value::Null);
            let mut matches = related.into_iter().filter(|r| {
                !local.is_null()
                    && r.get(&rel.remote_column)
                        .is_some_and(|v| loose_eq(v, &local))
            });
            let value = match rel.kind {
                RelationshipKind::ToOne => matches.next().map(Value::Object).unwrap_or(Value::Null),
                RelationshipKind::ToMany => Value::Array(matches.map(Value::Object).collect()),
            };
            row.insert(rel.name.clone(), value);
        }
        row
    }
}

fn pk_matches(model: &ReflectedModel, row: &Row, id: &Value) -> bool {
    row.get(&model.primary_key().name)
        .is_some_and(|v| loose_eq(v, id))
}

/// Keep only declared columns, in declaration order.
fn project_columns(model: &ReflectedModel, row: &Row) -> Row {
    model
        .columns()
        .iter()
        .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// NOT NULL and uniqueness checks for `row` against the other rows of its table.
fn check_constraints(
    model: &ReflectedModel,
    row: &Row,
    others: &[&Row],
) -> Result<(), AppError> {
    let table = model.table_name();
    for col in model.columns() {
        let value = row.get(&col.name).unwrap_or(&Value::Null);
        if value.is_null() {
            if !col.nullable && !col.has_default {
                return Err(AppError::Integrity(format!(
                    "NOT NULL constraint failed: {}.{}",
                    table, col.name
                )));
            }
            continue;
        }
        if (col.primary_key || col.unique)
            && others
                .iter()
                .any(|o| o.get(&col.name).is_some_and(|v| loose_eq(v, value)))
        {
            return Err(AppError::Integrity(format!(
                "UNIQUE constraint failed: {}.{}",
                table, col.name
            )));
        }
    }
    Ok(())
}

fn apply(model: &ReflectedModel, op: &StagedOp, table: &mut Vec<Row>) -> Result<(), AppError> {
    match op {
        StagedOp::Insert(row) => {
            let others: Vec<&Row> = table.iter().collect();
            check_constraints(model, row, &others)?;
            table.push(row.clone());
        }
        StagedOp::Update { id, values } => {
            let Some(pos) = table.iter().position(|r| pk_matches(model, r, id)) else {
                return Err(AppError::Integrity(format!(
                    "{}: row {} was removed by a concurrent commit",
                    model.table_name(),
                    id
                )));
            };
            let mut row = table[pos].clone();
            row.extend(values.clone());
            let others: Vec<&Row> = table
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pos)
                .map(|(_, r)| r)
                .collect();
            check_constraints(model, &row, &others)?;
            table[pos] = row;
        }
        StagedOp::Delete(id) => table.retain(|r| !pk_matches(model, r, id)),
        StagedOp::Clear => table.clear(),
    }
    Ok(())
}

#[async_trait]
impl DataSession for MemorySession {
    async fn get(
        &mut self,
        model: &ReflectedModel,
        id: &Value,
        loads: &[EagerLoad],
    ) -> Result<Option<Row>, AppError> {
        let rows = self.snapshot(&model_key(model)).await;
        match rows.iter().find(|r| pk_matches(model, r, id)) {
            Some(row) => Ok(Some(self.attach(project_columns(model, row), loads).await)),
            None => Ok(None),
        }
    }

    async fn query(&mut self, model: &ReflectedModel, query: &ListQuery) -> Result<Vec<Row>, AppError> {
        let mut rows: Vec<Row> = self
            .snapshot(&model_key(model))
            .await
            .into_iter()
            .filter(|r| match &query.filter {
                Some(f) => r.get(&f.field).is_some_and(|v| loose_eq(v, &f.value)),
                None => true,
            })
            .collect();
        let field = query.order.field.as_str();
        rows.sort_by(|a, b| {
            let ord = compare_values(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
            );
            match query.order.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
        let mut out = Vec::new();
        for row in rows
            .iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
        {
            out.push(self.attach(project_columns(model, row), &query.loads).await);
        }
        Ok(out)
    }

    async fn insert(&mut self, model: &ReflectedModel, values: &Row) -> Result<Row, AppError> {
        let key = model_key(model);
        let pk = model.primary_key();
        let mut row = project_columns(model, values);
        if row.get(&pk.name).map_or(true, Value::is_null) {
            let floor = max_int_key(pk, self.staged_table(&key).await);
            if let Some(generated) = self.store.next_key(&key, pk, floor).await {
                row.insert(pk.name.clone(), generated);
            }
        }
        self.stage(model, StagedOp::Insert(row.clone())).await?;
        Ok(row)
    }

    async fn update(
        &mut self,
        model: &ReflectedModel,
        id: &Value,
        values: &Row,
    ) -> Result<Option<Row>, AppError> {
        let key = model_key(model);
        if !self.snapshot(&key).await.iter().any(|r| pk_matches(model, r, id)) {
            return Ok(None);
        }
        let values: Row = values
            .iter()
            .filter(|(k, _)| model.column(k).is_some_and(|c| !c.primary_key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.stage(
            model,
            StagedOp::Update {
                id: id.clone(),
                values,
            },
        )
        .await?;
        let table = self.staged_table(&key).await;
        Ok(table
            .iter()
            .find(|r| pk_matches(model, r, id))
            .map(|r| project_columns(model, r)))
    }

    async fn delete(&mut self, model: &ReflectedModel, id: &Value) -> Result<Option<Row>, AppError> {
        let key = model_key(model);
        let Some(row) = self
            .snapshot(&key)
            .await
            .into_iter()
            .find(|r| pk_matches(model, r, id))
        else {
            return Ok(None);
        };
        self.stage(model, StagedOp::Delete(id.clone())).await?;
        Ok(Some(project_columns(model, &row)))
    }

    async fn bulk_delete(&mut self, model: &ReflectedModel) -> Result<Vec<Value>, AppError> {
        let pk = model.primary_key().name.clone();
        let removed = self
            .snapshot(&model_key(model))
            .await
            .iter()
            .filter_map(|r| r.get(&pk).cloned())
            .collect();
        self.stage(model, StagedOp::Clear).await?;
        Ok(removed)
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        self.staged.clear();
        let log = std::mem::take(&mut self.log);
        if log.is_empty() {
            return Ok(());
        }
        let mut tables = self.store.tables.lock().await;
        let mut work: HashMap<String, Vec<Row>> = HashMap::new();
        for (model, op) in &log {
            let table = work
                .entry(model_key(model))
                .or_insert_with_key(|k| tables.rows.get(k).cloned().unwrap_or_default());
            if let Err(e) = apply(model, op, table) {
                tracing::warn!(table = %model.table_name(), error = %e, "commit conflict; discarding session writes");
                return Err(e);
            }
        }
        tables.rows.extend(work);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.staged.clear();
        self.log.clear();
        Ok(())
    }
}
