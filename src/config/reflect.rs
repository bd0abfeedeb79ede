//! Reflected model: a declared table model validated and indexed for runtime use.

use crate::config::{validate, ColumnDef, RelationshipDef, TableModel};
use crate::error::ConfigError;
use std::collections::HashMap;

/// Descriptor table built once per mounted model. Columns and relationships keep declaration
/// order and are also indexed by name.
#[derive(Clone, Debug)]
pub struct ReflectedModel {
    name: String,
    table_name: String,
    schema: Option<String>,
    pk_index: usize,
    columns: Vec<ColumnDef>,
    column_index: HashMap<String, usize>,
    relationships: Vec<RelationshipDef>,
    relationship_index: HashMap<String, usize>,
}

/// Validate a table model and build its descriptor table.
///
/// Fails with [`ConfigError::MissingPrimaryKey`] when no column is marked primary key.
pub fn reflect(model: &TableModel) -> Result<ReflectedModel, ConfigError> {
    validate(model)?;
    let pk_index = model
        .columns
        .iter()
        .position(|c| c.primary_key)
        .ok_or_else(|| ConfigError::MissingPrimaryKey {
            table: model.name.clone(),
        })?;

    let column_index = model
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.clone(), i))
        .collect();
    let relationship_index = model
        .relationships
        .iter()
        .enumerate()
        .map(|(i, r)| (r.name.clone(), i))
        .collect();

    Ok(ReflectedModel {
        name: model.name.clone(),
        table_name: model.resolved_table_name(),
        schema: model.schema.clone(),
        pk_index,
        columns: model.columns.clone(),
        column_index,
        relationships: model.relationships.clone(),
        relationship_index,
    })
}

impl ReflectedModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn primary_key(&self) -> &ColumnDef {
        &self.columns[self.pk_index]
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.column_index.get(name).map(|&i| &self.columns[i])
    }

    pub fn relationships(&self) -> &[RelationshipDef] {
        &self.relationships
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationship_index.get(name).map(|&i| &self.relationships[i])
    }

    pub fn relationship_names(&self) -> impl Iterator<Item = &str> {
        self.relationships.iter().map(|r| r.name.as_str())
    }

    /// Entity-type prefix for cache keys.
    pub fn cache_prefix(&self) -> String {
        self.name.to_lowercase()
    }
}
