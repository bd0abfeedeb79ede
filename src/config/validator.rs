//! Model validation: primary key presence and name uniqueness.

use crate::config::TableModel;
use crate::error::ConfigError;
use std::collections::HashSet;

/// Structural checks on a declared model. Exactly one column must be primary key; column and
/// relationship names share one namespace because both become response fields.
pub fn validate(model: &TableModel) -> Result<(), ConfigError> {
    if model.name.trim().is_empty() {
        return Err(ConfigError::Validation("table model name must not be empty".into()));
    }

    let mut names = HashSet::new();
    for c in &model.columns {
        if c.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "table model '{}' has a column with an empty name",
                model.name
            )));
        }
        if !names.insert(c.name.as_str()) {
            return Err(ConfigError::DuplicateField {
                table: model.name.clone(),
                name: c.name.clone(),
            });
        }
    }
    for r in &model.relationships {
        if !names.insert(r.name.as_str()) {
            return Err(ConfigError::DuplicateField {
                table: model.name.clone(),
                name: r.name.clone(),
            });
        }
        if !model.columns.iter().any(|c| c.name == r.local_column) {
            return Err(ConfigError::Validation(format!(
                "relationship '{}' on '{}' joins on unknown column '{}'",
                r.name, model.name, r.local_column
            )));
        }
    }

    let pk_cols: Vec<String> = model
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.clone())
        .collect();
    match pk_cols.len() {
        0 => Err(ConfigError::MissingPrimaryKey {
            table: model.name.clone(),
        }),
        1 => Ok(()),
        _ => Err(ConfigError::MultiplePrimaryKeys {
            table: model.name.clone(),
            columns: pk_cols,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnDef, RelationshipDef, SemanticType};

    fn base() -> TableModel {
        TableModel::new("Widget")
            .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
            .column(ColumnDef::new("name", SemanticType::Text))
    }

    #[test]
    fn accepts_single_primary_key() {
        assert_eq!(validate(&base()), Ok(()));
    }

    #[test]
    fn rejects_missing_primary_key() {
        let model = TableModel::new("Widget").column(ColumnDef::new("name", SemanticType::Text));
        assert_eq!(
            validate(&model),
            Err(ConfigError::MissingPrimaryKey { table: "Widget".into() })
        );
    }

    #[test]
    fn rejects_composite_primary_key() {
        let model = base().column(ColumnDef::new("slot", SemanticType::Integer).primary_key());
        assert!(matches!(
            validate(&model),
            Err(ConfigError::MultiplePrimaryKeys { columns, .. }) if columns == vec!["id", "slot"]
        ));
    }

    #[test]
    fn rejects_relationship_shadowing_column() {
        let model = base().relationship(RelationshipDef::to_many("name", "parts", "id", "widget_id"));
        assert!(matches!(validate(&model), Err(ConfigError::DuplicateField { .. })));
    }

    #[test]
    fn rejects_relationship_on_unknown_column() {
        let model = base().relationship(RelationshipDef::to_one("owner", "owners", "owner_id", "id"));
        assert!(matches!(validate(&model), Err(ConfigError::Validation(_))));
    }
}
