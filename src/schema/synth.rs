//! Derive response, create and update schemas from a reflected model.

use crate::config::{ColumnDef, ReflectedModel};
use crate::schema::{FieldSpec, FieldType, SchemaDescriptor, SchemaKind};
use serde_json::Value;
use std::collections::HashSet;

fn column_field(c: &ColumnDef, optional: bool, default: Option<Value>) -> FieldSpec {
    FieldSpec {
        name: c.name.clone(),
        field_type: FieldType::Scalar(c.semantic_type),
        optional,
        nullable: c.nullable,
        default,
    }
}

fn null_default(c: &ColumnDef) -> Option<Value> {
    c.nullable.then_some(Value::Null)
}

/// Every non-excluded column (optional when nullable) and every non-excluded relationship.
/// Extra keys are allowed so postprocessors may add fields.
pub fn response_schema(model: &ReflectedModel, exclude: &HashSet<String>) -> SchemaDescriptor {
    let mut fields: Vec<FieldSpec> = model
        .columns()
        .iter()
        .filter(|c| !exclude.contains(&c.name))
        .map(|c| column_field(c, c.nullable, null_default(c)))
        .collect();
    fields.extend(
        model
            .relationships()
            .iter()
            .filter(|r| !exclude.contains(&r.name))
            .map(|r| FieldSpec {
                name: r.name.clone(),
                field_type: FieldType::Nested(r.kind),
                optional: true,
                nullable: true,
                default: Some(Value::Null),
            }),
    );
    SchemaDescriptor {
        name: model.name().to_string(),
        kind: SchemaKind::Response,
        fields,
        deny_unknown: false,
    }
}

/// Non-excluded columns the store cannot fill itself (no default). A primary key without a
/// default may be supplied but is not required.
pub fn create_schema(model: &ReflectedModel, exclude: &HashSet<String>) -> SchemaDescriptor {
    let fields = model
        .columns()
        .iter()
        .filter(|c| !exclude.contains(&c.name) && !c.has_default)
        .map(|c| column_field(c, c.nullable || c.primary_key, null_default(c)))
        .collect();
    SchemaDescriptor {
        name: format!("{}Create", model.name()),
        kind: SchemaKind::Create,
        fields,
        deny_unknown: true,
    }
}

/// Non-excluded, non-primary-key columns, all optional and without defaults so that omitted
/// fields are left untouched.
pub fn update_schema(model: &ReflectedModel, exclude: &HashSet<String>) -> SchemaDescriptor {
    let fields = model
        .columns()
        .iter()
        .filter(|c| !exclude.contains(&c.name) && !c.primary_key)
        .map(|c| column_field(c, true, None))
        .collect();
    SchemaDescriptor {
        name: format!("{}Update", model.name()),
        kind: SchemaKind::Update,
        fields,
        deny_unknown: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{reflect, ColumnDef, RelationshipDef, SemanticType, TableModel};
    use crate::error::AppError;
    use serde_json::json;

    fn person() -> ReflectedModel {
        reflect(
            &TableModel::new("Person")
                .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
                .column(ColumnDef::new("name", SemanticType::Text).not_null())
                .column(ColumnDef::new("age", SemanticType::Integer))
                .column(ColumnDef::new("created_at", SemanticType::Timestamp).not_null().with_default())
                .column(ColumnDef::new("secret", SemanticType::Text))
                .relationship(RelationshipDef::to_many("pets", "pets", "id", "owner_id")),
        )
        .unwrap()
    }

    fn names(s: &SchemaDescriptor) -> Vec<&str> {
        s.field_names().collect()
    }

    fn exclude(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn field_sets_are_disjoint_from_exclusions() {
        let model = person();
        let ex = exclude(&["secret", "pets", "age"]);
        for schema in [
            response_schema(&model, &ex),
            create_schema(&model, &ex),
            update_schema(&model, &ex),
        ] {
            assert!(schema.field_names().all(|n| !ex.contains(n)), "{}", schema.name);
            assert!(schema
                .field_names()
                .all(|n| model.column(n).is_some() || model.relationship(n).is_some()));
        }
    }

    #[test]
    fn response_schema_has_columns_and_relationships() {
        let s = response_schema(&person(), &HashSet::new());
        assert_eq!(names(&s), vec!["id", "name", "age", "created_at", "secret", "pets"]);
        assert!(!s.field("name").unwrap().optional);
        assert!(s.field("age").unwrap().optional);
        assert_eq!(s.field("age").unwrap().default, Some(Value::Null));
        assert!(s.field("name").unwrap().default.is_none());
        assert!(matches!(s.field("pets").unwrap().field_type, FieldType::Nested(_)));
        assert!(!s.deny_unknown);
    }

    #[test]
    fn create_schema_omits_defaulted_columns() {
        let s = create_schema(&person(), &HashSet::new());
        assert_eq!(names(&s), vec!["id", "name", "age", "secret"]);
        assert!(s.field("id").unwrap().optional);
        assert!(!s.field("name").unwrap().optional);
        assert!(s.deny_unknown);
        assert_eq!(s.name, "PersonCreate");
    }

    #[test]
    fn update_schema_never_contains_primary_key() {
        let s = update_schema(&person(), &HashSet::new());
        assert_eq!(names(&s), vec!["name", "age", "created_at", "secret"]);
        assert!(s.fields.iter().all(|f| f.optional && f.default.is_none()));
    }

    #[test]
    fn create_validation_fills_null_defaults() {
        let s = create_schema(&person(), &HashSet::new());
        let out = s.validate(&json!({ "name": "Ada" })).unwrap();
        assert_eq!(out.get("name"), Some(&json!("Ada")));
        assert_eq!(out.get("age"), Some(&Value::Null));
        assert!(!out.contains_key("id"));
    }

    #[test]
    fn create_validation_reports_every_problem() {
        let s = create_schema(&person(), &HashSet::new());
        let err = s
            .validate(&json!({ "age": "old", "nickname": "x" }))
            .unwrap_err();
        let AppError::Validation(msg) = err else { panic!("expected validation error") };
        assert!(msg.contains("nickname: extra fields not permitted"));
        assert!(msg.contains("age: expected integer"));
        assert!(msg.contains("name: field required"));
    }

    #[test]
    fn update_validation_keeps_only_provided_keys() {
        let s = update_schema(&person(), &HashSet::new());
        let out = s.validate(&json!({ "name": "X" })).unwrap();
        assert_eq!(out.len(), 1);
        assert!(s.validate(&json!({ "id": 3 })).is_err());
        assert!(s.validate(&json!({ "name": null })).is_err());
        assert_eq!(s.validate(&json!({ "age": null })).unwrap().get("age"), Some(&Value::Null));
        assert!(s.validate(&json!([1, 2])).is_err());
    }

    #[test]
    fn projection_keeps_populated_fields_only() {
        let s = response_schema(&person(), &exclude(&["secret"]));
        let row = json!({ "id": 1, "name": "Ada", "age": null, "secret": "s" });
        let projected = s.project(row.as_object().unwrap());
        assert_eq!(projected, json!({ "id": 1, "name": "Ada", "age": null }));
    }
}
