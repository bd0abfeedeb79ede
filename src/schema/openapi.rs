//! OpenAPI rendering of synthesized schemas.

use crate::config::SemanticType;
use crate::schema::{FieldType, SchemaDescriptor, SchemaKind};
use utoipa::openapi::schema::{
    AdditionalProperties, KnownFormat, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::RefOr;

fn scalar(t: SemanticType) -> (Type, Option<KnownFormat>) {
    match t {
        SemanticType::Integer => (Type::Integer, Some(KnownFormat::Int32)),
        SemanticType::BigInt => (Type::Integer, Some(KnownFormat::Int64)),
        SemanticType::Float => (Type::Number, Some(KnownFormat::Double)),
        SemanticType::Text => (Type::String, None),
        SemanticType::Boolean => (Type::Boolean, None),
        SemanticType::Uuid => (Type::String, Some(KnownFormat::Uuid)),
        SemanticType::Timestamp => (Type::String, Some(KnownFormat::DateTime)),
        SemanticType::Date => (Type::String, Some(KnownFormat::Date)),
        SemanticType::Json => (Type::Object, None),
    }
}

impl SchemaDescriptor {
    pub fn to_openapi(&self) -> Schema {
        let mut object = ObjectBuilder::new()
            .schema_type(SchemaType::new(Type::Object))
            .title(Some(self.name.clone()));
        for f in &self.fields {
            let property = match &f.field_type {
                FieldType::Scalar(t) => {
                    let (ty, format) = scalar(*t);
                    let schema_type = if f.nullable {
                        SchemaType::from_iter([ty, Type::Null])
                    } else {
                        SchemaType::new(ty)
                    };
                    ObjectBuilder::new()
                        .schema_type(schema_type)
                        .format(format.map(SchemaFormat::KnownFormat))
                }
                FieldType::Nested(_) => ObjectBuilder::new()
                    .schema_type(SchemaType::AnyValue)
                    .description(Some("nested object, array of nested objects, or absent")),
            };
            object = object.property(&f.name, RefOr::T(Schema::Object(property.build())));
            if !f.optional {
                object = object.required(&f.name);
            }
        }
        if self.deny_unknown {
            object = object.additional_properties(Some(AdditionalProperties::FreeForm(false)));
        }
        if self.kind == SchemaKind::Update {
            object = object.description(Some("partial update; omitted fields are left unchanged"));
        }
        Schema::Object(object.build())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{reflect, ColumnDef, SemanticType, TableModel};
    use crate::schema::{create_schema, response_schema};
    use std::collections::HashSet;

    #[test]
    fn renders_required_fields_and_closed_create_schema() {
        let model = reflect(
            &TableModel::new("Widget")
                .column(ColumnDef::new("id", SemanticType::Uuid).primary_key().with_default())
                .column(ColumnDef::new("name", SemanticType::Text).not_null())
                .column(ColumnDef::new("weight", SemanticType::Float)),
        )
        .unwrap();

        let create = serde_json::to_value(create_schema(&model, &HashSet::new()).to_openapi()).unwrap();
        assert_eq!(create["required"], serde_json::json!(["name"]));
        assert_eq!(create["additionalProperties"], serde_json::json!(false));
        assert!(create["properties"].get("id").is_none());

        let response = serde_json::to_value(response_schema(&model, &HashSet::new()).to_openapi()).unwrap();
        assert_eq!(response["title"], "Widget");
        assert_eq!(response["properties"]["id"]["format"], "uuid");
        assert!(response.get("additionalProperties").is_none());
    }
}
