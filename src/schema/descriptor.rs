//! Schema descriptors and payload checking against them.

use crate::config::{RelationshipKind, SemanticType};
use crate::error::AppError;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Response,
    Create,
    Update,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Scalar(SemanticType),
    /// A relationship: a nested object, a sequence of nested objects, or absent.
    Nested(RelationshipKind),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    /// May be omitted from a payload.
    pub optional: bool,
    /// May be explicitly `null`.
    pub nullable: bool,
    /// Value filled in when the field is omitted.
    pub default: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SchemaDescriptor {
    pub name: String,
    pub kind: SchemaKind,
    pub fields: Vec<FieldSpec>,
    /// Reject payload keys that are not fields.
    pub deny_unknown: bool,
}

impl SchemaDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check a request payload and return it as an object with defaults filled in.
    ///
    /// All problems are reported together in one [`AppError::Validation`].
    pub fn validate(&self, payload: &Value) -> Result<Map<String, Value>, AppError> {
        let Value::Object(obj) = payload else {
            return Err(AppError::Validation("body must be a JSON object".into()));
        };
        let mut problems = Vec::new();

        if self.deny_unknown {
            for key in obj.keys() {
                if self.field(key).is_none() {
                    problems.push(format!("{}: extra fields not permitted", key));
                }
            }
        }

        let mut out = Map::new();
        for f in &self.fields {
            match obj.get(&f.name) {
                Some(Value::Null) => {
                    if f.nullable {
                        out.insert(f.name.clone(), Value::Null);
                    } else {
                        problems.push(format!("{}: must not be null", f.name));
                    }
                }
                Some(v) => {
                    if f.accepts(v) {
                        out.insert(f.name.clone(), v.clone());
                    } else {
                        problems.push(format!("{}: expected {}", f.name, f.type_label()));
                    }
                }
                None => {
                    if !f.optional {
                        problems.push(format!("{}: field required", f.name));
                    } else if let Some(d) = &f.default {
                        out.insert(f.name.clone(), d.clone());
                    }
                }
            }
        }
        if !self.deny_unknown {
            for (k, v) in obj {
                if !out.contains_key(k) && self.field(k).is_none() {
                    out.insert(k.clone(), v.clone());
                }
            }
        }

        if problems.is_empty() {
            Ok(out)
        } else {
            Err(AppError::Validation(problems.join("; ")))
        }
    }

    /// Keep only the fields of this schema that the row actually carries.
    ///
    /// Explicit nulls survive; fields the store did not populate stay absent.
    pub fn project(&self, row: &Map<String, Value>) -> Value {
        let mut out = Map::new();
        for f in &self.fields {
            if let Some(v) = row.get(&f.name) {
                out.insert(f.name.clone(), v.clone());
            }
        }
        Value::Object(out)
    }
}

impl FieldSpec {
    fn accepts(&self, v: &Value) -> bool {
        match &self.field_type {
            FieldType::Scalar(t) => t.accepts(v),
            FieldType::Nested(_) => {
                v.is_object() || v.as_array().is_some_and(|a| a.iter().all(Value::is_object))
            }
        }
    }

    fn type_label(&self) -> &'static str {
        match &self.field_type {
            FieldType::Scalar(t) => t.as_str(),
            FieldType::Nested(_) => "object or array of objects",
        }
    }
}
