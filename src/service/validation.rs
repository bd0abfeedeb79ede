//! Per-column rule validation, applied after the structural schema check.

use crate::config::{ReflectedModel, ValidationRule};
use crate::error::AppError;
use crate::session::Row;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Column rules of one model, with patterns compiled once.
#[derive(Debug, Default)]
pub struct RequestValidator {
    rules: HashMap<String, ValidationRule>,
    patterns: HashMap<String, Regex>,
}

impl RequestValidator {
    pub fn from_model(model: &ReflectedModel) -> Result<Self, crate::error::ConfigError> {
        let mut rules = HashMap::new();
        let mut patterns = HashMap::new();
        for col in model.columns() {
            let Some(rule) = &col.validation else { continue };
            if let Some(p) = &rule.pattern {
                let re = Regex::new(p).map_err(|e| {
                    crate::error::ConfigError::Validation(format!(
                        "invalid pattern for {}.{}: {}",
                        model.name(),
                        col.name,
                        e
                    ))
                })?;
                patterns.insert(col.name.clone(), re);
            }
            rules.insert(col.name.clone(), rule.clone());
        }
        Ok(RequestValidator { rules, patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Validate body against per-column rules. All required fields must be present.
    pub fn validate(&self, body: &Row) -> Result<(), AppError> {
        for (col, rule) in &self.rules {
            let val = body.get(col);
            if rule.required == Some(true) && val.map_or(true, Value::is_null) {
                return Err(AppError::Validation(format!("{} is required", col)));
            }
            if let Some(v) = val {
                self.validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for updates). Required is not enforced for missing fields.
    pub fn validate_partial(&self, body: &Row) -> Result<(), AppError> {
        for (col, v) in body {
            if let Some(rule) = self.rules.get(col) {
                self.validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    fn validate_field(&self, col: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
        if v.is_null() {
            return Ok(());
        }
        if let Some(format) = &rule.format {
            validate_format(col, v, format)?;
        }
        if let Some(s) = v.as_str() {
            let len = s.chars().count();
            if let Some(max) = rule.max_length {
                if len > max as usize {
                    return Err(AppError::Validation(format!(
                        "{} must be at most {} characters",
                        col, max
                    )));
                }
            }
            if let Some(min) = rule.min_length {
                if len < min as usize {
                    return Err(AppError::Validation(format!(
                        "{} must be at least {} characters",
                        col, min
                    )));
                }
            }
            if let Some(re) = self.patterns.get(col) {
                if !re.is_match(s) {
                    return Err(AppError::Validation(format!(
                        "{} does not match required pattern",
                        col
                    )));
                }
            }
        }
        if let Some(allowed) = &rule.allowed {
            if !allowed.iter().any(|a| crate::session::loose_eq(v, a)) {
                return Err(AppError::Validation(format!(
                    "{} must be one of: {:?}",
                    col,
                    allowed.iter().take(5).collect::<Vec<_>>()
                )));
            }
        }
        if let Some(n) = v.as_f64() {
            if let Some(min) = rule.minimum {
                if n < min {
                    return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
                }
            }
            if let Some(max) = rule.maximum {
                if n > max {
                    return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
                }
            }
        }
        Ok(())
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    match format.to_lowercase().as_str() {
        "email" => {
            if !s.contains('@') || s.len() < 3 {
                return Err(AppError::Validation(format!("{} must be a valid email", col)));
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(AppError::Validation(format!("{} must be a valid UUID", col)));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{reflect, ColumnDef, SemanticType, TableModel};
    use serde_json::json;

    fn validator() -> RequestValidator {
        let model = reflect(
            &TableModel::new("Account")
                .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
                .column(ColumnDef::new("email", SemanticType::Text).rule(ValidationRule {
                    required: Some(true),
                    format: Some("email".into()),
                    ..Default::default()
                }))
                .column(ColumnDef::new("code", SemanticType::Text).rule(ValidationRule {
                    pattern: Some("^[A-Z]{3}$".into()),
                    ..Default::default()
                }))
                .column(ColumnDef::new("age", SemanticType::Integer).rule(ValidationRule {
                    minimum: Some(0.0),
                    maximum: Some(150.0),
                    ..Default::default()
                })),
        )
        .unwrap();
        RequestValidator::from_model(&model).unwrap()
    }

    fn body(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => Row::new(),
        }
    }

    #[test]
    fn full_validation_enforces_required() {
        let v = validator();
        let err = v.validate(&body(json!({"code": "ABC"}))).unwrap_err();
        assert_eq!(err.to_string(), "validation: email is required");
        assert!(v.validate(&body(json!({"email": "a@b.io", "code": "ABC"}))).is_ok());
    }

    #[test]
    fn partial_validation_checks_only_present_fields() {
        let v = validator();
        assert!(v.validate_partial(&body(json!({"age": 30}))).is_ok());
        assert!(v.validate_partial(&body(json!({"age": 200}))).is_err());
        assert!(v.validate_partial(&body(json!({"code": "abc"}))).is_err());
    }

    #[test]
    fn bad_pattern_is_a_configuration_error() {
        let model = reflect(
            &TableModel::new("T")
                .column(ColumnDef::new("id", SemanticType::Integer).primary_key())
                .column(ColumnDef::new("s", SemanticType::Text).rule(ValidationRule {
                    pattern: Some("(".into()),
                    ..Default::default()
                })),
        )
        .unwrap();
        assert!(RequestValidator::from_model(&model).is_err());
    }
}
