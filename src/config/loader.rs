//! Load table models from JSON text or files.

use crate::config::{validate, TableModel};
use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

/// Parse one model object or an array of models. Every model is validated.
pub fn models_from_json(text: &str) -> Result<Vec<TableModel>, ConfigError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))?;
    let models: Vec<TableModel> = match value {
        Value::Array(_) => serde_json::from_value(value),
        _ => serde_json::from_value(value).map(|m| vec![m]),
    }
    .map_err(|e| ConfigError::Load(e.to_string()))?;
    for m in &models {
        validate(m)?;
    }
    Ok(models)
}

pub async fn load_models_from_file(path: impl AsRef<Path>) -> Result<Vec<TableModel>, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading table models");
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    models_from_json(&text)
}
