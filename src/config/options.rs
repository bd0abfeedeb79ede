//! Engine options for one mounted model.

use serde::Deserialize;
use std::collections::HashSet;

pub const DEFAULT_CACHE_EXPIRY_SECONDS: u64 = 60;
pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CrudOptions {
    /// URL prefix for the mounted routes. `None` uses `/{model name lowercased}`.
    pub prefix: Option<String>,
    pub cache_expiry_seconds: u64,
    /// Synthesize a create schema from the model when none is given.
    pub infer_create: bool,
    /// Synthesize an update schema from the model when none is given.
    pub infer_update: bool,
    pub allow_delete: bool,
    /// Fields left out of every synthesized schema.
    pub exclude_fields: HashSet<String>,
    /// Deployment-specific segment appended to every cache key (e.g. `staging`).
    pub cache_key_suffix: Option<String>,
    pub default_limit: u64,
    pub max_limit: u64,
    pub body_limit_bytes: usize,
}

impl Default for CrudOptions {
    fn default() -> Self {
        CrudOptions {
            prefix: None,
            cache_expiry_seconds: DEFAULT_CACHE_EXPIRY_SECONDS,
            infer_create: false,
            infer_update: false,
            allow_delete: false,
            exclude_fields: HashSet::new(),
            cache_key_suffix: None,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl CrudOptions {
    /// Defaults overlaid with `CRUD_CACHE_EXPIRY_SECONDS`, `CRUD_CACHE_KEY_SUFFIX` and
    /// `CRUD_MAX_LIMIT` from the environment. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|k| std::env::var(k).ok())
    }

    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CRUD_CACHE_EXPIRY_SECONDS") {
            match v.parse() {
                Ok(n) => self.cache_expiry_seconds = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid CRUD_CACHE_EXPIRY_SECONDS"),
            }
        }
        if let Some(v) = lookup("CRUD_CACHE_KEY_SUFFIX") {
            self.cache_key_suffix = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = lookup("CRUD_MAX_LIMIT") {
            match v.parse() {
                Ok(n) => self.max_limit = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid CRUD_MAX_LIMIT"),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let o = CrudOptions::default();
        assert_eq!(o.cache_expiry_seconds, 60);
        assert_eq!(o.default_limit, 100);
        assert!(!o.allow_delete);
        assert!(o.cache_key_suffix.is_none());
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("CRUD_CACHE_EXPIRY_SECONDS", "5"),
            ("CRUD_CACHE_KEY_SUFFIX", "staging"),
            ("CRUD_MAX_LIMIT", "lots"),
        ]
        .into_iter()
        .collect();
        let o = CrudOptions::default().with_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(o.cache_expiry_seconds, 5);
        assert_eq!(o.cache_key_suffix.as_deref(), Some("staging"));
        assert_eq!(o.max_limit, MAX_LIMIT);
    }

    #[test]
    fn deserializes_partial_options() {
        let o: CrudOptions =
            serde_json::from_str(r#"{"allow_delete": true, "exclude_fields": ["secret"]}"#).unwrap();
        assert!(o.allow_delete);
        assert!(o.exclude_fields.contains("secret"));
        assert_eq!(o.cache_expiry_seconds, 60);
    }
}
