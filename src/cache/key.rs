//! Cache key derivation.

/// `"{prefix}_{id}"`, or `"{prefix}_{id}_{qualifier}"` when a non-empty qualifier is given.
pub fn derive_key(prefix: &str, id: &str, qualifier: Option<&str>) -> String {
    match qualifier.filter(|q| !q.is_empty()) {
        Some(q) => format!("{}_{}_{}", prefix, id, q),
        None => format!("{}_{}", prefix, id),
    }
}

/// Key deriver carrying the deployment suffix, fixed at construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheKeyDeriver {
    suffix: Option<String>,
}

impl CacheKeyDeriver {
    pub fn new(suffix: Option<String>) -> Self {
        CacheKeyDeriver {
            suffix: suffix.filter(|s| !s.is_empty()),
        }
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn derive(&self, prefix: &str, id: &str, qualifier: Option<&str>) -> String {
        let key = derive_key(prefix, id, qualifier);
        match &self.suffix {
            Some(s) => format!("{}_{}", key, s),
            None => key,
        }
    }
}
