use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

/// Cache collaborator. Implementations own storage, expiry and atomicity of each call.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError>;

    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> Result<(), AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), AppError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}
