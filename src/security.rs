//! Per-operation authorization checks, run as a route layer ahead of the handler's extractors.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

#[async_trait]
pub trait SecurityCheck: Send + Sync {
    /// `Ok(())` admits the request; an error short-circuits it.
    async fn check(&self, op: Operation, headers: &HeaderMap) -> Result<(), AppError>;
}

/// Optional check per operation kind. Operations without a check are open.
#[derive(Clone, Default)]
pub struct SecurityChecks {
    pub read: Option<Arc<dyn SecurityCheck>>,
    pub create: Option<Arc<dyn SecurityCheck>>,
    pub update: Option<Arc<dyn SecurityCheck>>,
    pub delete: Option<Arc<dyn SecurityCheck>>,
}

impl SecurityChecks {
    pub fn set(&mut self, op: Operation, check: Arc<dyn SecurityCheck>) {
        let slot = match op {
            Operation::Read => &mut self.read,
            Operation::Create => &mut self.create,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        };
        *slot = Some(check);
    }

    pub fn for_operation(&self, op: Operation) -> Option<&Arc<dyn SecurityCheck>> {
        match op {
            Operation::Read => self.read.as_ref(),
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }

    pub async fn authorize(&self, op: Operation, headers: &HeaderMap) -> Result<(), AppError> {
        match self.for_operation(op) {
            Some(check) => check.check(op, headers).await,
            None => Ok(()),
        }
    }
}

/// Middleware for one operation's routes. Runs before the body is read, so an unauthorized
/// caller never sees a body rejection.
pub async fn enforce(
    State((checks, op)): State<(Arc<SecurityChecks>, Operation)>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    checks.authorize(op, request.headers()).await?;
    Ok(next.run(request).await)
}

/// Static shared-secret check: the named header must carry exactly `token`.
pub struct HeaderTokenCheck {
    header: String,
    token: String,
}

impl HeaderTokenCheck {
    pub fn new(header: impl Into<String>, token: impl Into<String>) -> Self {
        HeaderTokenCheck {
            header: header.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl SecurityCheck for HeaderTokenCheck {
    async fn check(&self, op: Operation, headers: &HeaderMap) -> Result<(), AppError> {
        let Some(value) = headers.get(self.header.as_str()) else {
            return Err(AppError::Unauthorized(format!("missing {} header", self.header)));
        };
        if value.as_bytes() == self.token.as_bytes() {
            Ok(())
        } else {
            tracing::debug!(?op, header = %self.header, "token mismatch");
            Err(AppError::Forbidden(format!("{:?} not permitted", op).to_lowercase()))
        }
    }
}
