//! Shared state of one mounted model's routes.

use crate::security::SecurityChecks;
use crate::service::CrudEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct CrudState {
    pub engine: Arc<CrudEngine>,
    pub security: Arc<SecurityChecks>,
}
