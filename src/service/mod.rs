//! CRUD engine: cache-aside reads, transactional writes, postprocessing and rule validation.

mod crud;
mod postprocess;
mod validation;
pub use crud::{CrudEngine, ListParams};
pub use postprocess::{add_field, run_postprocessors, Payload, Postprocessor};
pub use validation::RequestValidator;
