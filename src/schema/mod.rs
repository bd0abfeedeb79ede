//! Schema synthesis: structural request/response schemas derived from a reflected model.

mod descriptor;
mod openapi;
mod synth;

pub use descriptor::{FieldSpec, FieldType, SchemaDescriptor, SchemaKind};
pub use synth::{create_schema, response_schema, update_schema};
