//! Route generation.

pub mod entity;
pub use entity::{CrudBuilder, CrudRouter, MountedRoute, RouteKind};
