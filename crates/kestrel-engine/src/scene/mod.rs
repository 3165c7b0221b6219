//! Entity state.
//!
//! Responsibilities:
//! - store per-entity geometry templates and transforms
//! - keep the composed model matrix in sync with position/scale/rotation
//! - record which batch slot draws a visible entity (a back-reference only)

mod entity;
mod geometry;

pub use entity::{BatchMembership, Entity, EntityHandle, EntityKind, EntityStore};
pub use geometry::{Geometry, Vertex};
