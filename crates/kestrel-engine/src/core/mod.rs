//! Engine context.
//!
//! `Engine` owns every resource table, the batch manager and the GPU device,
//! and exposes the platform-independent API: resource creation, entity
//! mutation, clocks, input queries and the per-frame driver.

mod engine;

pub use engine::{Engine, EngineConfig};
