//! Batching and camera.
//!
//! Visible entities are grouped by `(texture, shader)` into batches. Each
//! batch owns a vertex, index, transform and indirect buffer and is drawn
//! with one indirect multi-draw per frame.
//!
//! Convention:
//! - one transform (model matrix) per instance, one indirect record per entity
//! - indirect record `i` draws instance `i`, so slot order is draw order

mod batch;
mod buffer;
mod camera;

pub use batch::{Batch, BatchConfig, BatchHandle, BatchManager};
pub use buffer::GpuArray;
pub use camera::{Camera, Projection, ORTHO_DEPTH};
