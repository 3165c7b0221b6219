//! Coordinate and geometry types.
//!
//! World space:
//! - +X right, +Y up, +Z toward the viewer
//! - one unit is one pixel under the orthographic camera
//!
//! Image space (frames) uses a top-left origin with +Y down.

mod rect;
mod transform;
mod viewport;

pub use glam::{Mat4, Vec2, Vec3};
pub use rect::FrameRect;
pub use transform::Transform;
pub use viewport::Viewport;
