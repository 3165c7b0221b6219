//! Kestrel engine crate.
//!
//! A handle-based sprite engine. Visible entities that share a texture and a
//! shader are grouped into batches, and each batch renders with one instanced,
//! indirect multi-draw per frame.
//!
//! `core::Engine` holds all state and is generic over `device::GpuDevice`;
//! `window::Window` pairs it with a winit window and a wgpu device.

pub mod core;
pub mod device;
pub mod input;
pub mod time;
pub mod window;

pub mod coords;
pub mod error;
pub mod files;
pub mod handle;
pub mod logging;
pub mod paint;
pub mod render;
pub mod resources;
pub mod scene;

pub use crate::core::{Engine, EngineConfig};
pub use error::{EngineError, Result};
