//! Texture and shader managers.
//!
//! Both wrap a `HandleTable` and create their GPU objects through a
//! `GpuDevice`. Creation is all-or-nothing: a failed step destroys whatever
//! was built before the error is returned.
//!
//! Cascades into batches and entities are driven by `core::Engine`, which
//! owns the managers together with the scene.

mod shader;
mod texture;

pub use shader::{Shader, ShaderHandle, ShaderManager};
pub use texture::{DecodedImage, Texture, TextureHandle, TextureManager};
