//! GPU device layer.
//!
//! This module is responsible for:
//! - the `GpuDevice` seam through which every GPU object is created, written and destroyed
//! - the wgpu implementation (`WgpuDevice`) bound to a window surface
//! - a CPU implementation (`HeadlessDevice`) that mirrors buffer contents for inspection
//!
//! Objects are named by typed ids. Creation returns `None` (or an error for
//! shader stages and programs) when the backend refuses the object.

mod context;
mod error;
mod frame;
mod headless;
mod init;
mod surface;
mod types;
mod wgpu_device;

pub use context::Gpu;
pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use headless::{HeadlessDevice, RecordedDraw};
pub use init::GpuInit;
pub use types::{
    BatchDraw, BufferDesc, BufferId, BufferUsage, GpuBuffer, GpuImage, GpuProgram, GpuStage,
    GpuVertexFormat, ImageDesc, ImageId, IndirectDraw, PassSettings, ProgramId, ShaderStage,
    StageId, VertexFormatDesc, VertexFormatId, VertexLayout,
};
pub use wgpu_device::WgpuDevice;

use crate::error::Result;
use crate::paint::Color;

/// Graphics backend used by the engine.
///
/// All calls happen on the thread that owns the engine. Writes and copies are
/// ordered: a draw sees every write issued before the frame is ended.
pub trait GpuDevice {
    /// Creates a zero-filled buffer.
    fn create_buffer(&mut self, desc: &BufferDesc) -> Option<BufferId>;

    /// Writes `data` at byte `offset`. Offset and length are multiples of 4.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Copies the first `size` bytes of `src` into `dst`.
    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, size: u64);

    fn destroy_buffer(&mut self, buffer: BufferId);

    /// Binds vertex, instance and index buffers under a layout.
    fn create_vertex_format(&mut self, desc: &VertexFormatDesc) -> Option<VertexFormatId>;

    fn destroy_vertex_format(&mut self, format: VertexFormatId);

    /// Uploads an RGBA8 image.
    fn create_image(&mut self, desc: &ImageDesc<'_>) -> Option<ImageId>;

    fn destroy_image(&mut self, image: ImageId);

    /// Compiles one shader stage from source.
    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId>;

    fn destroy_stage(&mut self, stage: StageId);

    /// Links a vertex and a fragment stage into a program.
    fn link_program(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId>;

    fn destroy_program(&mut self, program: ProgramId);

    /// Starts a frame and clears color and depth.
    fn begin_frame(&mut self, clear: Color);

    /// Records one pass drawing `draws` in order.
    fn draw(&mut self, pass: &PassSettings, draws: &[BatchDraw<'_>]);

    /// Submits and presents the current frame. No-op if no frame is active.
    fn end_frame(&mut self);

    /// Reconfigures the presentation target.
    fn resize(&mut self, width: u32, height: u32);

    /// Presentation target size in physical pixels.
    fn surface_size(&self) -> (u32, u32);
}
