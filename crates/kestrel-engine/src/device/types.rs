use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::coords::Viewport;
use crate::handle::Handle;

/// Marker types naming the device object tables.
pub enum GpuBuffer {}
pub enum GpuVertexFormat {}
pub enum GpuImage {}
pub enum GpuStage {}
pub enum GpuProgram {}

pub type BufferId = Handle<GpuBuffer>;
pub type VertexFormatId = Handle<GpuVertexFormat>;
pub type ImageId = Handle<GpuImage>;
pub type StageId = Handle<GpuStage>;
pub type ProgramId = Handle<GpuProgram>;

/// Role of a device buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    /// Per-vertex geometry stream.
    Vertex,
    /// `u32` indices.
    Index,
    /// Per-instance stream (model matrices).
    Instance,
    /// Indirect draw records.
    Indirect,
}

impl BufferUsage {
    pub(crate) fn label(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "kestrel vertex buffer",
            BufferUsage::Index => "kestrel index buffer",
            BufferUsage::Instance => "kestrel instance buffer",
            BufferUsage::Indirect => "kestrel indirect buffer",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferDesc {
    pub usage: BufferUsage,
    /// Size in bytes. Must be a non-zero multiple of 4.
    pub size: u64,
}

/// Vertex stream layouts understood by the device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexLayout {
    /// Per-vertex `position: f32x3, uv: f32x2`; per-instance model matrix as
    /// four `f32x4` columns, one matrix per instance.
    Sprite,
}

impl VertexLayout {
    /// Bytes per vertex in the per-vertex stream.
    pub const fn vertex_stride(self) -> u64 {
        match self {
            VertexLayout::Sprite => 20,
        }
    }

    /// Bytes per instance in the per-instance stream.
    pub const fn instance_stride(self) -> u64 {
        match self {
            VertexLayout::Sprite => 64,
        }
    }
}

/// Binding of a vertex, instance and index buffer under one layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexFormatDesc {
    pub layout: VertexLayout,
    pub vertices: BufferId,
    pub instances: BufferId,
    pub indices: BufferId,
}

/// Tightly packed RGBA8 pixels, rows top to bottom.
#[derive(Debug, Copy, Clone)]
pub struct ImageDesc<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Entry point a stage's source must define.
    pub const fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// One indexed indirect draw record, laid out as the GPU reads it.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDraw {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl IndirectDraw {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Per-pass state shared by every batch drawn in one `render`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PassSettings {
    pub viewport: Viewport,
    pub depth_test: bool,
    pub view_projection: Mat4,
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            viewport: Viewport::FULL,
            depth_test: false,
            view_projection: Mat4::IDENTITY,
        }
    }
}

/// One batch submission: a single multi-draw over `commands`.
///
/// `program`/`image` of `None` select the device's built-in sprite program
/// and 1x1 white image.
#[derive(Debug, Copy, Clone)]
pub struct BatchDraw<'a> {
    pub program: Option<ProgramId>,
    pub image: Option<ImageId>,
    pub format: VertexFormatId,
    pub indirect: BufferId,
    /// CPU mirror of the indirect buffer's live records.
    pub commands: &'a [IndirectDraw],
}
