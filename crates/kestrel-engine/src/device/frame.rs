/// A single acquired frame.
///
/// Lives from `begin_frame` to `end_frame`. Holding the surface texture
/// prevents acquisition of the next one.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}
