use crate::error::{EngineError, Result};
use crate::handle::HandleTable;
use crate::paint::Color;

use super::types::{
    BatchDraw, BufferDesc, BufferId, BufferUsage, ImageDesc, ImageId, IndirectDraw, PassSettings,
    ProgramId, ShaderStage, StageId, VertexFormatDesc, VertexFormatId,
};
use super::GpuDevice;

struct HeadlessBuffer {
    usage: BufferUsage,
    bytes: Vec<u8>,
}

struct HeadlessImage {
    width: u32,
    height: u32,
}

struct HeadlessProgram {
    vertex: StageId,
    fragment: StageId,
}

/// Draw captured by `HeadlessDevice::draw`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: Option<ProgramId>,
    pub image: Option<ImageId>,
    pub format: VertexFormatId,
    pub indirect: BufferId,
    /// Records read back from the indirect buffer at draw time.
    pub commands: Vec<IndirectDraw>,
}

/// CPU implementation of `GpuDevice`.
///
/// Buffers are byte vectors, so tests can read back exactly what the engine
/// uploaded. Shader sources compile when they define the stage's entry point.
/// Out-of-range writes and copies are not applied and are recorded as
/// violations instead.
pub struct HeadlessDevice {
    buffers: HandleTable<HeadlessBuffer>,
    formats: HandleTable<VertexFormatDesc>,
    images: HandleTable<HeadlessImage>,
    stages: HandleTable<ShaderStage>,
    programs: HandleTable<HeadlessProgram>,

    size: (u32, u32),
    fail_allocations: bool,

    frame_active: bool,
    frames_presented: u64,
    last_clear: Option<Color>,
    last_pass: Option<PassSettings>,
    draws: Vec<RecordedDraw>,
    violations: Vec<String>,
}

impl HeadlessDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffers: HandleTable::new("buffer"),
            formats: HandleTable::new("vertex format"),
            images: HandleTable::new("image"),
            stages: HandleTable::new("shader stage"),
            programs: HandleTable::new("program"),
            size: (width, height),
            fail_allocations: false,
            frame_active: false,
            frames_presented: 0,
            last_clear: None,
            last_pass: None,
            draws: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Makes every subsequent buffer, format and image creation fail.
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer.cast()).ok().map(|b| b.bytes.as_slice())
    }

    pub fn buffer_usage(&self, buffer: BufferId) -> Option<BufferUsage> {
        self.buffers.get(buffer.cast()).ok().map(|b| b.usage)
    }

    pub fn vertex_format(&self, format: VertexFormatId) -> Option<VertexFormatDesc> {
        self.formats.get(format.cast()).ok().copied()
    }

    pub fn image_size(&self, image: ImageId) -> Option<(u32, u32)> {
        self.images.get(image.cast()).ok().map(|i| (i.width, i.height))
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_formats(&self) -> usize {
        self.formats.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn live_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Draws recorded since the last `begin_frame`.
    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn last_clear(&self) -> Option<Color> {
        self.last_clear
    }

    pub fn last_pass(&self) -> Option<PassSettings> {
        self.last_pass
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Misuses detected so far (bad ids, out-of-range writes).
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn violation(&mut self, message: String) {
        log::error!("headless device: {message}");
        self.violations.push(message);
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Option<BufferId> {
        if self.fail_allocations || desc.size == 0 || desc.size % 4 != 0 {
            return None;
        }
        let len = usize::try_from(desc.size).ok()?;
        let buffer = HeadlessBuffer {
            usage: desc.usage,
            bytes: vec![0; len],
        };
        self.buffers.insert(buffer).ok().map(|h| h.cast())
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Ok(target) = self.buffers.get_mut(buffer.cast()) else {
            self.violation(format!("write to unknown buffer {buffer}"));
            return;
        };

        let start = offset as usize;
        let end = start + data.len();
        if end > target.bytes.len() || offset % 4 != 0 || data.len() % 4 != 0 {
            let len = target.bytes.len();
            self.violation(format!(
                "write of {} bytes at {offset} into buffer {buffer} of {len} bytes",
                data.len()
            ));
            return;
        }
        target.bytes[start..end].copy_from_slice(data);
    }

    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, size: u64) {
        let size = size as usize;
        let source = match self.buffers.get(src.cast()) {
            Ok(b) if b.bytes.len() >= size => b.bytes[..size].to_vec(),
            _ => {
                self.violation(format!("copy of {size} bytes from buffer {src}"));
                return;
            }
        };
        match self.buffers.get_mut(dst.cast()) {
            Ok(b) if b.bytes.len() >= size => b.bytes[..size].copy_from_slice(&source),
            _ => self.violation(format!("copy of {size} bytes into buffer {dst}")),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(buffer.cast()).is_err() {
            self.violation(format!("destroy of unknown buffer {buffer}"));
        }
    }

    fn create_vertex_format(&mut self, desc: &VertexFormatDesc) -> Option<VertexFormatId> {
        if self.fail_allocations {
            return None;
        }
        let bound = [desc.vertices, desc.instances, desc.indices];
        if bound.iter().any(|b| !self.buffers.contains(b.cast())) {
            return None;
        }
        self.formats.insert(*desc).ok().map(|h| h.cast())
    }

    fn destroy_vertex_format(&mut self, format: VertexFormatId) {
        if self.formats.remove(format.cast()).is_err() {
            self.violation(format!("destroy of unknown vertex format {format}"));
        }
    }

    fn create_image(&mut self, desc: &ImageDesc<'_>) -> Option<ImageId> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if self.fail_allocations || desc.width == 0 || desc.height == 0 || desc.pixels.len() != expected {
            return None;
        }
        let image = HeadlessImage {
            width: desc.width,
            height: desc.height,
        };
        self.images.insert(image).ok().map(|h| h.cast())
    }

    fn destroy_image(&mut self, image: ImageId) {
        if self.images.remove(image.cast()).is_err() {
            self.violation(format!("destroy of unknown image {image}"));
        }
    }

    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageId> {
        let entry = stage.entry_point();
        if !source.contains(&format!("fn {entry}")) {
            return Err(EngineError::ShaderCompile {
                stage,
                log: format!("missing entry point `{entry}`"),
            });
        }
        let id = self.stages.insert(stage)?;
        Ok(id.cast())
    }

    fn destroy_stage(&mut self, stage: StageId) {
        if self.stages.remove(stage.cast()).is_err() {
            self.violation(format!("destroy of unknown shader stage {stage}"));
        }
    }

    fn link_program(&mut self, vertex: StageId, fragment: StageId) -> Result<ProgramId> {
        let vs = self.stages.get(vertex.cast()).ok().copied();
        let fs = self.stages.get(fragment.cast()).ok().copied();
        if vs != Some(ShaderStage::Vertex) || fs != Some(ShaderStage::Fragment) {
            return Err(EngineError::ShaderLink(format!(
                "stages {vertex} and {fragment} are not a vertex/fragment pair"
            )));
        }
        let id = self.programs.insert(HeadlessProgram { vertex, fragment })?;
        Ok(id.cast())
    }

    fn destroy_program(&mut self, program: ProgramId) {
        if self.programs.remove(program.cast()).is_err() {
            self.violation(format!("destroy of unknown program {program}"));
        }
    }

    fn begin_frame(&mut self, clear: Color) {
        self.frame_active = true;
        self.last_clear = Some(clear);
        self.draws.clear();
    }

    fn draw(&mut self, pass: &PassSettings, draws: &[BatchDraw<'_>]) {
        if !self.frame_active {
            return;
        }
        self.last_pass = Some(*pass);

        for draw in draws {
            if !self.formats.contains(draw.format.cast()) {
                self.violation(format!("draw with unknown vertex format {}", draw.format));
                continue;
            }
            if let Some(program) = draw.program {
                let linked = self.programs.get(program.cast()).is_ok_and(|p| {
                    self.stages.contains(p.vertex.cast()) && self.stages.contains(p.fragment.cast())
                });
                if !linked {
                    self.violation(format!("draw with unknown program {program}"));
                    continue;
                }
            }
            if let Some(image) = draw.image.filter(|i| !self.images.contains(i.cast())) {
                self.violation(format!("draw with unknown image {image}"));
                continue;
            }

            let Ok(indirect) = self.buffers.get(draw.indirect.cast()) else {
                self.violation(format!("draw with unknown indirect buffer {}", draw.indirect));
                continue;
            };
            let len = draw.commands.len() * IndirectDraw::SIZE as usize;
            let Some(bytes) = indirect.bytes.get(..len) else {
                self.violation(format!("indirect buffer {} shorter than {len} bytes", draw.indirect));
                continue;
            };
            let commands = bytemuck::pod_collect_to_vec::<u8, IndirectDraw>(bytes);

            self.draws.push(RecordedDraw {
                program: draw.program,
                image: draw.image,
                format: draw.format,
                indirect: draw.indirect,
                commands,
            });
        }
    }

    fn end_frame(&mut self) {
        if self.frame_active {
            self.frame_active = false;
            self.frames_presented += 1;
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(device: &mut HeadlessDevice, size: u64) -> BufferId {
        device
            .create_buffer(&BufferDesc { usage: BufferUsage::Vertex, size })
            .unwrap()
    }

    // ── buffers ───────────────────────────────────────────────────────────

    #[test]
    fn buffers_start_zeroed_and_accept_writes() {
        let mut d = HeadlessDevice::default();
        let b = buffer(&mut d, 16);
        d.write_buffer(b, 4, &[1, 2, 3, 4]);
        assert_eq!(d.buffer_contents(b).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(d.violations().is_empty());
    }

    #[test]
    fn out_of_range_write_is_rejected() {
        let mut d = HeadlessDevice::default();
        let b = buffer(&mut d, 8);
        d.write_buffer(b, 8, &[1, 2, 3, 4]);
        assert_eq!(d.buffer_contents(b).unwrap(), &[0; 8]);
        assert_eq!(d.violations().len(), 1);
    }

    #[test]
    fn copy_moves_prefix() {
        let mut d = HeadlessDevice::default();
        let a = buffer(&mut d, 8);
        let b = buffer(&mut d, 16);
        d.write_buffer(a, 0, &[9; 8]);
        d.copy_buffer(a, b, 8);
        assert_eq!(&d.buffer_contents(b).unwrap()[..8], &[9; 8]);
        assert_eq!(&d.buffer_contents(b).unwrap()[8..], &[0; 8]);
    }

    #[test]
    fn failing_allocations() {
        let mut d = HeadlessDevice::default();
        d.set_fail_allocations(true);
        assert!(d.create_buffer(&BufferDesc { usage: BufferUsage::Index, size: 4 }).is_none());
        let pixels = [255u8; 4];
        assert!(d.create_image(&ImageDesc { width: 1, height: 1, pixels: &pixels }).is_none());
        assert_eq!(d.live_buffers(), 0);
    }

    // ── shaders ───────────────────────────────────────────────────────────

    #[test]
    fn compile_requires_entry_point() {
        let mut d = HeadlessDevice::default();
        assert!(d.compile_stage(ShaderStage::Vertex, "fn vs_main() {}").is_ok());
        let err = d.compile_stage(ShaderStage::Fragment, "fn vs_main() {}").unwrap_err();
        assert!(matches!(err, EngineError::ShaderCompile { stage: ShaderStage::Fragment, .. }));
        assert_eq!(d.live_stages(), 1);
    }

    #[test]
    fn link_rejects_swapped_stages() {
        let mut d = HeadlessDevice::default();
        let vs = d.compile_stage(ShaderStage::Vertex, "fn vs_main() {}").unwrap();
        let fs = d.compile_stage(ShaderStage::Fragment, "fn fs_main() {}").unwrap();
        assert!(d.link_program(fs, vs).is_err());
        assert!(d.link_program(vs, fs).is_ok());
        assert_eq!(d.live_programs(), 1);
    }

    // ── frames ────────────────────────────────────────────────────────────

    #[test]
    fn end_frame_without_begin_is_noop() {
        let mut d = HeadlessDevice::default();
        d.end_frame();
        assert_eq!(d.frames_presented(), 0);
        d.begin_frame(Color::BLACK);
        d.end_frame();
        assert_eq!(d.frames_presented(), 1);
    }
}
