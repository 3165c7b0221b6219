use std::path::Path;

use crate::device::{GpuDevice, ProgramId, ShaderStage, StageId};
use crate::error::Result;
use crate::files;
use crate::handle::{Handle, HandleTable};

pub type ShaderHandle = Handle<Shader>;

/// A linked vertex/fragment program and the sources it was built from.
#[derive(Debug)]
pub struct Shader {
    vertex: Option<StageId>,
    fragment: Option<StageId>,
    program: Option<ProgramId>,
    vertex_source: String,
    fragment_source: String,
}

impl Shader {
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }
}

/// Owns every user shader.
#[derive(Debug)]
pub struct ShaderManager {
    table: HandleTable<Shader>,
}

impl ShaderManager {
    pub fn new(growth: usize) -> Self {
        Self {
            table: HandleTable::with_growth("shader", growth),
        }
    }

    /// Reads both stage files and builds a program from them.
    pub fn load(
        &mut self,
        device: &mut impl GpuDevice,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<ShaderHandle> {
        let vertex = files::read_text(vertex_path.as_ref())?;
        let fragment = files::read_text(fragment_path.as_ref())?;
        let handle = self.create(device, vertex, fragment)?;
        log::debug!(
            "shader {handle} loaded from {} + {}",
            vertex_path.as_ref().display(),
            fragment_path.as_ref().display()
        );
        Ok(handle)
    }

    /// Compiles both stages and links them.
    ///
    /// Each step is checked before the next one runs; on any failure the
    /// stages and program built so far are destroyed together with the slot.
    pub fn create(
        &mut self,
        device: &mut impl GpuDevice,
        vertex_source: String,
        fragment_source: String,
    ) -> Result<ShaderHandle> {
        let handle = self.table.insert(Shader {
            vertex: None,
            fragment: None,
            program: None,
            vertex_source,
            fragment_source,
        })?;

        if let Err(e) = self.build(device, handle) {
            log::error!("shader {handle}: {e}");
            self.destroy(device, handle)?;
            return Err(e);
        }
        Ok(handle)
    }

    fn build(&mut self, device: &mut impl GpuDevice, handle: ShaderHandle) -> Result<()> {
        let shader = self.table.get_mut(handle)?;

        shader.vertex = Some(device.compile_stage(ShaderStage::Vertex, &shader.vertex_source)?);
        shader.fragment = Some(device.compile_stage(ShaderStage::Fragment, &shader.fragment_source)?);

        if let (Some(vs), Some(fs)) = (shader.vertex, shader.fragment) {
            shader.program = Some(device.link_program(vs, fs)?);
        }
        Ok(())
    }

    /// Releases the program, both stages and the slot.
    pub fn destroy(&mut self, device: &mut impl GpuDevice, shader: ShaderHandle) -> Result<()> {
        let shader = self.table.remove(shader)?;
        if let Some(program) = shader.program {
            device.destroy_program(program);
        }
        for stage in [shader.vertex, shader.fragment].into_iter().flatten() {
            device.destroy_stage(stage);
        }
        Ok(())
    }

    pub fn get(&self, shader: ShaderHandle) -> Result<&Shader> {
        self.table.get(shader)
    }

    pub fn contains(&self, shader: ShaderHandle) -> bool {
        self.table.contains(shader)
    }

    pub fn handles(&self) -> Vec<ShaderHandle> {
        self.table.handles()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
