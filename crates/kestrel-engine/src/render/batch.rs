use crate::device::{
    BatchDraw, BufferId, BufferUsage, GpuDevice, ImageId, IndirectDraw, ProgramId, VertexFormatDesc,
    VertexFormatId, VertexLayout,
};
use crate::error::{EngineError, Result};
use crate::handle::{Handle, HandleTable};
use crate::resources::{ShaderHandle, TextureHandle};
use crate::scene::{BatchMembership, EntityHandle, EntityKind, EntityStore};

use super::buffer::{grown_capacity, GpuArray};

pub type BatchHandle = Handle<Batch>;

const INDEX_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// Initial capacities of a new batch and the fixed steps they grow by.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BatchConfig {
    pub initial_entities: u32,
    pub entity_growth: u32,
    pub initial_vertices: u32,
    pub vertex_growth: u32,
    pub initial_indices: u32,
    pub index_growth: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_entities: 64,
            entity_growth: 64,
            initial_vertices: 256,
            vertex_growth: 256,
            initial_indices: 384,
            index_growth: 384,
        }
    }
}

/// Entities sharing one texture/shader pair, drawn by a single indirect multi-draw.
///
/// Slots `0..len()` of the transform and indirect buffers are always occupied
/// and match `members()`. The vertex/index region is append-only between
/// repacks: removal leaves holes that are reclaimed before the region grows.
#[derive(Debug)]
pub struct Batch {
    texture: Option<TextureHandle>,
    shader: Option<ShaderHandle>,
    kind: EntityKind,
    layout: VertexLayout,
    transparent: bool,

    vertices: GpuArray,
    indices: GpuArray,
    transforms: GpuArray,
    indirect: GpuArray,
    format: VertexFormatId,

    members: Vec<EntityHandle>,
    commands: Vec<IndirectDraw>,

    vertex_cursor: u32,
    index_cursor: u32,
    live_vertices: u32,
    live_indices: u32,
}

impl Batch {
    fn create(
        device: &mut impl GpuDevice,
        config: &BatchConfig,
        texture: Option<TextureHandle>,
        shader: Option<ShaderHandle>,
        kind: EntityKind,
        transparent: bool,
    ) -> Result<Self> {
        let layout = kind.layout().ok_or(EngineError::Unsupported("mesh batches"))?;

        let specs = [
            (BufferUsage::Vertex, layout.vertex_stride(), config.initial_vertices),
            (BufferUsage::Index, INDEX_SIZE, config.initial_indices),
            (BufferUsage::Instance, layout.instance_stride(), config.initial_entities),
            (BufferUsage::Indirect, IndirectDraw::SIZE, config.initial_entities),
        ];
        let mut built = Vec::with_capacity(specs.len());
        for (usage, stride, capacity) in specs {
            match GpuArray::create(device, usage, stride, capacity.max(1)) {
                Ok(array) => built.push(array),
                Err(e) => {
                    built.into_iter().for_each(|a| a.destroy(device));
                    return Err(e);
                }
            }
        }
        let mut built = built.into_iter();
        let (Some(vertices), Some(indices), Some(transforms), Some(indirect)) =
            (built.next(), built.next(), built.next(), built.next())
        else {
            return Err(EngineError::GpuObjectCreation("batch buffers"));
        };

        let desc = VertexFormatDesc {
            layout,
            vertices: vertices.id(),
            instances: transforms.id(),
            indices: indices.id(),
        };
        let Some(format) = device.create_vertex_format(&desc) else {
            for array in [vertices, indices, transforms, indirect] {
                array.destroy(device);
            }
            return Err(EngineError::GpuObjectCreation("vertex format"));
        };

        Ok(Self {
            texture,
            shader,
            kind,
            layout,
            transparent,
            vertices,
            indices,
            transforms,
            indirect,
            format,
            members: Vec::new(),
            commands: Vec::new(),
            vertex_cursor: 0,
            index_cursor: 0,
            live_vertices: 0,
            live_indices: 0,
        })
    }

    fn release(self, device: &mut impl GpuDevice) {
        device.destroy_vertex_format(self.format);
        for array in [self.vertices, self.indices, self.transforms, self.indirect] {
            array.destroy(device);
        }
    }

    /// Buffers referenced by the vertex format.
    fn bound_ids(&self) -> [BufferId; 3] {
        [self.vertices.id(), self.transforms.id(), self.indices.id()]
    }

    /// Replaces the vertex format after a bound buffer was reallocated.
    fn rebind(&mut self, device: &mut impl GpuDevice) -> Result<()> {
        let desc = VertexFormatDesc {
            layout: self.layout,
            vertices: self.vertices.id(),
            instances: self.transforms.id(),
            indices: self.indices.id(),
        };
        let format = device
            .create_vertex_format(&desc)
            .ok_or(EngineError::GpuObjectCreation("vertex format"))?;
        device.destroy_vertex_format(self.format);
        self.format = format;
        Ok(())
    }

    fn has_holes(&self) -> bool {
        self.live_vertices < self.vertex_cursor || self.live_indices < self.index_cursor
    }

    /// Rewrites live members' geometry contiguously from the start of the region.
    fn repack(&mut self, device: &mut impl GpuDevice, entities: &mut EntityStore) -> Result<()> {
        let (mut vertex, mut index) = (0u32, 0u32);

        for (slot, &member) in self.members.iter().enumerate() {
            let entity = entities.get_mut(member)?;
            let geometry = &entity.geometry;
            self.vertices.write(device, vertex, geometry.vertex_bytes());
            self.indices.write(device, index, geometry.index_bytes());

            if let Some(m) = entity.membership.as_mut() {
                m.first_vertex = vertex;
                m.first_index = index;
            }
            let command = &mut self.commands[slot];
            command.first_index = index;
            command.base_vertex = vertex as i32;

            vertex += geometry.vertex_count();
            index += geometry.index_count();
        }

        if !self.commands.is_empty() {
            self.indirect.write(device, 0, bytemuck::cast_slice(&self.commands));
        }
        log::trace!(
            "batch repacked: vertices {} -> {vertex}, indices {} -> {index}",
            self.vertex_cursor,
            self.index_cursor
        );
        self.vertex_cursor = vertex;
        self.index_cursor = index;
        Ok(())
    }

    /// Grows every buffer that cannot take one more entity of the given size.
    fn grow_for(
        &mut self,
        device: &mut impl GpuDevice,
        config: &BatchConfig,
        vertices: u32,
        indices: u32,
    ) -> Result<()> {
        let slots = self.len();
        let needed = slots + 1;
        let cap = grown_capacity(self.transforms.capacity(), needed, config.entity_growth)
            .ok_or(EngineError::OutOfMemory("batch transform buffer"))?;
        self.transforms.grow(device, cap, slots)?;
        let cap = grown_capacity(self.indirect.capacity(), needed, config.entity_growth)
            .ok_or(EngineError::OutOfMemory("batch indirect buffer"))?;
        self.indirect.grow(device, cap, slots)?;

        let needed = self
            .vertex_cursor
            .checked_add(vertices)
            .and_then(|n| grown_capacity(self.vertices.capacity(), n, config.vertex_growth))
            .ok_or(EngineError::OutOfMemory("batch vertex buffer"))?;
        self.vertices.grow(device, needed, self.vertex_cursor)?;

        let needed = self
            .index_cursor
            .checked_add(indices)
            .and_then(|n| grown_capacity(self.indices.capacity(), n, config.index_growth))
            .ok_or(EngineError::OutOfMemory("batch index buffer"))?;
        self.indices.grow(device, needed, self.index_cursor)?;
        Ok(())
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    /// Number of member entities.
    pub fn len(&self) -> u32 {
        self.members.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in slot order.
    pub fn members(&self) -> &[EntityHandle] {
        &self.members
    }

    /// CPU mirror of the indirect buffer, one record per slot.
    pub fn commands(&self) -> &[IndirectDraw] {
        &self.commands
    }

    pub fn format(&self) -> VertexFormatId {
        self.format
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vertices.id()
    }

    pub fn index_buffer(&self) -> BufferId {
        self.indices.id()
    }

    pub fn transform_buffer(&self) -> BufferId {
        self.transforms.id()
    }

    pub fn indirect_buffer(&self) -> BufferId {
        self.indirect.id()
    }

    pub fn entity_capacity(&self) -> u32 {
        self.transforms.capacity().min(self.indirect.capacity())
    }

    pub fn vertex_capacity(&self) -> u32 {
        self.vertices.capacity()
    }

    pub fn index_capacity(&self) -> u32 {
        self.indices.capacity()
    }

    /// Vertex write cursor, holes included.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_cursor
    }

    /// Index write cursor, holes included.
    pub fn index_count(&self) -> u32 {
        self.index_cursor
    }
}

/// Owns every batch and all GPU buffers behind them.
///
/// At most one batch exists per `(texture, shader)` pair. A batch is created
/// by the first `add` for its pair and destroyed when its last member leaves.
#[derive(Debug)]
pub struct BatchManager {
    table: HandleTable<Batch>,
    config: BatchConfig,
}

impl BatchManager {
    pub fn new(config: BatchConfig, growth: usize) -> Self {
        Self {
            table: HandleTable::with_growth("batch", growth),
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Batch for the exact `(texture, shader)` pair.
    pub fn find(&self, texture: Option<TextureHandle>, shader: Option<ShaderHandle>) -> Option<BatchHandle> {
        self.table
            .iter()
            .find(|(_, b)| b.texture == texture && b.shader == shader)
            .map(|(h, _)| h)
    }

    /// Appends `entity` to the batch for its pair, creating the batch if needed.
    ///
    /// `transparent` is recorded on a newly created batch. Adding an entity
    /// that is already batched returns its batch unchanged.
    pub fn add(
        &mut self,
        device: &mut impl GpuDevice,
        entities: &mut EntityStore,
        entity: EntityHandle,
        transparent: bool,
    ) -> Result<BatchHandle> {
        let e = entities.get(entity)?;
        if let Some(m) = e.membership {
            return Ok(m.batch);
        }
        let (texture, shader, kind) = (e.texture, e.shader, e.kind);

        let (batch, created) = match self.find(texture, shader) {
            Some(batch) => (batch, false),
            None => {
                let b = Batch::create(device, &self.config, texture, shader, kind, transparent)?;
                let batch = self.table.insert(b)?;
                log::debug!("batch {batch} created for texture {texture:?}, shader {shader:?}");
                (batch, true)
            }
        };

        if let Err(err) = self.place(device, entities, batch, entity) {
            if created && self.table.get(batch).is_ok_and(Batch::is_empty) {
                self.destroy(device, entities, batch)?;
            }
            return Err(err);
        }
        Ok(batch)
    }

    fn place(
        &mut self,
        device: &mut impl GpuDevice,
        entities: &mut EntityStore,
        batch_handle: BatchHandle,
        entity: EntityHandle,
    ) -> Result<()> {
        let config = self.config;
        let batch = self.table.get_mut(batch_handle)?;

        let e = entities.get(entity)?;
        let (vertex_count, index_count) = (e.geometry.vertex_count(), e.geometry.index_count());

        let overflows = batch.vertex_cursor.saturating_add(vertex_count) > batch.vertices.capacity()
            || batch.index_cursor.saturating_add(index_count) > batch.indices.capacity();
        if overflows && batch.has_holes() {
            batch.repack(device, entities)?;
        }

        let bound = batch.bound_ids();
        let grown = batch.grow_for(device, &config, vertex_count, index_count);
        if batch.bound_ids() != bound {
            batch.rebind(device)?;
        }
        grown?;

        let e = entities.get(entity)?;
        let slot = batch.len();
        let (first_vertex, first_index) = (batch.vertex_cursor, batch.index_cursor);
        let command = IndirectDraw {
            index_count,
            instance_count: 1,
            first_index,
            base_vertex: first_vertex as i32,
            first_instance: slot,
        };

        batch.vertices.write(device, first_vertex, e.geometry.vertex_bytes());
        batch.indices.write(device, first_index, e.geometry.index_bytes());
        batch.transforms.write(device, slot, bytemuck::bytes_of(&e.matrix.to_cols_array()));
        batch.indirect.write(device, slot, bytemuck::bytes_of(&command));

        batch.members.push(entity);
        batch.commands.push(command);
        batch.vertex_cursor += vertex_count;
        batch.index_cursor += index_count;
        batch.live_vertices += vertex_count;
        batch.live_indices += index_count;

        entities.get_mut(entity)?.membership = Some(BatchMembership {
            batch: batch_handle,
            slot,
            first_vertex,
            first_index,
        });
        Ok(())
    }

    /// Takes `entity` out of its batch.
    ///
    /// The last member moves into the vacated slot so the transform and
    /// indirect arrays stay dense. A batch left empty is destroyed. Removing
    /// an entity that is not batched does nothing.
    pub fn remove(&mut self, device: &mut impl GpuDevice, entities: &mut EntityStore, entity: EntityHandle) -> Result<()> {
        let e = entities.get(entity)?;
        let Some(m) = e.membership else {
            return Ok(());
        };
        let (vertex_count, index_count) = (e.geometry.vertex_count(), e.geometry.index_count());

        let batch = self.table.get_mut(m.batch)?;
        let slot = m.slot as usize;
        if batch.members.get(slot) != Some(&entity) {
            return Err(EngineError::InvalidArgument(format!(
                "entity {entity} is not in slot {slot} of batch {}",
                m.batch
            )));
        }

        let last = batch.members.len() - 1;
        if slot != last {
            let moved = batch.members[last];
            let mut command = batch.commands[last];
            command.first_instance = m.slot;

            let moved_entity = entities.get_mut(moved)?;
            batch.transforms.write(device, m.slot, bytemuck::bytes_of(&moved_entity.matrix.to_cols_array()));
            batch.indirect.write(device, m.slot, bytemuck::bytes_of(&command));
            if let Some(mm) = moved_entity.membership.as_mut() {
                mm.slot = m.slot;
            }

            batch.members[slot] = moved;
            batch.commands[slot] = command;
        }
        batch.members.pop();
        batch.commands.pop();

        batch.live_vertices -= vertex_count;
        batch.live_indices -= index_count;
        if m.first_vertex + vertex_count == batch.vertex_cursor && m.first_index + index_count == batch.index_cursor {
            batch.vertex_cursor = m.first_vertex;
            batch.index_cursor = m.first_index;
        }
        let empty = batch.is_empty();

        entities.get_mut(entity)?.membership = None;
        if empty {
            self.destroy(device, entities, m.batch)?;
        }
        Ok(())
    }

    /// Releases the batch's GPU objects and un-batches every member.
    pub fn destroy(&mut self, device: &mut impl GpuDevice, entities: &mut EntityStore, batch: BatchHandle) -> Result<()> {
        let removed = self.table.remove(batch)?;
        for &member in &removed.members {
            if let Ok(e) = entities.get_mut(member) {
                e.membership = None;
            }
        }
        log::debug!("batch {batch} destroyed with {} members", removed.members.len());
        removed.release(device);
        Ok(())
    }

    /// Destroys every batch matching `pred`. Returns how many were destroyed.
    pub fn destroy_where(
        &mut self,
        device: &mut impl GpuDevice,
        entities: &mut EntityStore,
        pred: impl Fn(&Batch) -> bool,
    ) -> Result<usize> {
        let doomed: Vec<BatchHandle> = self.table.iter().filter(|(_, b)| pred(b)).map(|(h, _)| h).collect();
        for &batch in &doomed {
            self.destroy(device, entities, batch)?;
        }
        Ok(doomed.len())
    }

    /// Pushes one entity's model matrix into its transform slot.
    pub fn sync_transform(&self, device: &mut impl GpuDevice, entities: &EntityStore, entity: EntityHandle) -> Result<()> {
        let e = entities.get(entity)?;
        let Some(m) = e.membership else {
            return Ok(());
        };
        let batch = self.table.get(m.batch)?;
        batch.transforms.write(device, m.slot, bytemuck::bytes_of(&e.matrix.to_cols_array()));
        Ok(())
    }

    /// Rewrites one entity's vertex range from its geometry template.
    pub fn sync_vertices(&self, device: &mut impl GpuDevice, entities: &EntityStore, entity: EntityHandle) -> Result<()> {
        let e = entities.get(entity)?;
        let Some(m) = e.membership else {
            return Ok(());
        };
        let batch = self.table.get(m.batch)?;
        batch.vertices.write(device, m.first_vertex, e.geometry.vertex_bytes());
        Ok(())
    }

    /// One draw per non-empty batch, opaque batches first.
    ///
    /// `resolve` maps a batch to its program and image; `None` selects the
    /// device defaults.
    pub fn draws(&self, resolve: impl Fn(&Batch) -> (Option<ProgramId>, Option<ImageId>)) -> Vec<BatchDraw<'_>> {
        let mut ordered: Vec<&Batch> = self.table.iter().map(|(_, b)| b).filter(|b| !b.is_empty()).collect();
        ordered.sort_by_key(|b| b.transparent);

        ordered
            .into_iter()
            .map(|b| {
                let (program, image) = resolve(b);
                BatchDraw {
                    program,
                    image,
                    format: b.format,
                    indirect: b.indirect.id(),
                    commands: &b.commands,
                }
            })
            .collect()
    }

    /// Destroys every batch.
    pub fn clear(&mut self, device: &mut impl GpuDevice, entities: &mut EntityStore) -> Result<usize> {
        self.destroy_where(device, entities, |_| true)
    }

    pub fn get(&self, batch: BatchHandle) -> Result<&Batch> {
        self.table.get(batch)
    }

    pub fn contains(&self, batch: BatchHandle) -> bool {
        self.table.contains(batch)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BatchHandle, &Batch)> {
        self.table.iter()
    }

    pub fn handles(&self) -> Vec<BatchHandle> {
        self.table.handles()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Mat4, Vec3};
    use crate::device::HeadlessDevice;
    use crate::scene::Vertex;

    struct Fixture {
        device: HeadlessDevice,
        entities: EntityStore,
        batches: BatchManager,
    }

    impl Fixture {
        fn new(config: BatchConfig) -> Self {
            Self {
                device: HeadlessDevice::default(),
                entities: EntityStore::new(8),
                batches: BatchManager::new(config, 4),
            }
        }

        fn sprite(&mut self, texture: Option<u32>) -> EntityHandle {
            let e = self.entities.create_sprite(1.0, 1.0).unwrap();
            self.entities.get_mut(e).unwrap().texture = texture.and_then(TextureHandle::from_raw);
            e
        }

        fn add(&mut self, e: EntityHandle) -> BatchHandle {
            self.batches.add(&mut self.device, &mut self.entities, e, false).unwrap()
        }

        fn remove(&mut self, e: EntityHandle) {
            self.batches.remove(&mut self.device, &mut self.entities, e).unwrap();
        }

        fn move_to(&mut self, e: EntityHandle, x: f32) {
            self.entities
                .update_transform(e, |t| t.position = Vec3::new(x, 0.0, 0.0))
                .unwrap();
            self.batches.sync_transform(&mut self.device, &self.entities, e).unwrap();
        }

        fn gpu_matrix(&self, batch: BatchHandle, slot: u32) -> Mat4 {
            let b = self.batches.get(batch).unwrap();
            let bytes = self.device.buffer_contents(b.transform_buffer()).unwrap();
            let start = slot as usize * 64;
            let floats = bytemuck::pod_collect_to_vec::<u8, f32>(&bytes[start..start + 64]);
            Mat4::from_cols_slice(&floats)
        }

        fn gpu_commands(&self, batch: BatchHandle) -> Vec<IndirectDraw> {
            let b = self.batches.get(batch).unwrap();
            let bytes = self.device.buffer_contents(b.indirect_buffer()).unwrap();
            let len = b.len() as usize * IndirectDraw::SIZE as usize;
            bytemuck::pod_collect_to_vec(&bytes[..len])
        }

        fn gpu_vertices(&self, batch: BatchHandle, first: u32, count: u32) -> Vec<Vertex> {
            let b = self.batches.get(batch).unwrap();
            let bytes = self.device.buffer_contents(b.vertex_buffer()).unwrap();
            let start = first as usize * 20;
            bytemuck::pod_collect_to_vec(&bytes[start..start + count as usize * 20])
        }

        /// Dense-pack and back-reference consistency of every batch.
        fn check(&self) {
            for (handle, batch) in self.batches.iter() {
                assert!(!batch.is_empty(), "empty batch {handle} survived");
                assert_eq!(batch.members().len(), batch.commands().len());
                assert!(batch.len() <= batch.entity_capacity());
                assert_eq!(self.gpu_commands(handle), batch.commands());

                for (slot, &member) in batch.members().iter().enumerate() {
                    let e = self.entities.get(member).unwrap();
                    let m = e.membership().unwrap();
                    assert_eq!(m.batch, handle);
                    assert_eq!(m.slot as usize, slot);

                    let cmd = batch.commands()[slot];
                    assert_eq!(cmd.first_instance as usize, slot);
                    assert_eq!(cmd.first_index, m.first_index);
                    assert_eq!(cmd.base_vertex, m.first_vertex as i32);
                    assert!(m.first_vertex + e.geometry().vertex_count() <= batch.vertex_count());
                    assert!(batch.vertex_count() <= batch.vertex_capacity());
                    assert!(batch.index_count() <= batch.index_capacity());

                    assert_eq!(self.gpu_matrix(handle, m.slot), e.matrix());
                    assert_eq!(
                        self.gpu_vertices(handle, m.first_vertex, 4),
                        e.geometry().vertices()
                    );
                }
            }
            for (handle, e) in self.entities.iter() {
                if let Some(m) = e.membership() {
                    let batch = self.batches.get(m.batch).unwrap();
                    assert_eq!(batch.members()[m.slot as usize], handle);
                }
            }

            let mut pairs: Vec<_> = self.batches.iter().map(|(_, b)| (b.texture(), b.shader())).collect();
            let total = pairs.len();
            pairs.sort_by_key(|(t, s)| (t.map(|h| h.raw()), s.map(|h| h.raw())));
            pairs.dedup();
            assert_eq!(pairs.len(), total, "two batches share a texture/shader pair");
            assert!(self.device.violations().is_empty(), "{:?}", self.device.violations());
        }
    }

    fn small() -> BatchConfig {
        BatchConfig {
            initial_entities: 2,
            entity_growth: 2,
            initial_vertices: 8,
            vertex_growth: 8,
            initial_indices: 12,
            index_growth: 12,
        }
    }

    // ── insertion ─────────────────────────────────────────────────────────

    #[test]
    fn first_add_creates_batch_with_one_record() {
        let mut f = Fixture::new(BatchConfig::default());
        let e = f.sprite(None);
        let b = f.add(e);

        let batch = f.batches.get(b).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch.commands(),
            &[IndirectDraw {
                index_count: 6,
                instance_count: 1,
                first_index: 0,
                base_vertex: 0,
                first_instance: 0,
            }]
        );
        assert_eq!(f.device.live_buffers(), 4);
        assert_eq!(f.device.live_formats(), 1);
        f.check();
    }

    #[test]
    fn same_pair_shares_a_batch() {
        let mut f = Fixture::new(BatchConfig::default());
        let a = f.sprite(Some(1));
        let b = f.sprite(Some(1));
        let c = f.sprite(Some(2));

        let ba = f.add(a);
        let bb = f.add(b);
        let bc = f.add(c);

        assert_eq!(ba, bb);
        assert_ne!(ba, bc);
        assert_eq!(f.batches.len(), 2);

        let second = f.batches.get(ba).unwrap().commands()[1];
        assert_eq!(second.base_vertex, 4);
        assert_eq!(second.first_index, 6);
        assert_eq!(second.first_instance, 1);
        f.check();
    }

    #[test]
    fn add_is_idempotent() {
        let mut f = Fixture::new(BatchConfig::default());
        let e = f.sprite(None);
        let first = f.add(e);
        let again = f.add(e);
        assert_eq!(first, again);
        assert_eq!(f.batches.get(first).unwrap().len(), 1);
    }

    #[test]
    fn failed_creation_leaves_no_batch() {
        let mut f = Fixture::new(BatchConfig::default());
        let e = f.sprite(None);
        f.device.set_fail_allocations(true);

        let err = f.batches.add(&mut f.device, &mut f.entities, e, false).unwrap_err();
        assert!(matches!(err, EngineError::GpuObjectCreation(_)));
        assert!(f.batches.is_empty());
        assert!(!f.entities.get(e).unwrap().is_visible());
        assert_eq!(f.device.live_buffers(), 0);
    }

    // ── removal ───────────────────────────────────────────────────────────

    #[test]
    fn remove_moves_last_member_into_hole() {
        let mut f = Fixture::new(BatchConfig::default());
        let es: Vec<_> = (0..3).map(|_| f.sprite(None)).collect();
        for (i, &e) in es.iter().enumerate() {
            f.add(e);
            f.move_to(e, i as f32 * 10.0);
        }
        let batch = f.entities.get(es[0]).unwrap().membership().unwrap().batch;

        f.remove(es[0]);

        let b = f.batches.get(batch).unwrap();
        assert_eq!(b.members(), &[es[2], es[1]]);
        assert_eq!(f.entities.get(es[2]).unwrap().membership().unwrap().slot, 0);
        assert_eq!(f.gpu_matrix(batch, 0).w_axis.x, 20.0);
        assert!(!f.entities.get(es[0]).unwrap().is_visible());
        f.check();
    }

    #[test]
    fn removing_last_member_destroys_batch() {
        let mut f = Fixture::new(BatchConfig::default());
        let e = f.sprite(None);
        let b = f.add(e);
        f.remove(e);

        assert!(!f.batches.contains(b));
        assert_eq!(f.device.live_buffers(), 0);
        assert_eq!(f.device.live_formats(), 0);
        assert!(f.device.violations().is_empty());
    }

    #[test]
    fn remove_unbatched_is_noop() {
        let mut f = Fixture::new(BatchConfig::default());
        let e = f.sprite(None);
        f.remove(e);
        assert!(f.batches.is_empty());
    }

    #[test]
    fn removing_tail_geometry_rewinds_cursor() {
        let mut f = Fixture::new(BatchConfig::default());
        let a = f.sprite(None);
        let b = f.sprite(None);
        let batch = f.add(a);
        f.add(b);
        f.remove(b);
        assert_eq!(f.batches.get(batch).unwrap().vertex_count(), 4);
        assert_eq!(f.batches.get(batch).unwrap().index_count(), 6);
    }

    // ── growth ────────────────────────────────────────────────────────────

    #[test]
    fn growth_keeps_existing_members() {
        let mut f = Fixture::new(small());
        let es: Vec<_> = (0..5).map(|_| f.sprite(None)).collect();
        for (i, &e) in es.iter().enumerate() {
            f.add(e);
            f.move_to(e, i as f32);
        }
        let batch = f.batches.handles()[0];
        let b = f.batches.get(batch).unwrap();

        assert_eq!(b.len(), 5);
        assert_eq!(b.entity_capacity(), 6);
        assert_eq!(b.vertex_capacity(), 24);
        assert_eq!(f.device.live_formats(), 1);
        assert_eq!(f.device.live_buffers(), 4);
        f.check();
    }

    #[test]
    fn holes_are_repacked_before_growing() {
        let mut f = Fixture::new(small());
        let a = f.sprite(None);
        let b = f.sprite(None);
        let c = f.sprite(None);
        let batch = f.add(a);
        f.add(b);
        f.remove(a);
        f.add(c);

        let bt = f.batches.get(batch).unwrap();
        assert_eq!(bt.vertex_capacity(), 8);
        assert_eq!(bt.vertex_count(), 8);
        assert_eq!(f.entities.get(b).unwrap().membership().unwrap().first_vertex, 0);
        assert_eq!(f.entities.get(c).unwrap().membership().unwrap().first_vertex, 4);
        f.check();
    }

    // ── updates ───────────────────────────────────────────────────────────

    #[test]
    fn sync_transform_writes_only_its_slot() {
        let mut f = Fixture::new(BatchConfig::default());
        let a = f.sprite(None);
        let b = f.sprite(None);
        let batch = f.add(a);
        f.add(b);

        f.move_to(b, 7.0);
        assert_eq!(f.gpu_matrix(batch, 0), Mat4::IDENTITY);
        assert_eq!(f.gpu_matrix(batch, 1).w_axis.x, 7.0);
    }

    #[test]
    fn sync_vertices_rewrites_uvs() {
        let mut f = Fixture::new(BatchConfig::default());
        let a = f.sprite(None);
        let b = f.sprite(None);
        let batch = f.add(a);
        f.add(b);

        f.entities.set_frame(b, 1, (0.5, 0.0, 1.0, 1.0)).unwrap();
        f.batches.sync_vertices(&mut f.device, &f.entities, b).unwrap();

        let uvs: Vec<_> = f.gpu_vertices(batch, 4, 4).iter().map(|v| v.uv).collect();
        assert_eq!(uvs[0], [0.5, 1.0]);
        assert_eq!(f.gpu_vertices(batch, 0, 1)[0].uv, [0.0, 1.0]);
        f.check();
    }

    // ── destruction ───────────────────────────────────────────────────────

    #[test]
    fn destroy_where_unbatches_members() {
        let mut f = Fixture::new(BatchConfig::default());
        let a = f.sprite(Some(1));
        let b = f.sprite(Some(2));
        f.add(a);
        f.add(b);

        let texture = TextureHandle::from_raw(1);
        let n = f
            .batches
            .destroy_where(&mut f.device, &mut f.entities, |bt| bt.texture() == texture)
            .unwrap();

        assert_eq!(n, 1);
        assert!(!f.entities.get(a).unwrap().is_visible());
        assert!(f.entities.get(b).unwrap().is_visible());
        assert_eq!(f.device.live_buffers(), 4);
        f.check();
    }

    #[test]
    fn draws_put_transparent_batches_last() {
        let mut f = Fixture::new(BatchConfig::default());
        let glass = f.sprite(Some(1));
        let wall = f.sprite(Some(2));
        f.batches.add(&mut f.device, &mut f.entities, glass, true).unwrap();
        f.batches.add(&mut f.device, &mut f.entities, wall, false).unwrap();

        let draws = f.batches.draws(|_| (None, None));
        assert_eq!(draws.len(), 2);
        let wall_batch = f.entities.get(wall).unwrap().membership().unwrap().batch;
        assert_eq!(draws[0].format, f.batches.get(wall_batch).unwrap().format());
    }

    // ── randomized ────────────────────────────────────────────────────────

    #[test]
    fn dense_pack_holds_under_random_churn() {
        let mut f = Fixture::new(small());
        let mut rng = fastrand::Rng::with_seed(7);
        let es: Vec<_> = (0..24).map(|i| f.sprite(Some(1 + i % 3))).collect();

        for step in 0..400 {
            let e = es[rng.usize(..es.len())];
            match rng.u8(..3) {
                0 => {
                    f.add(e);
                }
                1 => f.remove(e),
                _ => f.move_to(e, step as f32),
            }
            if step % 20 == 0 {
                f.check();
            }
        }
        f.check();
    }
}
