use crate::coords::{Mat4, Transform, Vec3};
use crate::device::VertexLayout;
use crate::error::{EngineError, Result};
use crate::handle::{Handle, HandleTable};
use crate::render::BatchHandle;
use crate::resources::{ShaderHandle, TextureHandle};

use super::{Geometry, Vertex};

pub type EntityHandle = Handle<Entity>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EntityKind {
    Sprite,
    /// Declared for arbitrary meshes; no constructor produces one yet.
    Mesh,
}

impl EntityKind {
    /// Vertex layout batches of this kind are built with.
    pub fn layout(self) -> Option<VertexLayout> {
        match self {
            EntityKind::Sprite => Some(VertexLayout::Sprite),
            EntityKind::Mesh => None,
        }
    }
}

/// Where a visible entity lives inside its batch.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BatchMembership {
    pub batch: BatchHandle,
    /// Index into the batch's transform and indirect arrays.
    pub slot: u32,
    pub first_vertex: u32,
    pub first_index: u32,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) kind: EntityKind,
    pub(crate) texture: Option<TextureHandle>,
    pub(crate) shader: Option<ShaderHandle>,
    pub(crate) membership: Option<BatchMembership>,
    pub(crate) geometry: Geometry,
    pub(crate) transform: Transform,
    pub(crate) matrix: Mat4,
    pub(crate) frame: usize,
}

impl Entity {
    fn new(kind: EntityKind, geometry: Geometry) -> Self {
        Self {
            kind,
            texture: None,
            shader: None,
            membership: None,
            geometry,
            transform: Transform::IDENTITY,
            matrix: Mat4::IDENTITY,
            frame: 0,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    /// Batch placement, present exactly while the entity is drawn.
    pub fn membership(&self) -> Option<BatchMembership> {
        self.membership
    }

    pub fn is_visible(&self) -> bool {
        self.membership.is_some()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn scale(&self) -> Vec3 {
        self.transform.scale
    }

    pub fn rotation(&self) -> Vec3 {
        self.transform.rotation
    }

    /// Composed model matrix, kept in sync with `transform`.
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Selected sprite-sheet frame.
    pub fn frame(&self) -> usize {
        self.frame
    }
}

/// Owns every entity's CPU state. GPU copies are owned by the batches.
#[derive(Debug)]
pub struct EntityStore {
    table: HandleTable<Entity>,
}

impl EntityStore {
    pub fn new(growth: usize) -> Self {
        Self {
            table: HandleTable::with_growth("entity", growth),
        }
    }

    /// Creates an invisible `width` x `height` sprite with an identity transform.
    pub fn create_sprite(&mut self, width: f32, height: f32) -> Result<EntityHandle> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(EngineError::InvalidArgument(format!(
                "sprite size must be positive, got {width}x{height}"
            )));
        }
        let handle = self.table.insert(Entity::new(EntityKind::Sprite, Geometry::sprite(width, height)))?;
        log::debug!("entity {handle} created as {width}x{height} sprite");
        Ok(handle)
    }

    /// Arbitrary mesh entities are not implemented.
    pub fn create_mesh(&mut self, _vertices: &[Vertex], _indices: &[u32]) -> Result<EntityHandle> {
        Err(EngineError::Unsupported("mesh entities"))
    }

    /// Frees an entity's slot. The entity must already be out of its batch.
    pub fn release(&mut self, entity: EntityHandle) -> Result<Entity> {
        if let Some(m) = self.table.get(entity)?.membership {
            return Err(EngineError::InvalidArgument(format!(
                "entity {entity} is still drawn by batch {}",
                m.batch
            )));
        }
        let released = self.table.remove(entity)?;
        log::debug!("entity {entity} released");
        Ok(released)
    }

    /// Applies `edit` to the transform and recomposes the matrix.
    pub fn update_transform(&mut self, entity: EntityHandle, edit: impl FnOnce(&mut Transform)) -> Result<&Entity> {
        let e = self.table.get_mut(entity)?;
        edit(&mut e.transform);
        e.matrix = e.transform.matrix();
        Ok(e)
    }

    /// Selects frame `index` and rewrites the quad's UVs.
    pub(crate) fn set_frame(&mut self, entity: EntityHandle, index: usize, uv: (f32, f32, f32, f32)) -> Result<&Entity> {
        let e = self.table.get_mut(entity)?;
        e.frame = index;
        e.geometry.set_uv_bounds(uv);
        Ok(e)
    }

    /// Drops every reference to `texture`. Returns the number of entities touched.
    pub fn clear_texture(&mut self, texture: TextureHandle) -> usize {
        let mut cleared = 0;
        for (_, e) in self.table.iter_mut().filter(|(_, e)| e.texture == Some(texture)) {
            e.texture = None;
            e.frame = 0;
            cleared += 1;
        }
        cleared
    }

    /// Drops every reference to `shader`. Returns the number of entities touched.
    pub fn clear_shader(&mut self, shader: ShaderHandle) -> usize {
        let mut cleared = 0;
        for (_, e) in self.table.iter_mut().filter(|(_, e)| e.shader == Some(shader)) {
            e.shader = None;
            cleared += 1;
        }
        cleared
    }

    pub fn get(&self, entity: EntityHandle) -> Result<&Entity> {
        self.table.get(entity)
    }

    pub(crate) fn get_mut(&mut self, entity: EntityHandle) -> Result<&mut Entity> {
        self.table.get_mut(entity)
    }

    pub fn contains(&self, entity: EntityHandle) -> bool {
        self.table.contains(entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> {
        self.table.iter()
    }

    pub fn handles(&self) -> Vec<EntityHandle> {
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

    // ── creation ──────────────────────────────────────────────────────────

    #[test]
    fn sprite_starts_at_identity() {
        let mut store = EntityStore::new(4);
        let e = store.create_sprite(2.0, 2.0).unwrap();
        let entity = store.get(e).unwrap();

        assert_eq!(entity.position(), Vec3::ZERO);
        assert_eq!(entity.scale(), Vec3::ONE);
        assert_eq!(entity.rotation(), Vec3::ZERO);
        assert_eq!(entity.matrix(), Mat4::IDENTITY);
        assert!(!entity.is_visible());
        assert_eq!(entity.kind(), EntityKind::Sprite);
    }

    #[test]
    fn rejects_degenerate_sprite() {
        let mut store = EntityStore::new(4);
        assert!(store.create_sprite(0.0, 1.0).is_err());
        assert!(store.create_sprite(1.0, f32::NAN).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn mesh_is_unsupported() {
        let mut store = EntityStore::new(4);
        let err = store.create_mesh(&[], &[]).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
        assert!(EntityKind::Mesh.layout().is_none());
    }

    // ── transforms ────────────────────────────────────────────────────────

    #[test]
    fn update_recomposes_matrix() {
        let mut store = EntityStore::new(4);
        let e = store.create_sprite(1.0, 1.0).unwrap();
        let entity = store
            .update_transform(e, |t| {
                t.translate(Vec3::new(5.0, 0.0, 0.0));
                t.scale_by(Vec3::new(2.0, 1.0, 1.0));
            })
            .unwrap();

        assert_eq!(entity.matrix(), entity.transform().matrix());
        assert_eq!(entity.matrix().transform_point3(Vec3::ZERO), Vec3::new(5.0, 0.0, 0.0));
    }

    // ── references ────────────────────────────────────────────────────────

    #[test]
    fn clear_texture_only_touches_matching_entities() {
        let mut store = EntityStore::new(4);
        let a = store.create_sprite(1.0, 1.0).unwrap();
        let b = store.create_sprite(1.0, 1.0).unwrap();
        let t1 = TextureHandle::from_raw(1).unwrap();
        let t2 = TextureHandle::from_raw(2).unwrap();
        store.get_mut(a).unwrap().texture = Some(t1);
        store.get_mut(b).unwrap().texture = Some(t2);

        assert_eq!(store.clear_texture(t1), 1);
        assert_eq!(store.get(a).unwrap().texture(), None);
        assert_eq!(store.get(b).unwrap().texture(), Some(t2));
    }

    #[test]
    fn release_refuses_batched_entity() {
        let mut store = EntityStore::new(4);
        let e = store.create_sprite(1.0, 1.0).unwrap();
        store.get_mut(e).unwrap().membership = Some(BatchMembership {
            batch: BatchHandle::from_raw(1).unwrap(),
            slot: 0,
            first_vertex: 0,
            first_index: 0,
        });
        assert!(store.release(e).is_err());

        store.get_mut(e).unwrap().membership = None;
        store.release(e).unwrap();
        assert!(!store.contains(e));
    }
}
