use bytemuck::{Pod, Zeroable};

use crate::device::VertexLayout;

/// Per-vertex data of the sprite layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// CPU-side geometry template of an entity.
///
/// Indices are local to the template (0-based); batches rebase them with the
/// indirect draw's `base_vertex`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    layout: VertexLayout,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

impl Geometry {
    /// A `width` x `height` quad centered on the origin in the XY plane.
    ///
    /// Corners run counter-clockwise from bottom-left; the top edge samples
    /// the first image row.
    pub fn sprite(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let vertices = vec![
            Vertex { position: [-hw, -hh, 0.0], uv: [0.0, 1.0] },
            Vertex { position: [hw, -hh, 0.0], uv: [1.0, 1.0] },
            Vertex { position: [hw, hh, 0.0], uv: [1.0, 0.0] },
            Vertex { position: [-hw, hh, 0.0], uv: [0.0, 0.0] },
        ];
        Self {
            layout: VertexLayout::Sprite,
            vertices,
            indices: QUAD_INDICES.to_vec(),
        }
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Maps the quad's corners onto `(u0, v0, u1, v1)`.
    pub fn set_uv_bounds(&mut self, (u0, v0, u1, v1): (f32, f32, f32, f32)) {
        let corners = [[u0, v1], [u1, v1], [u1, v0], [u0, v0]];
        for (vertex, uv) in self.vertices.iter_mut().zip(corners) {
            vertex.uv = uv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_quad_is_centered() {
        let g = Geometry::sprite(2.0, 4.0);
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.index_count(), 6);
        assert_eq!(g.vertices()[0].position, [-1.0, -2.0, 0.0]);
        assert_eq!(g.vertices()[2].position, [1.0, 2.0, 0.0]);
    }

    #[test]
    fn byte_views_match_layout() {
        let g = Geometry::sprite(1.0, 1.0);
        assert_eq!(g.vertex_bytes().len() as u64, 4 * g.layout().vertex_stride());
        assert_eq!(g.index_bytes().len(), 24);
    }

    #[test]
    fn uv_bounds_follow_corners() {
        let mut g = Geometry::sprite(1.0, 1.0);
        g.set_uv_bounds((0.25, 0.0, 0.5, 1.0));
        let uvs: Vec<_> = g.vertices().iter().map(|v| v.uv).collect();
        assert_eq!(uvs, vec![[0.25, 1.0], [0.5, 1.0], [0.5, 0.0], [0.25, 0.0]]);
    }
}
