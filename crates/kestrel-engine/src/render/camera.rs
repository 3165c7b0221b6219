use glam::{Mat4, Vec3};

/// Orthographic depth range in world units on either side of the camera.
pub const ORTHO_DEPTH: f32 = 1000.0;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Projection {
    /// One world unit per pixel, origin at the window centre.
    Orthographic,
    Perspective {
        fov_y_degrees: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    /// Perspective with a 60 degree vertical field of view.
    pub const DEFAULT_PERSPECTIVE: Self = Projection::Perspective {
        fov_y_degrees: 60.0,
        near: 0.1,
        far: 1000.0,
    };

    /// Projection matrix for a `width` x `height` pixel target (wgpu depth range).
    pub fn matrix(self, width: u32, height: u32) -> Mat4 {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        match self {
            Projection::Orthographic => {
                Mat4::orthographic_rh(-w * 0.5, w * 0.5, -h * 0.5, h * 0.5, -ORTHO_DEPTH, ORTHO_DEPTH)
            }
            Projection::Perspective { fov_y_degrees, near, far } => {
                Mat4::perspective_rh(fov_y_degrees.to_radians(), w / h, near, far)
            }
        }
    }
}

/// Active projection plus the camera's placement in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    pub position: Vec3,
    /// Degrees around X, Y, Z.
    pub rotation: Vec3,
}

impl Camera {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
        }
    }

    /// World-to-view matrix, the inverse of the camera's placement.
    pub fn view(&self) -> Mat4 {
        let placement = Mat4::from_translation(self.position)
            * Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());
        placement.inverse()
    }

    pub fn view_projection(&self, width: u32, height: u32) -> Mat4 {
        self.projection.matrix(width, height) * self.view()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Projection::Orthographic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn ortho_maps_pixels_to_ndc() {
        let vp = Camera::default().view_projection(800, 600);
        assert!(close(vp.project_point3(Vec3::new(400.0, 300.0, 0.0)), Vec3::new(1.0, 1.0, 0.5)));
        assert!(close(vp.project_point3(Vec3::new(-400.0, 0.0, 0.0)), Vec3::new(-1.0, 0.0, 0.5)));
    }

    #[test]
    fn camera_position_shifts_view() {
        let mut camera = Camera::default();
        camera.position = Vec3::new(100.0, 0.0, 0.0);
        let vp = camera.view_projection(200, 200);
        assert!(close(vp.project_point3(Vec3::new(100.0, 0.0, 0.0)), Vec3::new(0.0, 0.0, 0.5)));
    }

    #[test]
    fn perspective_keeps_centre_on_axis() {
        let camera = Camera::new(Projection::DEFAULT_PERSPECTIVE);
        let p = camera.view_projection(640, 480).project_point3(Vec3::new(0.0, 0.0, -10.0));
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
        assert!((0.0..1.0).contains(&p.z));
    }

    #[test]
    fn zero_size_target_is_finite() {
        let m = Projection::Orthographic.matrix(0, 0);
        assert!(m.is_finite());
    }
}
