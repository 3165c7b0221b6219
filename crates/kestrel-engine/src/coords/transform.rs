use glam::{Mat4, Vec3};

/// Position, scale and rotation of an entity.
///
/// Rotation is in degrees around X, then Y, then Z. The composed matrix applies
/// scale, then rotation, then translation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub scale: Vec3,
    pub rotation: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        scale: Vec3::ONE,
        rotation: Vec3::ZERO,
    };

    /// Model matrix `T * R * S`.
    pub fn matrix(&self) -> Mat4 {
        let rotation = Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());

        Mat4::from_translation(self.position) * rotation * Mat4::from_scale(self.scale)
    }

    /// Adds `delta` to the position.
    #[inline]
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Multiplies the scale component-wise by `factor`.
    #[inline]
    pub fn scale_by(&mut self, factor: Vec3) {
        self.scale *= factor;
    }

    /// Adds `degrees` to the rotation.
    #[inline]
    pub fn rotate(&mut self, degrees: Vec3) {
        self.rotation += degrees;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    // ── composition ───────────────────────────────────────────────────────

    #[test]
    fn identity_matrix() {
        assert_eq!(Transform::IDENTITY.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn scale_then_translate_unit_square() {
        let t = Transform {
            position: Vec3::new(5.0, 0.0, 0.0),
            scale: Vec3::new(2.0, 1.0, 1.0),
            rotation: Vec3::ZERO,
        };
        let m = t.matrix();

        let center = m.transform_point3(Vec3::ZERO);
        let left = m.transform_point3(Vec3::new(-0.5, 0.0, 0.0));
        let right = m.transform_point3(Vec3::new(0.5, 0.0, 0.0));

        assert!(close(center, Vec3::new(5.0, 0.0, 0.0)));
        assert!(close(right - left, Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn rotation_applies_before_translation() {
        let t = Transform {
            position: Vec3::new(10.0, 0.0, 0.0),
            scale: Vec3::ONE,
            rotation: Vec3::new(0.0, 0.0, 90.0),
        };
        let p = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!(close(p, Vec3::new(10.0, 1.0, 0.0)));
    }

    #[test]
    fn scale_applies_before_rotation() {
        let t = Transform {
            position: Vec3::ZERO,
            scale: Vec3::new(3.0, 1.0, 1.0),
            rotation: Vec3::new(0.0, 0.0, 90.0),
        };
        let p = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!(close(p, Vec3::new(0.0, 3.0, 0.0)));
    }

    // ── deltas ────────────────────────────────────────────────────────────

    #[test]
    fn deltas_accumulate() {
        let mut t = Transform::IDENTITY;
        t.translate(Vec3::new(1.0, 2.0, 0.0));
        t.translate(Vec3::new(1.0, 0.0, 0.0));
        t.scale_by(Vec3::new(2.0, 1.0, 1.0));
        t.scale_by(Vec3::new(2.0, 0.5, 1.0));
        t.rotate(Vec3::new(0.0, 0.0, -2.0));
        t.rotate(Vec3::new(0.0, 0.0, -2.0));

        assert_eq!(t.position, Vec3::new(2.0, 2.0, 0.0));
        assert_eq!(t.scale, Vec3::new(4.0, 0.5, 1.0));
        assert_eq!(t.rotation, Vec3::new(0.0, 0.0, -4.0));
    }
}
