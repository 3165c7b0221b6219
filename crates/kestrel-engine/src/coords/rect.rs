/// Axis-aligned pixel rectangle inside an image (top-left origin).
///
/// Used as a sprite-sheet frame: the part of a texture a sprite samples.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct FrameRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FrameRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering a whole `width` x `height` image.
    #[inline]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if the rectangle lies entirely inside a `width` x `height` image.
    #[inline]
    pub fn fits_within(self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= width && b <= height)
    }

    /// Normalized texture coordinates `(u0, v0, u1, v1)` of this rectangle in a
    /// `width` x `height` image. `v` grows downward, matching image rows.
    pub fn uv_bounds(self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        if width == 0 || height == 0 {
            return (0.0, 0.0, 1.0, 1.0);
        }
        let w = width as f32;
        let h = height as f32;
        (
            self.x as f32 / w,
            self.y as f32 / h,
            (self.x + self.width) as f32 / w,
            (self.y + self.height) as f32 / h,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── fits_within ───────────────────────────────────────────────────────

    #[test]
    fn full_rect_fits() {
        assert!(FrameRect::full(64, 32).fits_within(64, 32));
    }

    #[test]
    fn overhanging_rect_does_not_fit() {
        assert!(!FrameRect::new(48, 0, 32, 32).fits_within(64, 32));
        assert!(!FrameRect::new(0, 1, 64, 32).fits_within(64, 32));
    }

    #[test]
    fn overflowing_rect_does_not_fit() {
        assert!(!FrameRect::new(u32::MAX, 0, 2, 1).fits_within(u32::MAX, 1));
    }

    // ── uv_bounds ─────────────────────────────────────────────────────────

    #[test]
    fn full_rect_spans_unit_square() {
        assert_eq!(FrameRect::full(16, 16).uv_bounds(16, 16), (0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn second_cell_of_strip() {
        let uv = FrameRect::new(32, 0, 32, 32).uv_bounds(128, 32);
        assert_eq!(uv, (0.25, 0.0, 0.5, 1.0));
    }

    #[test]
    fn empty_image_falls_back_to_unit_square() {
        assert_eq!(FrameRect::new(1, 1, 1, 1).uv_bounds(0, 0), (0.0, 0.0, 1.0, 1.0));
    }
}
