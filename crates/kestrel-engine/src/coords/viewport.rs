/// Drawing region as fractions of the window size.
///
/// `(x, y)` is the bottom-left corner, `(width, height)` the extent, all in
/// `[0, 1]`. The default covers the whole window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const FULL: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        [self.x, self.y, self.width, self.height].iter().all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Pixel rectangle `(x, y, width, height)` for a `surface_w` x `surface_h`
    /// target with a top-left origin, clipped to the target.
    pub fn to_pixels(self, surface_w: u32, surface_h: u32) -> (f32, f32, f32, f32) {
        let sw = surface_w as f32;
        let sh = surface_h as f32;

        let x0 = (self.x * sw).clamp(0.0, sw);
        let x1 = ((self.x + self.width) * sw).clamp(0.0, sw);
        // Flip from bottom-left to top-left origin.
        let y0 = ((1.0 - self.y - self.height) * sh).clamp(0.0, sh);
        let y1 = ((1.0 - self.y) * sh).clamp(0.0, sh);

        (x0, y0, x1 - x0, y1 - y0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::FULL
    }
}
