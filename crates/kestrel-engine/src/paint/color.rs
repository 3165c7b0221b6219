/// Straight-alpha RGBA color with `f32` channels in `[0, 1]`.
///
/// Used for the clear color. Texture pixels stay in `u8` RGBA and are blended
/// with straight alpha by the sprite program.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    pub const RED: Self = Self::rgba(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::rgba(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::rgba(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Self = Self::rgba(1.0, 1.0, 0.0, 1.0);
    pub const MAGENTA: Self = Self::rgba(1.0, 0.0, 1.0, 1.0);
    pub const CYAN: Self = Self::rgba(0.0, 1.0, 1.0, 1.0);

    #[inline]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color.
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Grey level `value` on every channel. Alpha is `value` too when `alpha`
    /// is set, otherwise fully opaque.
    #[inline]
    pub const fn uniform(value: f32, alpha: bool) -> Self {
        Self::rgba(value, value, value, if alpha { value } else { 1.0 })
    }

    /// Random color drawn from the thread-local generator. Alpha is random
    /// only when `alpha` is set.
    pub fn random(alpha: bool) -> Self {
        Self::random_with(&mut fastrand::Rng::new(), alpha)
    }

    /// Random color drawn from `rng`.
    pub fn random_with(rng: &mut fastrand::Rng, alpha: bool) -> Self {
        let r = rng.f32();
        let g = rng.f32();
        let b = rng.f32();
        let a = if alpha { rng.f32() } else { 1.0 };
        Self::rgba(r, g, b, a)
    }

    /// Clamps every channel to `[0, 1]`. NaN channels become 0.
    #[inline]
    pub fn clamped(self) -> Self {
        fn unit(v: f32) -> f32 {
            if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
        }
        Self::rgba(unit(self.r), unit(self.g), unit(self.b), unit(self.a))
    }

    #[inline]
    pub fn is_opaque(self) -> bool {
        self.a >= 1.0
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<[f32; 4]> for Color {
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Self::rgba(r, g, b, a)
    }
}

impl From<Color> for wgpu::Color {
    fn from(c: Color) -> Self {
        wgpu::Color {
            r: c.r as f64,
            g: c.g as f64,
            b: c.b as f64,
            a: c.a as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_respects_alpha_flag() {
        assert_eq!(Color::uniform(0.25, false), Color::rgba(0.25, 0.25, 0.25, 1.0));
        assert_eq!(Color::uniform(0.25, true), Color::rgba(0.25, 0.25, 0.25, 0.25));
    }

    #[test]
    fn clamped_limits_each_channel() {
        let c = Color::rgba(-0.5, 1.5, 0.5, f32::NAN).clamped();
        assert_eq!(c, Color::rgba(0.0, 1.0, 0.5, 0.0));
    }

    #[test]
    fn random_stays_in_unit_range() {
        let mut rng = fastrand::Rng::with_seed(42);
        for _ in 0..256 {
            let c = Color::random_with(&mut rng, false);
            assert_eq!(c.a, 1.0);
            assert_eq!(c, c.clamped());
        }
        let c = Color::random_with(&mut rng, true);
        assert!((0.0..=1.0).contains(&c.a));
    }
}
