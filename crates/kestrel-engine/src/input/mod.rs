//! Input subsystem.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! The window runtime feeds platform events into an `InputState`; once per
//! frame it produces an `InputSample` that the engine turns into key states
//! and cursor deltas.

mod cursor;
mod key;
mod state;

pub mod platform;

pub use cursor::Cursor;
pub use key::{Key, KeyState, Keyboard};
pub use state::InputState;

use glam::Vec2;

/// Physical input for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSample {
    /// Cursor position, window pixels, bottom-left origin.
    pub cursor: Vec2,
    /// Raw motion while the cursor is locked (y up).
    pub motion: Option<Vec2>,
    /// Physical pressed flag per key, indexed by `Key::index`.
    pub pressed: [bool; Key::COUNT],
}

impl InputSample {
    /// Sample with exactly `keys` held.
    pub fn with_keys(keys: &[Key]) -> Self {
        let mut sample = Self::default();
        for key in keys {
            sample.pressed[key.index()] = true;
        }
        sample
    }
}

impl Default for InputSample {
    fn default() -> Self {
        Self {
            cursor: Vec2::ZERO,
            motion: None,
            pressed: [false; Key::COUNT],
        }
    }
}
