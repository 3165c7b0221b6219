use glam::Vec2;

use super::{InputSample, Key};

/// Physical input gathered from platform events between two frames.
///
/// Holds "is down" per key and the last cursor position in top-left window
/// pixels. `sample` converts it into the frame's `InputSample`.
#[derive(Debug, Clone)]
pub struct InputState {
    keys_down: [bool; Key::COUNT],
    cursor: Vec2,
    motion: Vec2,
    focused: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_down: [false; Key::COUNT],
            cursor: Vec2::ZERO,
            motion: Vec2::ZERO,
            focused: true,
        }
    }

    pub fn key(&mut self, key: Key, pressed: bool) {
        self.keys_down[key.index()] = pressed;
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.keys_down[key.index()]
    }

    /// Records an absolute cursor position (top-left origin).
    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        self.cursor = Vec2::new(x, y);
    }

    /// Accumulates raw device motion (y down).
    pub fn raw_motion(&mut self, dx: f32, dy: f32) {
        self.motion += Vec2::new(dx, dy);
    }

    /// Focus loss releases every key so none stays stuck.
    pub fn focused(&mut self, focused: bool) {
        self.focused = focused;
        if !focused {
            self.keys_down = [false; Key::COUNT];
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Builds the frame sample for a window `height` pixels tall and clears
    /// accumulated motion. Motion is reported only when `locked`.
    pub fn sample(&mut self, height: f32, locked: bool) -> InputSample {
        let motion = std::mem::take(&mut self.motion);
        InputSample {
            cursor: Vec2::new(self.cursor.x, height - self.cursor.y),
            motion: locked.then_some(Vec2::new(motion.x, -motion.y)),
            pressed: self.keys_down,
        }
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}
