use glam::Vec2;

use super::InputSample;

/// Cursor position and its change over the last frame.
///
/// Coordinates are window pixels with a bottom-left origin.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Cursor {
    position: Vec2,
    delta: Vec2,
    seen: bool,
}

impl Cursor {
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn delta(&self) -> Vec2 {
        self.delta
    }

    /// Applies one frame's sample.
    ///
    /// Raw motion, when present, drives the cursor (locked cursor). The first
    /// absolute sample produces a zero delta.
    pub fn update(&mut self, sample: &InputSample) {
        match sample.motion {
            Some(motion) => {
                self.delta = motion;
                self.position += motion;
            }
            None => {
                self.delta = if self.seen { sample.cursor - self.position } else { Vec2::ZERO };
                self.position = sample.cursor;
            }
        }
        self.seen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32, y: f32) -> InputSample {
        InputSample {
            cursor: Vec2::new(x, y),
            ..InputSample::default()
        }
    }

    #[test]
    fn first_sample_has_no_delta() {
        let mut cursor = Cursor::default();
        cursor.update(&at(100.0, 50.0));
        assert_eq!(cursor.delta(), Vec2::ZERO);
        assert_eq!(cursor.position(), Vec2::new(100.0, 50.0));
    }

    #[test]
    fn delta_is_difference_between_frames() {
        let mut cursor = Cursor::default();
        cursor.update(&at(100.0, 50.0));
        cursor.update(&at(90.0, 60.0));
        assert_eq!(cursor.delta(), Vec2::new(-10.0, 10.0));
    }

    #[test]
    fn raw_motion_drives_locked_cursor() {
        let mut cursor = Cursor::default();
        cursor.update(&at(10.0, 10.0));
        let sample = InputSample {
            motion: Some(Vec2::new(3.0, -4.0)),
            ..at(400.0, 400.0)
        };
        cursor.update(&sample);
        assert_eq!(cursor.delta(), Vec2::new(3.0, -4.0));
        assert_eq!(cursor.position(), Vec2::new(13.0, 6.0));
    }
}
