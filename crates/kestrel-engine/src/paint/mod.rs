//! Color model.
//!
//! Channels are straight (non-premultiplied) alpha in `[0, 1]`.

mod color;

pub use color::Color;
