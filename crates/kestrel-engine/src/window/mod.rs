//! Window + frame loop.
//!
//! Owns the `winit` EventLoop (pump mode) and Window, and wires them to the
//! GPU device and the engine.

mod runtime;

pub use runtime::{Window, WindowConfig};
