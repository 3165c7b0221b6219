//! Time subsystem.
//!
//! - `FrameClock` measures wall-clock frame deltas for the window loop
//! - `ClockManager` owns the engine's interval clocks, advanced by those deltas

mod clock;
mod frame_clock;

pub use clock::{Clock, ClockCallback, ClockHandle, ClockManager};
pub use frame_clock::FrameClock;
