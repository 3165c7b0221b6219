//! Handle allocation.
//!
//! Every engine resource (entities, textures, shaders, clocks, batches) lives in a
//! `HandleTable` and is referenced by a typed, non-zero `Handle`. Raw value 0 is
//! reserved as "none" and never names a slot.

mod table;

pub use table::{Handle, HandleTable, DEFAULT_GROWTH};
