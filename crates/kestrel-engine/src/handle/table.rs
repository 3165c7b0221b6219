use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::NonZeroU32;

use crate::error::{EngineError, Result};

/// Number of slots added each time a table runs out of free slots.
pub const DEFAULT_GROWTH: usize = 16;

/// Typed handle to a slot in a `HandleTable<T>`.
///
/// The raw value is the slot index and is never 0. A handle stays tied to its
/// slot for as long as the slot is occupied; after release the value may be
/// handed out again for a new resource.
pub struct Handle<T> {
    raw: NonZeroU32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Rebuilds a handle from its raw value. Returns `None` for 0.
    #[inline]
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(|raw| Self { raw, _marker: PhantomData })
    }

    /// Raw handle value (slot index).
    #[inline]
    pub fn raw(self) -> u32 {
        self.raw.get()
    }

    /// Reinterprets the handle for another table with the same slot numbering.
    #[inline]
    pub(crate) fn cast<U>(self) -> Handle<U> {
        Handle { raw: self.raw, _marker: PhantomData }
    }

    #[inline]
    fn index(self) -> usize {
        self.raw.get() as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.raw)
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Slot allocator with free-slot reuse and fixed-increment growth.
///
/// - slot 0 is permanently empty
/// - `insert` takes the lowest free slot, growing by `growth` slots when none is free
/// - growth never moves an occupied slot, so a handle keeps naming the same value
pub struct HandleTable<T> {
    slots: Vec<Option<T>>,
    growth: usize,
    live: usize,
    kind: &'static str,
}

impl<T> HandleTable<T> {
    /// Creates an empty table. `kind` names the resource in error messages.
    pub fn new(kind: &'static str) -> Self {
        Self::with_growth(kind, DEFAULT_GROWTH)
    }

    /// Creates an empty table growing by `growth` slots at a time.
    pub fn with_growth(kind: &'static str, growth: usize) -> Self {
        Self {
            slots: Vec::new(),
            growth: growth.max(1),
            live: 0,
            kind,
        }
    }

    /// Resource kind this table was created for.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Stores `value` in the first free slot and returns its handle.
    ///
    /// Fails with `OutOfMemory` if the table has to grow and the allocation fails.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>> {
        let index = match self.slots.iter().skip(1).position(Option::is_none) {
            Some(i) => i + 1,
            None => self.grow()?,
        };

        let raw = u32::try_from(index).map_err(|_| EngineError::OutOfMemory(self.kind))?;
        let handle = Handle::from_raw(raw).ok_or(EngineError::OutOfMemory(self.kind))?;

        self.slots[index] = Some(value);
        self.live += 1;
        Ok(handle)
    }

    /// Releases the slot named by `handle` and returns its value.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T> {
        let value = self
            .slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or_else(|| self.invalid(handle))?;
        self.live -= 1;
        Ok(value)
    }

    /// Returns true if `handle` names an occupied slot.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        matches!(self.slots.get(handle.index()), Some(Some(_)))
    }

    pub fn get(&self, handle: Handle<T>) -> Result<&T> {
        match self.slots.get(handle.index()) {
            Some(Some(value)) => Ok(value),
            _ => Err(self.invalid(handle)),
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T> {
        let kind = self.kind;
        match self.slots.get_mut(handle.index()) {
            Some(Some(value)) => Ok(value),
            _ => Err(EngineError::InvalidHandle { kind, raw: handle.raw() }),
        }
    }

    /// Occupied slots in ascending handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let value = slot.as_ref()?;
            Some((Handle::from_raw(i as u32)?, value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let value = slot.as_mut()?;
            Some((Handle::from_raw(i as u32)?, value))
        })
    }

    /// Snapshot of the live handles, for callers that mutate while walking.
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(h, _)| h).collect()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots, including the reserved slot 0.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Adds `growth` empty slots and returns the index of the first usable one.
    fn grow(&mut self) -> Result<usize> {
        let old_len = self.slots.len();
        self.slots
            .try_reserve_exact(self.growth)
            .map_err(|_| EngineError::OutOfMemory(self.kind))?;
        self.slots.resize_with(old_len + self.growth, || None);

        log::trace!("{} table grew to {} slots", self.kind, self.slots.len());

        // Slot 0 is never handed out.
        Ok(old_len.max(1))
    }

    fn invalid(&self, handle: Handle<T>) -> EngineError {
        EngineError::InvalidHandle {
            kind: self.kind,
            raw: handle.raw(),
        }
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("kind", &self.kind)
            .field("live", &self.live)
            .field("capacity", &self.slots.len())
            .finish()
    }
}
