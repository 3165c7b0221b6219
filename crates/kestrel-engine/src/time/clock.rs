use std::fmt;

use crate::error::{EngineError, Result};
use crate::handle::{Handle, HandleTable};

/// Callback invoked each time a clock's interval elapses. Receives the owning
/// context (the engine) and the clock that fired.
pub type ClockCallback<C> = Box<dyn FnMut(&mut C, ClockHandle)>;

pub type ClockHandle = Handle<Clock>;

/// Most firings one clock reports per `advance`; the rest of a backlog is dropped.
pub const MAX_FIRINGS_PER_ADVANCE: u32 = 64;

/// Interval timer state.
///
/// Times are in seconds. A clock is created stopped with an interval of 1.0.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Clock {
    interval: f64,
    elapsed: f64,
    accumulated: f64,
    last_sample: f64,
    active: bool,
}

impl Clock {
    pub const DEFAULT_INTERVAL: f64 = 1.0;

    fn new() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            elapsed: 0.0,
            accumulated: 0.0,
            last_sample: 0.0,
            active: false,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Total running time since creation or the last reset.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Time accumulated toward the next firing.
    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    /// Manager time at which this clock last advanced.
    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fraction of the interval elapsed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        (self.accumulated / self.interval).clamp(0.0, 1.0)
    }

    /// Adds `dt` and returns how many intervals completed.
    fn advance(&mut self, dt: f64, now: f64) -> u32 {
        self.last_sample = now;
        if !self.active {
            return 0;
        }

        self.elapsed += dt;
        self.accumulated += dt;
        if self.accumulated < self.interval {
            return 0;
        }

        let due = (self.accumulated / self.interval).floor();
        if due > f64::from(MAX_FIRINGS_PER_ADVANCE) {
            log::warn!("clock fell {due} intervals behind; dropping the backlog");
            self.accumulated %= self.interval;
            return MAX_FIRINGS_PER_ADVANCE;
        }
        self.accumulated = (self.accumulated - due * self.interval).max(0.0);
        due as u32
    }
}

struct ClockSlot<C> {
    clock: Clock,
    callback: Option<ClockCallback<C>>,
    /// The callback is out with the owner and may come back.
    in_flight: bool,
}

/// Owns every clock and its callback.
///
/// `C` is the context handed to callbacks. Callbacks are not invoked here:
/// `advance` reports which clocks fired and the owner runs the callbacks with
/// `take_callback`/`restore_callback`, so a callback may freely mutate the
/// owner (including this manager).
pub struct ClockManager<C> {
    clocks: HandleTable<ClockSlot<C>>,
    time: f64,
}

impl<C> ClockManager<C> {
    pub fn new() -> Self {
        Self {
            clocks: HandleTable::new("clock"),
            time: 0.0,
        }
    }

    /// Manager whose table grows by `growth` slots at a time.
    pub fn with_growth(growth: usize) -> Self {
        Self {
            clocks: HandleTable::with_growth("clock", growth),
            time: 0.0,
        }
    }

    /// Creates a stopped clock with the default interval and no callback.
    pub fn create(&mut self) -> Result<ClockHandle> {
        let slot = ClockSlot {
            clock: Clock::new(),
            callback: None,
            in_flight: false,
        };
        let handle = self.clocks.insert(slot)?.cast();
        log::debug!("clock {handle} created");
        Ok(handle)
    }

    pub fn destroy(&mut self, clock: ClockHandle) -> Result<()> {
        self.clocks.remove(clock.cast())?;
        log::debug!("clock {clock} destroyed");
        Ok(())
    }

    pub fn contains(&self, clock: ClockHandle) -> bool {
        self.clocks.contains(clock.cast())
    }

    pub fn get(&self, clock: ClockHandle) -> Result<&Clock> {
        Ok(&self.slot(clock)?.clock)
    }

    pub fn start(&mut self, clock: ClockHandle) -> Result<()> {
        self.slot_mut(clock)?.clock.active = true;
        Ok(())
    }

    pub fn stop(&mut self, clock: ClockHandle) -> Result<()> {
        self.slot_mut(clock)?.clock.active = false;
        Ok(())
    }

    /// Zeroes elapsed and accumulated time. The active flag is kept.
    pub fn reset(&mut self, clock: ClockHandle) -> Result<()> {
        let c = &mut self.slot_mut(clock)?.clock;
        c.elapsed = 0.0;
        c.accumulated = 0.0;
        Ok(())
    }

    /// Sets the firing interval. Rejects non-positive and non-finite values.
    pub fn set_interval(&mut self, clock: ClockHandle, interval: f64) -> Result<()> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(EngineError::InvalidArgument(format!(
                "clock interval must be positive, got {interval}"
            )));
        }
        self.slot_mut(clock)?.clock.interval = interval;
        Ok(())
    }

    /// Replaces the callback. `None` clears it.
    ///
    /// Also cancels the return of a callback currently taken out.
    pub fn set_callback(&mut self, clock: ClockHandle, callback: Option<ClockCallback<C>>) -> Result<()> {
        let slot = self.slot_mut(clock)?;
        slot.callback = callback;
        slot.in_flight = false;
        Ok(())
    }

    pub fn elapsed(&self, clock: ClockHandle) -> Result<f64> {
        Ok(self.get(clock)?.elapsed())
    }

    pub fn progress(&self, clock: ClockHandle) -> Result<f64> {
        Ok(self.get(clock)?.progress())
    }

    /// Advances every clock by `dt` seconds.
    ///
    /// Returns one entry per firing, in handle order; a clock whose interval
    /// elapsed twice this frame appears twice, up to `MAX_FIRINGS_PER_ADVANCE`.
    /// Negative and non-finite deltas count as zero.
    pub fn advance(&mut self, dt: f64) -> Vec<ClockHandle> {
        let dt = if dt.is_finite() && dt >= 0.0 {
            dt
        } else {
            log::warn!("ignoring clock delta {dt}");
            0.0
        };
        self.time += dt;
        let now = self.time;

        let mut fired = Vec::new();
        for (handle, slot) in self.clocks.iter_mut() {
            let n = slot.clock.advance(dt, now);
            fired.extend(std::iter::repeat_n(handle.cast(), n as usize));
        }
        fired
    }

    /// Detaches a clock's callback so it can be called with the owner borrowed mutably.
    pub fn take_callback(&mut self, clock: ClockHandle) -> Option<ClockCallback<C>> {
        let slot = self.clocks.get_mut(clock.cast()).ok()?;
        let callback = slot.callback.take()?;
        slot.in_flight = true;
        Some(callback)
    }

    /// Puts a callback back after it ran, unless the clock was destroyed or
    /// its callback was set or cleared in the meantime.
    pub fn restore_callback(&mut self, clock: ClockHandle, callback: ClockCallback<C>) {
        if let Ok(slot) = self.clocks.get_mut(clock.cast()) {
            if slot.in_flight {
                slot.in_flight = false;
                slot.callback = Some(callback);
            }
        }
    }

    /// Handles of every live clock.
    pub fn handles(&self) -> Vec<ClockHandle> {
        self.clocks.iter().map(|(h, _)| h.cast()).collect()
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    fn slot(&self, clock: ClockHandle) -> Result<&ClockSlot<C>> {
        self.clocks.get(clock.cast())
    }

    fn slot_mut(&mut self, clock: ClockHandle) -> Result<&mut ClockSlot<C>> {
        self.clocks.get_mut(clock.cast())
    }
}

impl<C> Default for ClockManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for ClockManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockManager")
            .field("clocks", &self.clocks.len())
            .field("time", &self.time)
            .finish()
    }
}
