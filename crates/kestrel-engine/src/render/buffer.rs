use crate::device::{BufferDesc, BufferId, BufferUsage, GpuDevice};
use crate::error::{EngineError, Result};

/// A GPU buffer holding `capacity` fixed-size elements.
///
/// Growth allocates a larger buffer, copies the used prefix into it and only
/// then releases the old one, so existing elements survive.
#[derive(Debug)]
pub struct GpuArray {
    id: BufferId,
    usage: BufferUsage,
    stride: u64,
    capacity: u32,
}

impl GpuArray {
    pub fn create(device: &mut impl GpuDevice, usage: BufferUsage, stride: u64, capacity: u32) -> Result<Self> {
        let id = allocate(device, usage, stride, capacity)?;
        Ok(Self {
            id,
            usage,
            stride,
            capacity,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Writes `bytes` starting at element `index`.
    pub fn write(&self, device: &mut impl GpuDevice, index: u32, bytes: &[u8]) {
        debug_assert!(index as u64 * self.stride + bytes.len() as u64 <= self.capacity as u64 * self.stride);
        device.write_buffer(self.id, index as u64 * self.stride, bytes);
    }

    /// Reallocates to `capacity` elements keeping the first `used`.
    pub fn grow(&mut self, device: &mut impl GpuDevice, capacity: u32, used: u32) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }
        let id = allocate(device, self.usage, self.stride, capacity)?;
        let used_bytes = used.min(self.capacity) as u64 * self.stride;
        if used_bytes > 0 {
            device.copy_buffer(self.id, id, used_bytes);
        }
        device.destroy_buffer(self.id);

        log::trace!(
            "{} grew from {} to {capacity} elements",
            self.usage.label(),
            self.capacity
        );
        self.id = id;
        self.capacity = capacity;
        Ok(())
    }

    pub fn destroy(self, device: &mut impl GpuDevice) {
        device.destroy_buffer(self.id);
    }
}

fn allocate(device: &mut impl GpuDevice, usage: BufferUsage, stride: u64, capacity: u32) -> Result<BufferId> {
    let size = stride
        .checked_mul(capacity as u64)
        .ok_or(EngineError::OutOfMemory(usage.label()))?;
    device
        .create_buffer(&BufferDesc { usage, size })
        .ok_or(EngineError::GpuObjectCreation(usage.label()))
}

/// Smallest `current + k * step` (k >= 0) that holds `needed` elements.
pub(crate) fn grown_capacity(current: u32, needed: u32, step: u32) -> Option<u32> {
    if needed <= current {
        return Some(current);
    }
    let step = step.max(1);
    let steps = (needed - current).div_ceil(step);
    steps.checked_mul(step)?.checked_add(current)
}
