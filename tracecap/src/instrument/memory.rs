//! Memory tracing
//!
//! Allocation and free records carry the block's address; allocations also
//! carry its size. Hooking these into a global allocator is left to the
//! application.

use tracecap_common::{MemAllocEvent, MemFreeEvent};

use super::{address_of, record};
use crate::engine::{CaptureState, RecorderBuffer, Resolution};

pub(crate) fn write_alloc(
    buffer: &mut RecorderBuffer,
    state: &CaptureState,
    address: u64,
    size: u64,
    resolution: Resolution,
) {
    let event = buffer.append::<MemAllocEvent>(state);
    event.address = address;
    event.size = size;
    event.timestamp = resolution.now();
}

pub(crate) fn write_free(buffer: &mut RecorderBuffer, state: &CaptureState, address: u64, resolution: Resolution) {
    let event = buffer.append::<MemFreeEvent>(state);
    event.address = address;
    event.timestamp = resolution.now();
}

#[inline]
pub fn mem_alloc<T: ?Sized>(ptr: *const T, size: usize) {
    record(|buffer, state| write_alloc(buffer, state, address_of(ptr), size as u64, Resolution::Low));
}

#[inline]
pub fn mem_free<T: ?Sized>(ptr: *const T) {
    record(|buffer, state| write_free(buffer, state, address_of(ptr), Resolution::Low));
}

#[inline]
pub fn hr_mem_alloc<T: ?Sized>(ptr: *const T, size: usize) {
    record(|buffer, state| write_alloc(buffer, state, address_of(ptr), size as u64, Resolution::High));
}

#[inline]
pub fn hr_mem_free<T: ?Sized>(ptr: *const T) {
    record(|buffer, state| write_free(buffer, state, address_of(ptr), Resolution::High));
}

/// Records the free of a block when dropped
#[must_use = "the block is recorded as freed as soon as the scope is dropped"]
pub struct MemoryScope {
    address: u64,
    resolution: Resolution,
}

impl MemoryScope {
    pub fn new<T: ?Sized>(ptr: *const T, size: usize, resolution: Resolution) -> Self {
        let address = address_of(ptr);
        record(|buffer, state| write_alloc(buffer, state, address, size as u64, resolution));
        Self { address, resolution }
    }
}

impl Drop for MemoryScope {
    fn drop(&mut self) {
        let (address, resolution) = (self.address, self.resolution);
        record(|buffer, state| write_free(buffer, state, address, resolution));
    }
}

#[inline]
pub fn memory<T: ?Sized>(ptr: *const T, size: usize) -> MemoryScope {
    MemoryScope::new(ptr, size, Resolution::Low)
}

#[inline]
pub fn hr_memory<T: ?Sized>(ptr: *const T, size: usize) -> MemoryScope {
    MemoryScope::new(ptr, size, Resolution::High)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ThreadRecorder;

    #[test]
    fn test_alloc_and_free_records() {
        let state = CaptureState::new();
        let recorder = ThreadRecorder::new();
        let block = vec![0u8; 64];
        let address = address_of(block.as_ptr());
        {
            let mut buffer = recorder.lock();
            write_alloc(&mut buffer, &state, address, 64, Resolution::Low);
            write_free(&mut buffer, &state, address, Resolution::High);
            buffer.flush(&state);
        }

        let events = state.take_events();
        let alloc = events[1].read::<MemAllocEvent>().unwrap();
        assert_eq!(alloc.address, address);
        assert_eq!(alloc.size, 64);
        assert!(!alloc.timestamp.is_high_res());

        let free = events[2].read::<MemFreeEvent>().unwrap();
        assert_eq!(free.address, address);
        assert!(free.timestamp.is_high_res());
    }
}
